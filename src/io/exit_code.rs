//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success, including an empty result
//! - `1`: General error
//! - `2`: Blocking error that should halt automation
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::{ErrorKind, MatchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Guild, squad, user or embedding not found (code 3)
    NotFound = 3,

    /// Request rejected by squad rules: size, duplicate, full, closed (code 4)
    ValidationError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Members below the similarity threshold (code 7)
    Incompatible = 7,

    /// Embedding index or store unavailable after retries (code 8)
    Unavailable = 8,

    /// Lost a race or a formation pass is already running (code 9)
    Conflict = 9,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Success if the listing has entries, `NotFound` if empty.
    pub fn from_listing<T>(items: &[T]) -> Self {
        if items.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Map a `MatchError` to the exit code scripts branch on.
    pub fn from_error(error: &MatchError) -> Self {
        match error {
            MatchError::Config { .. } => ExitCode::ConfigError,
            MatchError::Storage(crate::storage::StorageError::Io(_)) => ExitCode::IoError,
            // A broken snapshot or backend invariant should stop automation
            MatchError::Storage(crate::storage::StorageError::Serialization(_))
            | MatchError::Storage(crate::storage::StorageError::InvalidDraft(_)) => {
                ExitCode::BlockingError
            }
            _ => match error.kind() {
                ErrorKind::NotFound => ExitCode::NotFound,
                ErrorKind::Validation => ExitCode::ValidationError,
                ErrorKind::Compatibility => ExitCode::Incompatible,
                ErrorKind::Transient => ExitCode::Unavailable,
                ErrorKind::Conflict => ExitCode::Conflict,
                ErrorKind::Internal => ExitCode::GeneralError,
            },
        }
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::ValidationError => "Rejected by squad rules",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::Incompatible => "Compatibility threshold not met",
            ExitCode::Unavailable => "Backend unavailable",
            ExitCode::Conflict => "Concurrent update conflict",
        }
    }
}
