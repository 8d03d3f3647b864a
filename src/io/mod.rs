//! CLI output formats and exit codes.

pub mod exit_code;
pub mod format;

pub use exit_code::ExitCode;
pub use format::{ErrorDetails, JsonResponse, OutputFormat};
