//! JSON envelope for CLI output.

use crate::error::MatchError;
use crate::io::exit_code::ExitCode;
use serde::Serialize;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Text,
    /// JSON for tool integration
    Json,
}

impl OutputFormat {
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Standard JSON response.
#[derive(Debug, Serialize)]
pub struct JsonResponse<T = serde_json::Value>
where
    T: Serialize,
{
    /// "success" or "error"
    pub status: String,

    /// "OK" or the error's status code
    pub code: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,

    /// Exit code for shell scripts
    pub exit_code: u8,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub suggestions: Vec<String>,
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            code: "OK".to_string(),
            message: "Operation completed successfully".to_string(),
            data: Some(data),
            error: None,
            exit_code: ExitCode::Success as u8,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl JsonResponse<serde_json::Value> {
    pub fn from_error(error: &MatchError) -> Self {
        Self {
            status: "error".to_string(),
            code: error.status_code(),
            message: error.to_string(),
            data: None,
            error: Some(ErrorDetails {
                suggestions: error
                    .recovery_suggestions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            exit_code: ExitCode::from_error(error) as u8,
        }
    }
}
