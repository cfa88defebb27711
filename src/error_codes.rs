//! Startup failures the binary reports with a stable, machine-readable code.

use std::fmt;

use anyhow::Error;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The frame directory is unreadable or holds no numbered stills.
    FramesMissing,
    /// The config file failed to parse, or the merged settings are invalid.
    ConfigInvalid,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FramesMissing => "frames_missing",
            Self::ConfigInvalid => "config_invalid",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl StartupError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// `{"ok": false, "error": {...}}` for `--json` callers.
    pub fn envelope(&self) -> ErrorEnvelope<'_> {
        ErrorEnvelope {
            ok: false,
            error: self,
        }
    }

    /// `error[code]: message`, then a `hint:` line when there is one.
    pub fn render(&self) -> String {
        let mut text = format!("error[{}]: {}", self.code, self.message);
        if let Some(hint) = &self.hint {
            text.push_str("\nhint: ");
            text.push_str(hint);
        }
        text
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub ok: bool,
    pub error: &'a StartupError,
}

/// First [`StartupError`] anywhere in the context chain.
pub fn find_startup_error(error: &Error) -> Option<&StartupError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StartupError>())
}
