use serde::Deserialize;
use serde::Serialize;

/// Severity of a lint finding, mirroring the usual language-server scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

/// One lint finding inside a changed range of an applied edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    /// 1-based line the finding is anchored to.
    pub line: u32,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, line: u32) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            line,
        }
    }

    pub fn warning(message: impl Into<String>, line: u32) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            message: message.into(),
            line,
        }
    }
}
