use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Fixed message surfaced whenever a run exceeds its wall-clock deadline.
pub const TIMEOUT_MESSAGE: &str = "code execution timed out";

/// Languages the engine can execute.
///
/// Parsing is case-insensitive and accepts both `c++` and `cpp`; the
/// canonical display form is always DNS-label safe so it can be embedded in
/// Kubernetes job names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Cpp,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
        };
        f.write_str(name)
    }
}

impl FromStr for Language {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "c++" | "cpp" => Ok(Language::Cpp),
            other => Err(EngineError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// A single code submission. Immutable once built; `code` is untrusted and
/// is only ever passed as a literal argv element or manifest argument.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    pub timeout: Duration,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: Language, timeout: Duration) -> Self {
        Self {
            code: code.into(),
            language,
            timeout,
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    Timeout,
    NotFound,
}

/// Normalized outcome shared by both backends.
///
/// Exactly one of `output`/`error` is authoritative per status: `Succeeded`
/// carries stdout in `output`; every other status carries its diagnostic in
/// `error` (which may legitimately be empty, e.g. a non-zero exit with a
/// silent stderr).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: String::new(),
            status: ExecutionStatus::Succeeded,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
            status: ExecutionStatus::Failed,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            output: String::new(),
            error: TIMEOUT_MESSAGE.to_string(),
            status: ExecutionStatus::Timeout,
        }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
            status: ExecutionStatus::NotFound,
        }
    }
}
