use thiserror::Error;

/// Engine failure taxonomy.
///
/// Every variant is caught at the backend boundary and folded into an
/// `ExecutionResult`; callers of the router never see these directly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid job template: {0}")]
    Template(#[from] serde_json::Error),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] kube::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
