/// Runlet Execution Engine
///
/// **Core Responsibility:**
/// Accept a code snippet, materialize it into an isolated run (a Kubernetes
/// Job or a locally spawned process), enforce a hard timeout, capture output,
/// and guarantee cleanup of every resource created along the way.
///
/// **Critical Architectural Boundary:**
/// - The engine knows HOW to execute (Kubernetes, local process)
/// - The engine does NOT know about HTTP, rendering, or any caller concern
/// - Callers only see `ExecutionRouter::submit` and `active_jobs`
///
/// No error escapes the router uncaught: every failure mode is folded into a
/// structured `ExecutionResult`.

mod error;
mod k8s;
mod local;
mod registry;
mod router;
mod types;

pub use error::EngineError;
pub use k8s::{run_reaper, KubernetesBackend};
pub use local::LocalBackend;
pub use registry::{LanguageRegistry, LanguageSpec, CODE_PLACEHOLDER};
pub use router::{ExecutionRouter, RouterConfig};
pub use types::{ExecutionRequest, ExecutionResult, ExecutionStatus, Language, TIMEOUT_MESSAGE};
