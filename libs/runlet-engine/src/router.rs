// Execution router: the only entry point callers use. Picks a backend once
// at startup and normalizes both backends' outcomes into one result shape,
// so callers never observe which backend served a request.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::EngineError;
use crate::k8s::KubernetesBackend;
use crate::local::LocalBackend;
use crate::registry::LanguageRegistry;
use crate::types::{ExecutionRequest, ExecutionResult};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Prefer the orchestrated Kubernetes backend when it is reachable.
    pub use_kubernetes: bool,
    /// Namespace scoping every job the engine creates.
    pub namespace: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            use_kubernetes: false,
            namespace: "runlet".to_string(),
        }
    }
}

/// The two execution strategies behind the common submit contract. Selected
/// once at initialization and never re-probed per request.
enum Backend {
    Kubernetes(KubernetesBackend),
    Local(LocalBackend),
}

pub struct ExecutionRouter {
    registry: LanguageRegistry,
    backend: Backend,
}

impl ExecutionRouter {
    /// Build the router: load the language registry (malformed descriptors
    /// are fatal here, not per-request), then select the backend. If the
    /// orchestrated backend is enabled but unreachable, fall back to the
    /// local process backend for the rest of the process lifetime.
    pub async fn new(config: &RouterConfig) -> Result<Self, EngineError> {
        let registry = LanguageRegistry::load()?;

        let backend = if config.use_kubernetes {
            match KubernetesBackend::connect(&config.namespace).await {
                Ok(backend) => {
                    info!(namespace = %config.namespace, "kubernetes backend selected");
                    Backend::Kubernetes(backend)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "kubernetes unavailable, falling back to local process backend"
                    );
                    Backend::Local(LocalBackend)
                }
            }
        } else {
            info!("local process backend selected");
            Backend::Local(LocalBackend)
        };

        Ok(Self { registry, backend })
    }

    /// Submit code for execution. Unsupported languages are rejected before
    /// dispatch; everything else returns whatever the backend produced.
    pub async fn submit(&self, code: &str, language: &str, timeout: Duration) -> ExecutionResult {
        let spec = match self.registry.resolve(language) {
            Ok(spec) => spec,
            Err(e) => return ExecutionResult::failed(e.to_string()),
        };

        let request = ExecutionRequest::new(code, spec.language, timeout);
        match &self.backend {
            Backend::Kubernetes(backend) => backend.run(spec, &request).await,
            Backend::Local(backend) => backend.run(spec, &request).await,
        }
    }

    /// Live count of in-flight orchestrated jobs. The local backend has no
    /// cluster-side state, so it always reports zero.
    pub async fn active_jobs(&self) -> usize {
        match &self.backend {
            Backend::Kubernetes(backend) => backend.active_jobs().await,
            Backend::Local(_) => 0,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Kubernetes(_) => "kubernetes",
            Backend::Local(_) => "local",
        }
    }

    /// Handle for the garbage-collection task; `None` when running on the
    /// local backend, which has nothing to reap.
    pub fn kubernetes_backend(&self) -> Option<&KubernetesBackend> {
        match &self.backend {
            Backend::Kubernetes(backend) => Some(backend),
            Backend::Local(_) => None,
        }
    }
}
