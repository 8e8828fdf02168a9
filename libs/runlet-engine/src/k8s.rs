// Orchestrated job backend: each submission becomes a templated Kubernetes
// Job in a dedicated namespace. Per job: submit, poll to a terminal state,
// fetch pod logs, delete with cascading pod cleanup. The submit / poll /
// fetch-logs / delete steps are individually fault-tolerant so a single
// scheduler hiccup degrades the result instead of leaking the job.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use kube::{Api, Client};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::registry::LanguageSpec;
use crate::types::{ExecutionRequest, ExecutionResult, Language};

/// Label selector identifying jobs owned by this engine. The garbage
/// collector and active-job accounting only ever touch jobs carrying it.
const EXECUTOR_ROLE_SELECTOR: &str = "role=code-executor";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Terminal poll outcomes. No further polling happens after any of these.
#[derive(Debug)]
enum JobOutcome {
    Succeeded,
    Failed,
    TimedOut,
    NotFound,
    SchedulerError(String),
}

#[derive(Clone)]
pub struct KubernetesBackend {
    jobs: Api<Job>,
    pods: Api<Pod>,
    namespace: String,
}

impl KubernetesBackend {
    /// Connect using in-cluster config when available, falling back to the
    /// local kubeconfig. Connectivity failure here is what makes the router
    /// fall back to the local process backend for the process lifetime.
    pub async fn connect(namespace: &str) -> Result<Self, EngineError> {
        let client = Client::try_default().await?;
        Ok(Self {
            jobs: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Run one submission end to end. Every path out of this function has
    /// attempted exactly one job deletion; the garbage collector covers the
    /// case where that attempt fails.
    pub async fn run(&self, spec: &LanguageSpec, request: &ExecutionRequest) -> ExecutionResult {
        let job_name = unique_job_name(request.language);

        let manifest = match spec.render_manifest(&request.code, &job_name) {
            Ok(manifest) => manifest,
            Err(e) => return ExecutionResult::failed(e.to_string()),
        };

        // Submission failure short-circuits: no job exists, nothing to poll
        // or clean up.
        if let Err(e) = self.jobs.create(&PostParams::default(), &manifest).await {
            warn!(job = %job_name, error = %e, "job submission failed");
            return ExecutionResult::failed(format!("job submission failed: {e}"));
        }
        info!(job = %job_name, namespace = %self.namespace, "job submitted");

        let outcome = self.wait_for_completion(&job_name, request.timeout).await;
        debug!(job = %job_name, outcome = ?outcome, "job reached terminal state");

        let result = match outcome {
            JobOutcome::Succeeded => ExecutionResult::succeeded(self.fetch_logs(&job_name).await),
            JobOutcome::Failed => ExecutionResult::failed(self.fetch_logs(&job_name).await),
            JobOutcome::TimedOut => ExecutionResult::timed_out(),
            JobOutcome::NotFound => {
                ExecutionResult::not_found("job disappeared before completion")
            }
            JobOutcome::SchedulerError(message) => ExecutionResult::failed(message),
        };

        self.delete_job(&job_name).await;
        result
    }

    /// Poll job status until success, failure, disappearance, or the
    /// caller's deadline. The deadline is measured from submission, not from
    /// first progress.
    async fn wait_for_completion(&self, job_name: &str, timeout: Duration) -> JobOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            match self.jobs.get(job_name).await {
                Ok(job) => {
                    if let Some(status) = &job.status {
                        if status.succeeded.unwrap_or(0) > 0 {
                            return JobOutcome::Succeeded;
                        }
                        if status.failed.unwrap_or(0) > 0 {
                            return JobOutcome::Failed;
                        }
                    }
                }
                // Job vanished mid-poll (e.g. reaped by the garbage
                // collector racing us) - a terminal state, not a retry.
                Err(kube::Error::Api(e)) if e.code == 404 => return JobOutcome::NotFound,
                Err(e) => {
                    return JobOutcome::SchedulerError(format!("status poll failed: {e}"));
                }
            }

            if Instant::now() >= deadline {
                return JobOutcome::TimedOut;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Fetch logs from the job's first pod. Degrades to a diagnostic string
    /// rather than failing the whole result.
    async fn fetch_logs(&self, job_name: &str) -> String {
        let params = ListParams::default().labels(&format!("job-name={job_name}"));
        let pods = match self.pods.list(&params).await {
            Ok(pods) => pods,
            Err(e) => return format!("error getting logs: {e}"),
        };

        let pod_name = match pods.items.first().and_then(|p| p.metadata.name.as_deref()) {
            Some(name) => name.to_string(),
            None => return "no pods found for job".to_string(),
        };

        match self.pods.logs(&pod_name, &LogParams::default()).await {
            Ok(logs) => logs,
            Err(e) => format!("error getting logs: {e}"),
        }
    }

    /// Delete a job with cascading deletion of its pods. Errors are logged
    /// and swallowed: a 404 just means the job was already reaped, and
    /// anything else is the garbage collector's problem.
    async fn delete_job(&self, job_name: &str) {
        match self.jobs.delete(job_name, &DeleteParams::foreground()).await {
            Ok(_) => debug!(job = %job_name, "job deleted"),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(job = %job_name, "job already deleted");
            }
            Err(e) => warn!(job = %job_name, error = %e, "job deletion failed"),
        }
    }

    /// Count executor jobs currently running. Returns 0 on any scheduler
    /// error so monitoring never falls over during an outage.
    pub async fn active_jobs(&self) -> usize {
        let params = ListParams::default().labels(EXECUTOR_ROLE_SELECTOR);
        match self.jobs.list(&params).await {
            Ok(jobs) => jobs
                .items
                .iter()
                .filter(|job| {
                    job.status
                        .as_ref()
                        .and_then(|s| s.active)
                        .unwrap_or(0)
                        > 0
                })
                .count(),
            Err(e) => {
                warn!(error = %e, "failed to list active jobs");
                0
            }
        }
    }

    /// Reap executor jobs older than `max_age`. Safety net for jobs whose
    /// owning request died before its own cleanup ran. List and delete
    /// errors are swallowed; the sweep continues with the next job.
    pub async fn sweep(&self, max_age: Duration) {
        let params = ListParams::default().labels(EXECUTOR_ROLE_SELECTOR);
        let jobs = match self.jobs.list(&params).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "job list failed during sweep");
                return;
            }
        };

        let now = Utc::now();
        for job in jobs.items {
            let Some(name) = job.metadata.name.as_deref() else {
                continue;
            };
            let Some(created) = job.metadata.creation_timestamp.as_ref() else {
                continue;
            };
            if is_stale(&created.0, now, max_age) {
                info!(job = %name, "reaping stale job");
                self.delete_job(name).await;
            }
        }
    }
}

/// Unique job name combining language and a short random identifier, so
/// concurrent submissions of the same language never collide.
fn unique_job_name(language: Language) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-executor-{}", language, &id[..8])
}

fn is_stale(created: &DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let age = (now - *created).to_std().unwrap_or_default();
    age > max_age
}

/// Garbage collection loop, run as a background task independent of request
/// traffic. Shutdown is an explicit watch channel checked at every iteration
/// boundary rather than a process-wide flag.
pub async fn run_reaper(
    backend: KubernetesBackend,
    interval: Duration,
    max_age: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        interval_secs = interval.as_secs(),
        max_age_secs = max_age.as_secs(),
        "job reaper started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => backend.sweep(max_age).await,
            _ = shutdown.changed() => {
                info!("job reaper shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LanguageRegistry;
    use crate::types::{ExecutionStatus, TIMEOUT_MESSAGE};

    #[test]
    fn test_job_names_are_unique_and_prefixed() {
        let a = unique_job_name(Language::Python);
        let b = unique_job_name(Language::Python);
        assert_ne!(a, b);
        assert!(a.starts_with("python-executor-"));
        assert_eq!(a.len(), "python-executor-".len() + 8);

        // Must stay a valid DNS label even for c++.
        let c = unique_job_name(Language::Cpp);
        assert!(c.starts_with("cpp-executor-"));
    }

    #[test]
    fn test_staleness_threshold() {
        let now = Utc::now();
        let max_age = Duration::from_secs(300);

        let old = now - chrono::Duration::seconds(301);
        assert!(is_stale(&old, now, max_age));

        let young = now - chrono::Duration::seconds(299);
        assert!(!is_stale(&young, now, max_age));

        // Clock skew (creation in the future) must not select for deletion.
        let future = now + chrono::Duration::seconds(60);
        assert!(!is_stale(&future, now, max_age));
    }

    #[tokio::test]
    #[ignore] // Requires a Kubernetes cluster with the runner images
    async fn test_python_job_round_trip() {
        let registry = LanguageRegistry::load().unwrap();
        let backend = KubernetesBackend::connect("runlet").await.unwrap();

        let request = ExecutionRequest::new(
            "print('hi')",
            Language::Python,
            Duration::from_secs(30),
        );
        let result = backend
            .run(registry.resolve("python").unwrap(), &request)
            .await;

        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.output, "hi\n");

        // Normal completion already deleted the job.
        assert_eq!(backend.active_jobs().await, 0);
    }

    #[tokio::test]
    #[ignore] // Requires a Kubernetes cluster with the runner images
    async fn test_job_timeout_is_torn_down() {
        let registry = LanguageRegistry::load().unwrap();
        let backend = KubernetesBackend::connect("runlet").await.unwrap();

        let request = ExecutionRequest::new(
            "while True: pass",
            Language::Python,
            Duration::from_secs(2),
        );
        let result = backend
            .run(registry.resolve("python").unwrap(), &request)
            .await;

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.error, TIMEOUT_MESSAGE);

        backend.sweep(Duration::from_secs(0)).await;
        assert_eq!(backend.active_jobs().await, 0);
    }
}
