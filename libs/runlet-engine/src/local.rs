// Local process backend: runs submissions directly on the host when no
// cluster scheduler is available. Interpreted languages get the code as a
// literal argv element; compiled languages are staged in a per-request
// scratch directory whose removal is guaranteed on every exit path.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::registry::{LanguageSpec, LocalCommand};
use crate::types::{ExecutionRequest, ExecutionResult, ExecutionStatus};

pub struct LocalBackend;

impl LocalBackend {
    /// Execute a request with the host toolchain. All failure modes fold
    /// into an `ExecutionResult`; nothing propagates to the router.
    pub async fn run(&self, spec: &LanguageSpec, request: &ExecutionRequest) -> ExecutionResult {
        match &spec.local {
            LocalCommand::Interpreted { program, args } => {
                self.run_interpreted(program, args, request).await
            }
            LocalCommand::Compiled {
                source_file,
                compile,
                run,
            } => self.run_compiled(source_file, compile, run, request).await,
        }
    }

    async fn run_interpreted(
        &self,
        program: &str,
        args: &[&str],
        request: &ExecutionRequest,
    ) -> ExecutionResult {
        let mut cmd = Command::new(program);
        cmd.args(args).arg(&request.code);

        match run_bounded(&mut cmd, request).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::failed(e.to_string()),
        }
    }

    async fn run_compiled(
        &self,
        source_file: &str,
        compile: &[&str],
        run: &[&str],
        request: &ExecutionRequest,
    ) -> ExecutionResult {
        // Scratch dir is unique per request, so concurrent submissions of
        // the same language never collide on Main.java / main.cpp. The
        // TempDir guard removes source and binary on every path out of this
        // function, including timeouts and early error returns.
        let scratch = match tempfile::Builder::new().prefix("runlet-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return ExecutionResult::failed(format!("scratch workspace error: {e}")),
        };

        if let Err(e) = tokio::fs::write(scratch.path().join(source_file), &request.code).await {
            return ExecutionResult::failed(format!("failed to stage source: {e}"));
        }

        let mut compiler = command_in_dir(compile, scratch.path());
        match run_bounded(&mut compiler, request).await {
            Ok(result) if result.status == ExecutionStatus::Succeeded => {
                debug!(language = %request.language, "compilation succeeded");
            }
            // Compile error: surface the compiler's stderr verbatim and
            // never run the binary. A timed-out compile stays a timeout.
            Ok(result) => return result,
            Err(e) => return ExecutionResult::failed(e.to_string()),
        }

        let mut runner = command_in_dir(run, scratch.path());
        match run_bounded(&mut runner, request).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::failed(e.to_string()),
        }
    }
}

/// Build a command from an argv list rooted in the scratch directory. A
/// `./`-prefixed program refers to an artifact produced by the compile step.
fn command_in_dir(argv: &[&str], dir: &Path) -> Command {
    let program = argv[0];
    let mut cmd = if let Some(artifact) = program.strip_prefix("./") {
        Command::new(dir.join(artifact))
    } else {
        Command::new(program)
    };
    cmd.args(&argv[1..]).current_dir(dir);
    cmd
}

/// Spawn a command and wait for it under the request's wall-clock deadline.
///
/// The child runs as the leader of its own process group. When the timeout
/// fires, the whole group is SIGKILLed, so descendants spawned by the
/// submitted code die with it; `kill_on_drop` alone only reaches the direct
/// child and stays as a backstop.
async fn run_bounded(
    cmd: &mut Command,
    request: &ExecutionRequest,
) -> std::io::Result<ExecutionResult> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let pid = child.id();

    match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            if output.status.success() {
                Ok(ExecutionResult::succeeded(
                    String::from_utf8_lossy(&output.stdout).to_string(),
                ))
            } else {
                Ok(ExecutionResult::failed(
                    String::from_utf8_lossy(&output.stderr).to_string(),
                ))
            }
        }
        Err(_) => {
            warn!(
                language = %request.language,
                timeout_secs = request.timeout.as_secs(),
                "local execution timed out, killing process group"
            );
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            Ok(ExecutionResult::timed_out())
        }
    }
}

/// SIGKILL an entire process group. The group id equals the direct child's
/// pid because it was spawned with `process_group(0)`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    unsafe {
        libc::killpg(pid as i32, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LanguageRegistry;
    use crate::types::{ExecutionStatus, Language, TIMEOUT_MESSAGE};
    use std::time::{Duration, Instant};

    fn request(code: &str, language: Language, timeout_secs: u64) -> ExecutionRequest {
        ExecutionRequest::new(code, language, Duration::from_secs(timeout_secs))
    }

    fn spec(registry: &LanguageRegistry, language: &str) -> LanguageSpec {
        registry.resolve(language).unwrap().clone()
    }

    #[tokio::test]
    async fn test_python_stdout_is_captured() {
        let registry = LanguageRegistry::load().unwrap();
        let result = LocalBackend
            .run(
                &spec(&registry, "python"),
                &request("print('hi')", Language::Python, 10),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.output, "hi\n");
        assert_eq!(result.error, "");
    }

    #[tokio::test]
    async fn test_python_nonzero_exit_is_failed() {
        let registry = LanguageRegistry::load().unwrap();
        let result = LocalBackend
            .run(
                &spec(&registry, "python"),
                &request("import sys; sys.exit(1)", Language::Python, 10),
            )
            .await;

        // Silent non-zero exit: failed status with stderr verbatim (empty).
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error, "");
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    async fn test_python_stderr_is_surfaced_on_failure() {
        let registry = LanguageRegistry::load().unwrap();
        let result = LocalBackend
            .run(
                &spec(&registry, "python"),
                &request("raise RuntimeError('boom')", Language::Python, 10),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.contains("boom"));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_process_within_margin() {
        let registry = LanguageRegistry::load().unwrap();
        let start = Instant::now();
        let result = LocalBackend
            .run(
                &spec(&registry, "python"),
                &request("while True: pass", Language::Python, 2),
            )
            .await;
        let elapsed = start.elapsed();

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.error, TIMEOUT_MESSAGE);
        assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_concurrent_requests_do_not_cross_talk() {
        let registry = LanguageRegistry::load().unwrap();
        let python = spec(&registry, "python");

        let alpha = request("print('alpha')", Language::Python, 10);
        let beta = request("print('beta')", Language::Python, 10);
        let gamma = request("print('gamma')", Language::Python, 10);

        let (a, b, c) = tokio::join!(
            LocalBackend.run(&python, &alpha),
            LocalBackend.run(&python, &beta),
            LocalBackend.run(&python, &gamma),
        );

        assert_eq!(a.output, "alpha\n");
        assert_eq!(b.output, "beta\n");
        assert_eq!(c.output, "gamma\n");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_reaps_descendant_processes() {
        let registry = LanguageRegistry::load().unwrap();
        let pid_file = std::env::temp_dir().join(format!(
            "runlet-descendant-{}",
            uuid::Uuid::new_v4().simple()
        ));

        // The submitted code spawns a long-lived descendant, records its
        // pid, then spins past the deadline.
        let code = format!(
            "import subprocess, pathlib\n\
             p = subprocess.Popen(['sleep', '300'])\n\
             pathlib.Path({:?}).write_text(str(p.pid))\n\
             while True: pass",
            pid_file.to_str().unwrap()
        );
        let result = LocalBackend
            .run(
                &spec(&registry, "python"),
                &request(&code, Language::Python, 2),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Timeout);

        let descendant_pid = tokio::fs::read_to_string(&pid_file)
            .await
            .expect("descendant pid was never recorded");
        let _ = tokio::fs::remove_file(&pid_file).await;

        // Give the group SIGKILL a moment to be delivered and reaped.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let proc_entry = format!("/proc/{}", descendant_pid.trim());
        assert!(
            !std::path::Path::new(&proc_entry).exists(),
            "descendant process {} survived the timeout kill",
            descendant_pid.trim()
        );
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_compile_error_skips_execution() {
        let registry = LanguageRegistry::load().unwrap();
        let result = LocalBackend
            .run(
                &spec(&registry, "c++"),
                &request("int main( {", Language::Cpp, 10),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.contains("error"));
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_nonzero_exit_with_empty_streams() {
        let registry = LanguageRegistry::load().unwrap();
        let result = LocalBackend
            .run(
                &spec(&registry, "c++"),
                &request("int main(){return 1;}", Language::Cpp, 10),
            )
            .await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error, "");
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_hello_world() {
        let registry = LanguageRegistry::load().unwrap();
        let code = "#include <cstdio>\nint main(){ printf(\"hello\\n\"); return 0; }";
        let result = LocalBackend
            .run(&spec(&registry, "c++"), &request(code, Language::Cpp, 10))
            .await;

        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.output, "hello\n");
    }

    #[tokio::test]
    #[ignore] // Requires a JDK
    async fn test_java_hello_world() {
        let registry = LanguageRegistry::load().unwrap();
        let code = "public class Main { public static void main(String[] a) { System.out.println(\"hello\"); } }";
        let result = LocalBackend
            .run(&spec(&registry, "java"), &request(code, Language::Java, 20))
            .await;

        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.output, "hello\n");
    }
}
