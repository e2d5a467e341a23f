// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestExecutor;
use crate::{
    config::{CommandPlaceholders, ExecutionMode, HarnessProfile, TestCommand},
    decode::{OUTPUT_EXCERPT_CHARS, decode},
    errors::ExecuteError,
    helpers::excerpt,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use harness_metadata::{OutcomeStatus, TestId, TestOutcome};
use std::{net::TcpListener, process::Stdio, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};
use tracing::{debug, warn};

/// The number of earlier runs whose working directories are kept.
pub const RETAINED_WORK_RUNS: usize = 5;

/// How long to keep reading output after the test process exits, while a descendant still holds
/// the pipes open.
const LEAK_TIMEOUT: Duration = Duration::from_millis(100);

/// Executes a test file by spawning the profile's test command.
///
/// Each attempt gets:
///
/// * a private working directory, `<store>/work/<run id>/<test>-<attempt>`;
/// * in headless mode, a freshly allocated loopback port for the browser's debug endpoint. In
///   attach mode, the configured port of the live browser is used instead.
///
/// These are passed to the command through the `{test}`, `{port}`, `{attempt}` and `{workdir}`
/// placeholders, and through the `HARNESS_TEST_ID`, `HARNESS_ATTEMPT`, `HARNESS_DEBUG_PORT`,
/// `HARNESS_WORK_DIR` and `HARNESS_RUN_ID` environment variables.
///
/// An attempt that runs longer than the timeout is killed and recorded as undecodable.
///
/// Working directories outlive the run, since reported artifacts may point into them.
/// [`Self::prune_work_dirs`] bounds how many earlier runs are kept around.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    root: Utf8PathBuf,
    command: TestCommand,
    mode: ExecutionMode,
    timeout: Duration,
    run_id: String,
    work_dir: Utf8PathBuf,
}

impl ProcessExecutor {
    /// Creates a new executor for `profile`. Commands are run with `root` as their current
    /// directory.
    pub fn new(root: impl Into<Utf8PathBuf>, profile: &HarnessProfile) -> Self {
        let run_id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            std::process::id()
        );
        let work_dir = profile.work_dir().join(&run_id);
        Self {
            root: root.into(),
            command: profile.command().clone(),
            mode: profile.mode(),
            timeout: profile.timeout(),
            run_id,
            work_dir,
        }
    }

    /// Overrides the per-attempt timeout from the profile.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Returns the identifier of this run, shared by every attempt.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the directory the per-attempt working directories are created in.
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }

    /// Deletes the working directories of earlier runs, keeping the `keep` most recent.
    ///
    /// Run ids sort chronologically, so the newest runs are the last in name order. The current
    /// run's directory is never deleted. Failures are logged and otherwise ignored. Returns the
    /// number of directories deleted.
    pub fn prune_work_dirs(&self, keep: usize) -> usize {
        let Some(runs_dir) = self.work_dir.parent() else {
            return 0;
        };
        let entries = match runs_dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to read work directory `{runs_dir}`: {error}");
                }
                return 0;
            }
        };

        let mut earlier_runs: Vec<Utf8PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
            .filter(|entry| entry.file_name() != self.run_id)
            .map(|entry| entry.into_path())
            .collect();
        earlier_runs.sort_unstable_by(|a, b| b.cmp(a));

        let mut deleted = 0;
        for path in earlier_runs.iter().skip(keep) {
            match std::fs::remove_dir_all(path) {
                Ok(()) => {
                    debug!("deleted stale work directory `{path}`");
                    deleted += 1;
                }
                Err(error) => warn!("failed to delete stale work directory `{path}`: {error}"),
            }
        }
        deleted
    }

    async fn run(&self, id: TestId, attempt: u32) -> Result<TestOutcome, ExecuteError> {
        let work_dir = self
            .work_dir
            .join(format!("{}-{attempt}", sanitize_for_path(id.as_str())));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|error| ExecuteError::WorkDirCreate {
                id: id.clone(),
                path: work_dir.clone(),
                error,
            })?;

        let port = match self.mode {
            ExecutionMode::Headless => {
                allocate_port().map_err(|error| ExecuteError::PortAllocate {
                    id: id.clone(),
                    error,
                })?
            }
            ExecutionMode::Attach { port } => port,
        };

        let (program, args) = self.command.substitute(&CommandPlaceholders {
            test: id.as_str(),
            port,
            attempt,
            workdir: work_dir.as_str(),
        });
        let command_line = shell_words::join(std::iter::once(&program).chain(&args));
        debug!(%id, attempt, port, command = %command_line, "spawning test process");

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&self.root)
            .env("HARNESS_TEST_ID", id.as_str())
            .env("HARNESS_ATTEMPT", attempt.to_string())
            .env("HARNESS_DEBUG_PORT", port.to_string())
            .env("HARNESS_WORK_DIR", work_dir.as_str())
            .env("HARNESS_RUN_ID", &self.run_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| ExecuteError::Spawn {
                id: id.clone(),
                command: command_line,
                error,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        // Only the test process itself is subject to the timeout. Once it has exited, a
        // descendant that inherited the pipes (a browser left running, say) gets a short grace
        // period before the rest of the output is abandoned.
        let waited = {
            let mut output = std::pin::pin!(async {
                let (stdout_res, stderr_res) = tokio::join!(
                    read_pipe(stdout, &mut stdout_buf),
                    read_pipe(stderr, &mut stderr_buf),
                );
                stdout_res.and(stderr_res)
            });
            let mut output_done = false;

            let waited = tokio::time::timeout(self.timeout, async {
                loop {
                    tokio::select! {
                        res = &mut output, if !output_done => {
                            output_done = true;
                            log_read_error(&id, attempt, res);
                        }
                        status = child.wait() => break status,
                    }
                }
            })
            .await;

            if waited.is_err() {
                // The process may have exited right at the deadline, so errors here don't matter.
                _ = child.start_kill();
                _ = child.wait().await;
                debug!(%id, attempt, "test process timed out");
            }

            if !output_done {
                match tokio::time::timeout(LEAK_TIMEOUT, &mut output).await {
                    Ok(res) => log_read_error(&id, attempt, res),
                    Err(_) => debug!(
                        %id,
                        attempt,
                        "output pipes still open {:?} after exit, ignoring further output",
                        LEAK_TIMEOUT,
                    ),
                }
            }

            waited
        };

        let stdout = String::from_utf8_lossy(&stdout_buf);
        let stderr = String::from_utf8_lossy(&stderr_buf);

        match waited {
            Ok(Ok(status)) => Ok(decode(id, &stdout, &stderr, status.code()).with_attempt(attempt)),
            Ok(Err(error)) => Err(ExecuteError::Wait { id, error }),
            Err(_elapsed) => Ok(TestOutcome {
                identifier: id,
                attempt,
                status: OutcomeStatus::Undecodable {
                    error_message: format!(
                        "timed out after {}",
                        humantime::format_duration(self.timeout)
                    ),
                    stdout_excerpt: excerpt(&stdout, OUTPUT_EXCERPT_CHARS),
                    stderr_excerpt: excerpt(&stderr, OUTPUT_EXCERPT_CHARS),
                },
                artifact_refs: Vec::new(),
                exit_code: None,
            }),
        }
    }
}

impl TestExecutor for ProcessExecutor {
    fn execute(
        &self,
        id: TestId,
        attempt: u32,
    ) -> impl Future<Output = Result<TestOutcome, ExecuteError>> + Send {
        self.run(id, attempt)
    }
}

/// Reads `pipe` to the end, appending to `buf` as data arrives.
///
/// Cancel-safe: bytes read before the future is dropped stay in `buf`.
async fn read_pipe(
    pipe: Option<impl AsyncRead + Unpin>,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    while pipe.read_buf(buf).await? != 0 {}
    Ok(())
}

// Whatever was read before a pipe error is still worth decoding.
fn log_read_error(id: &TestId, attempt: u32, res: std::io::Result<()>) {
    if let Err(error) = res {
        debug!(%id, attempt, %error, "error reading test output");
    }
}

/// Binds an ephemeral loopback port and releases it for the test process to use.
fn allocate_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn sanitize_for_path(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{HarnessConfig, test_helpers::write_config};
    use camino_tempfile::{Utf8TempDir, tempdir};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn executor_with(config: &str, script: &str) -> (Utf8TempDir, ProcessExecutor) {
        let root = tempdir().unwrap();
        write_config(root.path(), config);
        std::fs::write(root.path().join("run.sh"), script).unwrap();
        let config = HarnessConfig::from_sources(root.path(), None).unwrap();
        let profile = config.profile(HarnessConfig::DEFAULT_PROFILE).unwrap();
        let executor = ProcessExecutor::new(root.path(), &profile);
        (root, executor)
    }

    const SCRIPT_CONFIG: &str = indoc! {r#"
        [profile.default]
        command = ["sh", "run.sh", "{test}", "{port}", "{attempt}", "{workdir}"]
        timeout = "10s"
    "#};

    #[tokio::test]
    async fn decodes_process_output() {
        let (_root, executor) = executor_with(
            SCRIPT_CONFIG,
            indoc! {r#"
                echo "launching browser for $1"
                printf '{"tests": 3, "passed": 3, "duration": 42, "logFile": "%s/log.txt"}\n' "$4"
                echo "browser closed" >&2
            "#},
        );

        let outcome = executor
            .execute(TestId::new("tests/hints.test.ts"), 2)
            .await
            .unwrap();
        assert_eq!(outcome.attempt, 2);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.is_passing());
        assert_eq!(outcome.duration_ms(), Some(42));

        let expected_work_dir = executor.work_dir().join("tests_hints.test.ts-2");
        assert_eq!(
            outcome.artifact_refs,
            vec![format!("{expected_work_dir}/log.txt")]
        );
        assert!(expected_work_dir.is_dir(), "working directory was created");
    }

    #[tokio::test]
    async fn sets_environment() {
        let (_root, executor) = executor_with(
            SCRIPT_CONFIG,
            indoc! {r#"
                [ "$HARNESS_TEST_ID" = "$1" ] || exit 10
                [ "$HARNESS_DEBUG_PORT" = "$2" ] || exit 11
                [ "$HARNESS_ATTEMPT" = "$3" ] || exit 12
                [ "$HARNESS_WORK_DIR" = "$4" ] || exit 13
                [ -n "$HARNESS_RUN_ID" ] || exit 14
                [ "$2" -gt 0 ] || exit 15
                echo '{"tests": 1, "passed": 1}'
            "#},
        );

        let outcome = executor.execute(TestId::new("a.test.ts"), 1).await.unwrap();
        assert_eq!(outcome.exit_code, Some(0), "{outcome:?}");
        assert!(outcome.is_passing());
    }

    #[tokio::test]
    async fn attach_mode_uses_configured_port() {
        let config = format!(
            "{SCRIPT_CONFIG}mode = \"attach\"\nattach-port = 9222\n"
        );
        let (_root, executor) = executor_with(
            &config,
            indoc! {r#"
                printf '{"tests": %s, "passed": %s}\n' "$2" "$HARNESS_DEBUG_PORT"
            "#},
        );

        let outcome = executor.execute(TestId::new("a.test.ts"), 1).await.unwrap();
        let counts = outcome.counts().unwrap();
        assert_eq!((counts.tests, counts.passed), (9222, 9222));
    }

    #[test_case(
        "echo 'Error: Cannot find module puppeteer' >&2; exit 3",
        Some(3)

        ; "crash without json"
    )]
    #[test_case(
        "echo '{\"tests\": 2, \"passed\": }'",
        Some(0)

        ; "malformed json with success exit"
    )]
    #[tokio::test]
    async fn undecodable_output(script: &str, exit_code: Option<i32>) {
        let (_root, executor) = executor_with(SCRIPT_CONFIG, script);
        let outcome = executor.execute(TestId::new("a.test.ts"), 1).await.unwrap();
        assert!(outcome.error_message().is_some(), "{outcome:?}");
        assert_eq!(outcome.exit_code, exit_code);
        assert!(!outcome.is_passing());
    }

    #[tokio::test]
    async fn timeout_kills_process() {
        let (_root, mut executor) = executor_with(
            SCRIPT_CONFIG,
            indoc! {r#"
                echo "waiting for browser"
                sleep 30
                echo '{"tests": 1, "passed": 1}'
            "#},
        );
        executor.set_timeout(Duration::from_millis(300));

        let outcome = executor.execute(TestId::new("a.test.ts"), 1).await.unwrap();
        match &outcome.status {
            OutcomeStatus::Undecodable {
                error_message,
                stdout_excerpt,
                ..
            } => {
                assert_eq!(error_message, "timed out after 300ms");
                assert_eq!(stdout_excerpt, "waiting for browser\n");
            }
            other => panic!("expected undecodable, got {other:?}"),
        }
        assert_eq!(outcome.exit_code, None);
    }

    #[tokio::test]
    async fn descendant_holding_pipes_does_not_time_out() {
        let (_root, mut executor) = executor_with(
            SCRIPT_CONFIG,
            indoc! {r#"
                sleep 8 &
                echo '{"tests": 1, "passed": 1}'
            "#},
        );
        executor.set_timeout(Duration::from_secs(2));

        let start = std::time::Instant::now();
        let outcome = executor.execute(TestId::new("a.test.ts"), 1).await.unwrap();
        assert!(outcome.is_passing(), "{outcome:?}");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "waited on the descendant: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let (_root, executor) = executor_with(
            indoc! {r#"
                [profile.default]
                command = ["/nonexistent/harness-test-runner", "{test}"]
            "#},
            "",
        );
        let error = executor
            .execute(TestId::new("a.test.ts"), 1)
            .await
            .unwrap_err();
        match error {
            ExecuteError::Spawn { id, command, .. } => {
                assert_eq!(id.as_str(), "a.test.ts");
                assert_eq!(command, "/nonexistent/harness-test-runner a.test.ts");
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[test]
    fn prune_keeps_recent_runs() {
        let (_root, executor) = executor_with(SCRIPT_CONFIG, "");
        let runs_dir = executor.work_dir().parent().unwrap().to_owned();
        let earlier = [
            "20260101T000000.000Z-10",
            "20260102T000000.000Z-11",
            "20260103T000000.000Z-12",
        ];
        for run in earlier {
            std::fs::create_dir_all(runs_dir.join(run).join("a.test.ts-1")).unwrap();
        }
        std::fs::create_dir_all(executor.work_dir()).unwrap();
        std::fs::write(runs_dir.join("stray.txt"), "").unwrap();

        assert_eq!(executor.prune_work_dirs(1), 2);

        let mut remaining: Vec<_> = runs_dir
            .read_dir_utf8()
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_owned())
            .collect();
        remaining.sort();
        let mut expected = vec![
            "20260103T000000.000Z-12".to_owned(),
            executor.run_id().to_owned(),
            "stray.txt".to_owned(),
        ];
        expected.sort();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn prune_without_work_dir_is_a_no_op() {
        let (_root, executor) = executor_with(SCRIPT_CONFIG, "");
        assert_eq!(executor.prune_work_dirs(0), 0);
    }

    #[test_case("tests/hints.test.ts", "tests_hints.test.ts" ; "nested")]
    #[test_case("a b/c:d.test.ts", "a_b_c_d.test.ts" ; "special characters")]
    fn sanitize(input: &str, expected: &str) {
        assert_eq!(sanitize_for_path(input), expected);
    }
}
