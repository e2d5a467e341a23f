// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use harness_metadata::{ErrorSummary, HarnessExitCode};
use harness_runner::errors::*;
use owo_colors::OwoColorize;
use std::{error::Error, path::PathBuf};
use swrite::{SWrite, swrite};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are short placeholders. Errors are meant to be printed with
// display_to_stderr, which adds context and colors.

/// An expected failure: bad input, a broken environment, or a failing test run.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("invalid arguments")]
    ArgumentParse {
        #[source]
        err: clap::Error,
    },
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("test discovery failed")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("building test runner failed")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("no test files found")]
    NoTestsRun { root: Utf8PathBuf },
    #[error("test execution failed")]
    ExecuteError {
        #[source]
        err: ExecuteError,
    },
    #[error("failed to persist reports")]
    ReportSinkError {
        #[source]
        err: ReportSinkError,
    },
    #[error("writing output failed")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn from_execute(err: TestRunnerExecuteError, root: Utf8PathBuf) -> Self {
        match err {
            TestRunnerExecuteError::NoTestsRun => Self::NoTestsRun { root },
            TestRunnerExecuteError::Execute(err) => Self::ExecuteError { err },
            TestRunnerExecuteError::ReportSink(err) => Self::ReportSinkError { err },
        }
    }

    /// Wraps a command-line parse error. Requests for help or version text are not errors and
    /// should be handled with [`clap::Error::exit`] instead.
    pub fn argument_parse(err: clap::Error) -> Self {
        Self::ArgumentParse { err }
    }

    pub(crate) fn write_output(err: std::io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ArgumentParse { .. }
            | Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::DiscoveryError { .. }
            | Self::TestRunnerBuildError { .. } => HarnessExitCode::SETUP_ERROR,
            Self::NoTestsRun { .. } => HarnessExitCode::NO_TESTS_RUN,
            Self::ExecuteError { .. } | Self::ReportSinkError { .. } => {
                HarnessExitCode::INFRASTRUCTURE_ERROR
            }
            Self::WriteOutputError { .. } => HarnessExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => HarnessExitCode::TEST_RUN_FAILED,
        }
    }

    /// Returns the payload to print on stdout in place of a run summary, if any.
    ///
    /// A failing test run has already printed its summary, and a failure to write output can't
    /// be reported on stdout.
    pub fn error_summary(&self) -> Option<ErrorSummary> {
        match self {
            Self::TestRunFailed | Self::WriteOutputError { .. } => None,
            Self::ArgumentParse { err } => Some(ErrorSummary::new(format!(
                "{self}: {}",
                clap_message(err)
            ))),
            _ => Some(ErrorSummary::new(self.message_with_causes())),
        }
    }

    fn message_with_causes(&self) -> String {
        let mut message = self.to_string();
        let mut next_error = self.source();
        while let Some(err) = next_error {
            swrite!(message, ": {err}");
            next_error = err.source();
        }
        message
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ArgumentParse { err } => {
                // clap renders its own message, with usage and colors.
                _ = err.print();
                None
            }
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse harness config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::DiscoveryError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::NoTestsRun { root } => {
                error!(
                    "no test files found under `{}` (pass --no-tests=warn or --no-tests=pass to \
                     allow empty runs)",
                    root.style(styles.bold)
                );
                None
            }
            Self::ExecuteError { err } => {
                error!("{err}");
                err.source()
            }
            Self::ReportSinkError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

/// The first line of a clap error, without its `error: ` heading.
fn clap_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let first_line = rendered.lines().next().unwrap_or_default();
    first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HarnessApp;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_summary_includes_causes() {
        let err = ExpectedError::ReportSinkError {
            err: ReportSinkError::CreateDir {
                path: "target/harness/reports".into(),
                error: std::io::Error::other("read-only file system"),
            },
        };
        assert_eq!(
            err.error_summary(),
            Some(ErrorSummary::new(
                "failed to persist reports: failed to create reports directory \
                 `target/harness/reports`: read-only file system"
            ))
        );
        assert_eq!(err.process_exit_code(), 1);
    }

    #[test]
    fn argument_errors_are_setup_errors() {
        let err = HarnessApp::try_parse_from(["harness", "run", "-j", "lots"]).unwrap_err();
        assert!(err.use_stderr());
        let err = ExpectedError::argument_parse(err);
        assert_eq!(err.process_exit_code(), HarnessExitCode::SETUP_ERROR);

        let summary = err.error_summary().expect("argument errors have a summary");
        assert!(!summary.success);
        assert!(
            summary
                .error
                .starts_with("invalid arguments: invalid value 'lots' for '--limit <N>'"),
            "{summary:?}"
        );
        assert!(!summary.error.contains('\n'), "{summary:?}");
    }

    #[test]
    fn help_is_not_an_argument_error() {
        for flag in ["--help", "--version"] {
            let err = HarnessApp::try_parse_from(["harness", flag]).unwrap_err();
            assert!(!err.use_stderr(), "{flag} prints to stdout and exits 0");
        }
    }

    #[test]
    fn failing_run_has_no_error_summary() {
        assert_eq!(ExpectedError::TestRunFailed.error_summary(), None);
        assert_eq!(
            ExpectedError::TestRunFailed.process_exit_code(),
            HarnessExitCode::TEST_RUN_FAILED
        );
    }

    #[test]
    fn from_execute_maps_every_variant() {
        let execute = ExpectedError::from_execute(
            TestRunnerExecuteError::Execute(ExecuteError::PortAllocate {
                id: "a.test.js".into(),
                error: std::io::Error::other("no ports left"),
            }),
            "/repo".into(),
        );
        assert!(matches!(execute, ExpectedError::ExecuteError { .. }));
        assert_eq!(
            execute.process_exit_code(),
            HarnessExitCode::INFRASTRUCTURE_ERROR
        );

        let sink = ExpectedError::from_execute(
            TestRunnerExecuteError::ReportSink(ReportSinkError::CreateDir {
                path: "out".into(),
                error: std::io::Error::other("denied"),
            }),
            "/repo".into(),
        );
        assert!(matches!(sink, ExpectedError::ReportSinkError { .. }));

        let no_tests =
            ExpectedError::from_execute(TestRunnerExecuteError::NoTestsRun, "/repo".into());
        assert!(matches!(no_tests, ExpectedError::NoTestsRun { .. }));
        assert_eq!(no_tests.process_exit_code(), HarnessExitCode::NO_TESTS_RUN);
    }

    #[test]
    fn no_tests_summary() {
        let err = ExpectedError::from_execute(TestRunnerExecuteError::NoTestsRun, "/repo".into());
        assert_eq!(
            err.error_summary(),
            Some(ErrorSummary::new("no test files found"))
        );
    }
}
