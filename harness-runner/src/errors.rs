// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the harness.

use camino::Utf8PathBuf;
use config::ConfigError;
use harness_metadata::TestId;
use std::path::PathBuf;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse harness config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A profile sets `mode = "attach"` without an `attach-port`.
    #[error("profile `{profile}` uses attach mode but does not set `attach-port`")]
    AttachPortMissing {
        /// The name of the profile.
        profile: String,
    },
}

/// An error which indicates that a profile was requested but not known to the harness.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurs while parsing a concurrency limit.
#[derive(Clone, Debug, Error)]
#[error("invalid concurrency limit `{input}`: {reason}")]
pub struct ConcurrencyLimitParseError {
    input: String,
    reason: String,
}

impl ConcurrencyLimitParseError {
    pub(crate) fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// An error that occurs while discovering test files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// A configured include or exclude glob is invalid.
    #[error("invalid glob `{glob}`")]
    InvalidGlob {
        /// The glob that failed to parse.
        glob: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// Walking the discovery root failed.
    #[error("error walking `{root}`")]
    Walk {
        /// The root being walked.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A discovered path is not valid UTF-8.
    #[error("discovered path is not valid UTF-8: {}", .path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },
}

/// An infrastructure error that occurred while executing a test attempt.
///
/// These are distinct from test failures: a test that fails or produces garbage output is recorded
/// as data, while an `ExecuteError` means the harness itself could not do its job and the run is
/// aborted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecuteError {
    /// The private working directory for an attempt could not be created.
    #[error("failed to create working directory `{path}` for `{id}`")]
    WorkDirCreate {
        /// The test being run.
        id: TestId,

        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A debug port could not be allocated.
    #[error("failed to allocate a debug port for `{id}`")]
    PortAllocate {
        /// The test being run.
        id: TestId,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The test process could not be spawned.
    #[error("failed to spawn `{command}` for `{id}`")]
    Spawn {
        /// The test being run.
        id: TestId,

        /// The command line, shell-quoted.
        command: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Waiting on the test process failed.
    #[error("failed to wait on the test process for `{id}`")]
    Wait {
        /// The test being run.
        id: TestId,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while persisting reports.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportSinkError {
    /// The reports directory could not be created.
    #[error("failed to create reports directory `{path}`")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A document could not be serialized.
    #[error("failed to serialize `{path}`")]
    Serialize {
        /// The file the document was destined for.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A document could not be written.
    #[error("failed to write `{path}`")]
    Write {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Every candidate file name for a document already existed.
    #[error("could not find an unused file name for `{path}` after {attempts} attempts")]
    NamesExhausted {
        /// The base file name.
        path: Utf8PathBuf,

        /// How many names were tried.
        attempts: usize,
    },
}

/// An error that occurs while building a test runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),
}

/// A fatal error that aborted a test run.
///
/// Exhaustive: the CLI maps each variant to its own exit code and summary.
#[derive(Debug, Error)]
pub enum TestRunnerExecuteError {
    /// No test files were discovered, and the no-tests behavior is `fail`.
    #[error("no test files found")]
    NoTestsRun,

    /// Executing a test attempt failed at the infrastructure level.
    #[error("test execution failed")]
    Execute(#[from] ExecuteError),

    /// Reports could not be persisted.
    #[error("failed to persist reports")]
    ReportSink(#[from] ReportSinkError),
}
