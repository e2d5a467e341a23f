// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ConcurrencyLimit, TestCommand};
use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

/// Overall configuration for the harness.
///
/// This is the root data structure for harness configuration. Most runner-specific configuration
/// is managed through [profiles](HarnessProfile), obtained through the [`profile`](Self::profile)
/// method.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    root: Utf8PathBuf,
    store_dir: Utf8PathBuf,
    discover: DiscoverConfig,
    default_profile: DefaultProfileImpl,
    other_profiles: BTreeMap<String, CustomProfileImpl>,
}

impl HarnessConfig {
    /// The default location of the config within the repository: `.config/harness.toml`.
    pub const CONFIG_PATH: &'static str = ".config/harness.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the harness config from the given file, or if not specified from
    /// `.config/harness.toml` in the given root directory.
    ///
    /// If the file isn't specified and the directory doesn't have `.config/harness.toml`, uses the
    /// default config options.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match config_file {
            Some(file) => (
                file.to_owned(),
                File::new(file.as_str(), FileFormat::Toml),
            ),
            None => {
                let file = root.join(Self::CONFIG_PATH);
                let source = File::new(file.as_str(), FileFormat::Toml).required(false);
                (file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let deserialized = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        Self::from_deserialized(root, deserialized)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))
    }

    /// Returns the root directory paths are resolved against.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the test discovery settings.
    pub fn discover(&self) -> &DiscoverConfig {
        &self.discover
    }

    /// Returns the names of all known profiles, the default profile first.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(Self::DEFAULT_PROFILE).chain(self.other_profiles.keys().map(|s| s.as_str()))
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<HarnessProfile, ProfileNotFound> {
        let name = name.as_ref();
        let custom = if name == Self::DEFAULT_PROFILE {
            None
        } else {
            Some(
                self.other_profiles
                    .get(name)
                    .ok_or_else(|| ProfileNotFound::new(name, self.profile_names()))?,
            )
        };

        let default = &self.default_profile;
        let mode = match custom.and_then(|p| p.mode).unwrap_or(default.mode) {
            ExecutionModeKind::Headless => ExecutionMode::Headless,
            ExecutionModeKind::Attach => ExecutionMode::Attach {
                // Validated at load time.
                port: custom
                    .and_then(|p| p.attach_port)
                    .or(default.attach_port)
                    .unwrap_or_default(),
            },
        };

        Ok(HarnessProfile {
            name: name.to_owned(),
            store_dir: self.store_dir.join(name),
            test_threads: custom
                .and_then(|p| p.test_threads)
                .unwrap_or(default.test_threads),
            retry: custom.and_then(|p| p.retry).unwrap_or(default.retry),
            timeout: custom.and_then(|p| p.timeout).unwrap_or(default.timeout),
            no_tests: custom.and_then(|p| p.no_tests).unwrap_or(default.no_tests),
            command: custom
                .and_then(|p| p.command.clone())
                .unwrap_or_else(|| default.command.clone()),
            mode,
            markdown_summary: custom
                .and_then(|p| p.markdown_summary)
                .unwrap_or(default.markdown_summary),
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<HarnessConfigDeserialize, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        serde_path_to_error::deserialize(config)
            .map_err(|error| ConfigParseErrorKind::DeserializeError(Box::new(error)))
    }

    fn from_deserialized(
        root: Utf8PathBuf,
        mut deserialized: HarnessConfigDeserialize,
    ) -> Result<Self, ConfigParseErrorKind> {
        let default_profile = DefaultProfileImpl::new(
            deserialized
                .profiles
                .remove(Self::DEFAULT_PROFILE)
                .expect("default profile should be present in the default config"),
        );

        // An attach-mode profile needs a port from somewhere.
        let profiles = std::iter::once((Self::DEFAULT_PROFILE, None))
            .chain(deserialized.profiles.iter().map(|(name, p)| (name.as_str(), Some(p))));
        for (name, custom) in profiles {
            let mode = custom.and_then(|p| p.mode).unwrap_or(default_profile.mode);
            let port = custom
                .and_then(|p| p.attach_port)
                .or(default_profile.attach_port);
            if mode == ExecutionModeKind::Attach && port.is_none() {
                return Err(ConfigParseErrorKind::AttachPortMissing {
                    profile: name.to_owned(),
                });
            }
        }

        let store_dir = root.join(&deserialized.store.dir);
        Ok(Self {
            root,
            store_dir,
            discover: deserialized.discover,
            default_profile,
            other_profiles: deserialized.profiles,
        })
    }
}

/// Test discovery settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoverConfig {
    /// Globs a path must match to be treated as a test file.
    pub include: Vec<String>,

    /// Globs that exclude a path from being treated as a test file.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A configuration profile, with inherited values from the default profile resolved.
///
/// Returned by [`HarnessConfig::profile`].
#[derive(Clone, Debug)]
pub struct HarnessProfile {
    name: String,
    store_dir: Utf8PathBuf,
    test_threads: ConcurrencyLimit,
    retry: bool,
    timeout: Duration,
    no_tests: NoTestsBehavior,
    command: TestCommand,
    mode: ExecutionMode,
    markdown_summary: bool,
}

impl HarnessProfile {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the absolute profile-specific store directory.
    pub fn store_dir(&self) -> &Utf8Path {
        &self.store_dir
    }

    /// Returns the directory reports and diagnostics are written to.
    pub fn reports_dir(&self) -> Utf8PathBuf {
        self.store_dir.join("reports")
    }

    /// Returns the directory under which per-attempt working directories are created.
    pub fn work_dir(&self) -> Utf8PathBuf {
        self.store_dir.join("work")
    }

    /// Returns the number of test files to run simultaneously.
    pub fn test_threads(&self) -> ConcurrencyLimit {
        self.test_threads
    }

    /// Returns true if failing test files should be retried once.
    pub fn retry(&self) -> bool {
        self.retry
    }

    /// Returns the per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns what to do when no test files are discovered.
    pub fn no_tests(&self) -> NoTestsBehavior {
        self.no_tests
    }

    /// Returns the command used to run a single test file.
    pub fn command(&self) -> &TestCommand {
        &self.command
    }

    /// Returns how test processes reach a browser.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns true if a Markdown summary should be written next to the JSON report.
    pub fn markdown_summary(&self) -> bool {
        self.markdown_summary
    }

    /// Returns a serializable view of this profile, for `harness show-config`.
    pub fn to_summary(&self) -> ProfileSummary {
        ProfileSummary {
            name: self.name.clone(),
            store_dir: self.store_dir.clone(),
            test_threads: self.test_threads.resolve().get(),
            retry: self.retry,
            timeout: humantime::format_duration(self.timeout).to_string(),
            no_tests: self.no_tests,
            command: self.command.to_string(),
            mode: self.mode.to_string(),
            markdown_summary: self.markdown_summary,
        }
    }
}

/// A resolved profile, as printed by `harness show-config`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileSummary {
    name: String,
    store_dir: Utf8PathBuf,
    test_threads: usize,
    retry: bool,
    timeout: String,
    no_tests: NoTestsBehavior,
    command: String,
    mode: String,
    markdown_summary: bool,
}

/// What to do when no test files are discovered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoTestsBehavior {
    /// Treat the run as a fatal discovery failure: no reports are written and the exit code is
    /// non-zero.
    #[default]
    Fail,

    /// Log a warning, then report a vacuously successful run.
    Warn,

    /// Silently report a vacuously successful run.
    Pass,
}

/// How test processes reach a browser.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionMode {
    /// Every attempt launches its own headless browser on a freshly allocated debug port.
    Headless,

    /// Every attempt drives an already-running browser at this debug port.
    Attach {
        /// The debug port of the live browser.
        port: u16,
    },
}

impl ExecutionMode {
    /// Returns true if attempts share a single browser and must not overlap.
    pub fn is_shared(self) -> bool {
        matches!(self, Self::Attach { .. })
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Headless => f.write_str("headless"),
            Self::Attach { port } => write!(f, "attach (port {port})"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ExecutionModeKind {
    Headless,
    Attach,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HarnessConfigDeserialize {
    store: StoreConfigImpl,
    discover: DiscoverConfig,
    #[serde(rename = "profile")]
    profiles: BTreeMap<String, CustomProfileImpl>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StoreConfigImpl {
    dir: Utf8PathBuf,
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    test_threads: ConcurrencyLimit,
    retry: bool,
    timeout: Duration,
    no_tests: NoTestsBehavior,
    command: TestCommand,
    mode: ExecutionModeKind,
    attach_port: Option<u16>,
    markdown_summary: bool,
}

impl DefaultProfileImpl {
    fn new(p: CustomProfileImpl) -> Self {
        Self {
            test_threads: p
                .test_threads
                .expect("test-threads present in default profile"),
            retry: p.retry.expect("retry present in default profile"),
            timeout: p.timeout.expect("timeout present in default profile"),
            no_tests: p.no_tests.expect("no-tests present in default profile"),
            command: p.command.expect("command present in default profile"),
            mode: p.mode.expect("mode present in default profile"),
            attach_port: p.attach_port,
            markdown_summary: p
                .markdown_summary
                .expect("markdown-summary present in default profile"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    test_threads: Option<ConcurrencyLimit>,
    #[serde(default)]
    retry: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    no_tests: Option<NoTestsBehavior>,
    #[serde(default)]
    command: Option<TestCommand>,
    #[serde(default)]
    mode: Option<ExecutionModeKind>,
    #[serde(default)]
    attach_port: Option<u16>,
    #[serde(default)]
    markdown_summary: Option<bool>,
}
