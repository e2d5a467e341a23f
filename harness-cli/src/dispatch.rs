// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command dispatch and execution.

use crate::{
    ExpectedError, Result,
    output::{OutputOpts, OutputWriter, StderrStyles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use harness_metadata::{HarnessExitCode, TestId};
use harness_runner::{
    config::{ConcurrencyLimit, HarnessConfig, HarnessProfile, NoTestsBehavior},
    discovery::TestDiscovery,
    executor::{ProcessExecutor, RETAINED_WORK_RUNS},
    runner::TestRunnerBuilder,
};
use std::{io::Write, time::Duration};
use tracing::debug;

/// Runs browser-extension test files in parallel, retrying failures once.
///
/// A JSON summary of the run is printed to stdout; everything else goes to stderr.
#[derive(Debug, Parser)]
#[command(
    version,
    name = "harness",
    styles = crate::output::CLAP_STYLES,
    max_term_width = 100,
)]
pub struct HarnessApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl HarnessApp {
    /// Installs the stderr logger and returns the styles for error messages.
    pub fn init_output(&self) -> StderrStyles {
        self.output.init()
    }

    /// Executes the app, returning the exit code.
    pub fn exec(self, output_writer: &mut OutputWriter) -> Result<i32> {
        let root = current_dir()?;
        self.exec_in(root, output_writer)
    }

    fn exec_in(self, root: Utf8PathBuf, output_writer: &mut OutputWriter) -> Result<i32> {
        let config = self.config_opts.make_config(&root)?;
        match self.command {
            Command::Run(run_opts) => {
                let profile = config.profile(&self.config_opts.profile)?;
                run_opts.exec(&config, &profile, output_writer)
            }
            Command::List {
                filter,
                message_format,
            } => {
                let ids = filter.discover(&config)?;
                write_list(&ids, message_format, output_writer)?;
                Ok(HarnessExitCode::OK)
            }
            Command::ShowConfig => {
                let profile = config.profile(&self.config_opts.profile)?;
                let mut writer = output_writer.stdout();
                serde_json::to_writer_pretty(&mut writer, &profile.to_summary())
                    .map_err(|err| ExpectedError::write_output(err.into()))?;
                writeln!(writer).map_err(ExpectedError::write_output)?;
                writer.flush().map_err(ExpectedError::write_output)?;
                Ok(HarnessExitCode::OK)
            }
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::from_path_buf(dir).map_err(|path| ExpectedError::CurrentDirInvalidUtf8 { path })
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/harness.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Harness profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        env = "HARNESS_PROFILE",
        default_value = HarnessConfig::DEFAULT_PROFILE,
    )]
    profile: String,
}

impl ConfigOpts {
    fn make_config(&self, root: &Utf8Path) -> Result<HarnessConfig> {
        Ok(HarnessConfig::from_sources(root, self.config_file.as_deref())?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run test files
    ///
    /// Every selected test file is run through the configured command, with up to --limit files
    /// at a time. Failing files are retried once. The reports are written to the reports
    /// directory and a JSON summary is printed to stdout.
    Run(RunOpts),

    /// List the test files that would be run
    List {
        #[clap(flatten)]
        filter: TestFilterOpts,

        /// Output format
        #[arg(short = 'T', long, value_enum, default_value_t, value_name = "FMT")]
        message_format: MessageFormatOpts,
    },

    /// Print the resolved profile as JSON
    ShowConfig,
}

#[derive(Debug, Args)]
struct TestFilterOpts {
    /// Test files, directories or globs, relative to the current directory [default: all test
    /// files]
    #[arg(value_name = "PATH")]
    paths: Vec<String>,
}

impl TestFilterOpts {
    fn discover(&self, config: &HarnessConfig) -> Result<Vec<TestId>> {
        let discovery = TestDiscovery::new(config.root(), config.discover())?;
        let ids = discovery.discover(self.paths.as_slice())?;
        debug!(
            "discovered {} test files under {}",
            ids.len(),
            discovery.root()
        );
        Ok(ids)
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormatOpts {
    #[default]
    Human,
    Json,
}

fn write_list(
    ids: &[TestId],
    message_format: MessageFormatOpts,
    output_writer: &mut OutputWriter,
) -> Result<()> {
    let mut writer = output_writer.stdout();
    match message_format {
        MessageFormatOpts::Human => {
            for id in ids {
                writeln!(writer, "{id}").map_err(ExpectedError::write_output)?;
            }
        }
        MessageFormatOpts::Json => {
            serde_json::to_writer(&mut writer, ids)
                .map_err(|err| ExpectedError::write_output(err.into()))?;
            writeln!(writer).map_err(ExpectedError::write_output)?;
        }
    }
    writer.flush().map_err(ExpectedError::write_output)
}

#[derive(Debug, Args)]
struct RunOpts {
    #[clap(flatten)]
    filter: TestFilterOpts,

    #[clap(flatten)]
    runner_opts: TestRunnerOpts,
}

impl RunOpts {
    fn exec(
        self,
        config: &HarnessConfig,
        profile: &HarnessProfile,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let ids = self.filter.discover(config)?;

        let mut executor = ProcessExecutor::new(config.root(), profile);
        if let Some(timeout) = self.runner_opts.timeout {
            executor.set_timeout(timeout);
        }
        debug!(
            "run id {}, working directories under {}",
            executor.run_id(),
            executor.work_dir()
        );
        executor.prune_work_dirs(RETAINED_WORK_RUNS);

        let runner = self
            .runner_opts
            .to_builder(config.root())
            .build(profile, executor)?;
        let outcome = runner
            .execute(ids)
            .map_err(|err| ExpectedError::from_execute(err, config.root().to_owned()))?;

        let mut writer = output_writer.stdout();
        serde_json::to_writer_pretty(&mut writer, &outcome.summary)
            .map_err(|err| ExpectedError::write_output(err.into()))?;
        writeln!(writer).map_err(ExpectedError::write_output)?;
        writer.flush().map_err(ExpectedError::write_output)?;

        if outcome.exit_code == HarnessExitCode::OK {
            Ok(HarnessExitCode::OK)
        } else {
            Err(ExpectedError::TestRunFailed)
        }
    }
}

/// Test runner options.
#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Runner options")]
struct TestRunnerOpts {
    /// Number of test files to run simultaneously [default: from profile]
    #[arg(
        long,
        short = 'j',
        visible_alias = "test-threads",
        value_name = "N",
        env = "HARNESS_TEST_THREADS",
        allow_negative_numbers = true
    )]
    limit: Option<ConcurrencyLimit>,

    /// Do not retry failing test files
    #[arg(long)]
    no_retry: bool,

    /// Behavior if there are no test files to run [default: from profile]
    #[arg(long, value_enum, value_name = "ACTION")]
    no_tests: Option<NoTestsBehaviorOpt>,

    /// Kill an attempt that runs longer than this, e.g. 90s or 3m [default: from profile]
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Directory to write reports to [default: from profile]
    #[arg(long, value_name = "DIR")]
    reports_dir: Option<Utf8PathBuf>,
}

impl TestRunnerOpts {
    /// Relative paths are resolved against `root`.
    fn to_builder(&self, root: &Utf8Path) -> TestRunnerBuilder {
        let mut builder = TestRunnerBuilder::default();
        if let Some(limit) = self.limit {
            builder.set_test_threads(limit);
        }
        if self.no_retry {
            builder.set_retry(false);
        }
        if let Some(no_tests) = self.no_tests {
            builder.set_no_tests(no_tests.into());
        }
        if let Some(reports_dir) = &self.reports_dir {
            builder.set_reports_dir(root.join(reports_dir));
        }
        builder
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NoTestsBehaviorOpt {
    /// Exit with a failure, without writing reports.
    Fail,

    /// Print a warning and report a successful run.
    Warn,

    /// Report a successful run.
    Pass,
}

impl From<NoTestsBehaviorOpt> for NoTestsBehavior {
    fn from(opt: NoTestsBehaviorOpt) -> Self {
        match opt {
            NoTestsBehaviorOpt::Fail => NoTestsBehavior::Fail,
            NoTestsBehaviorOpt::Warn => NoTestsBehavior::Warn,
            NoTestsBehaviorOpt::Pass => NoTestsBehavior::Pass,
        }
    }
}
