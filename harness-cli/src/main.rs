// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use color_eyre::Result;
use harness_cli::{ExpectedError, HarnessApp, OutputWriter, StderrStyles};
use std::io::Write;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    let opts = match HarnessApp::try_parse() {
        Ok(opts) => opts,
        // --help and --version go to stdout and exit 0.
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => exit_with(ExpectedError::argument_parse(err), &StderrStyles::default()),
    };
    let styles = opts.init_output();

    match opts.exec(&mut OutputWriter::default()) {
        Ok(code) => std::process::exit(code),
        Err(error) => exit_with(error, &styles),
    }
}

fn exit_with(error: ExpectedError, styles: &StderrStyles) -> ! {
    error.display_to_stderr(styles);
    if let Some(summary) = error.error_summary() {
        let mut stdout = std::io::stdout().lock();
        // Nothing more can be done if stdout is gone.
        let _ = serde_json::to_writer(&mut stdout, &summary);
        let _ = writeln!(stdout);
    }
    std::process::exit(error.process_exit_code())
}
