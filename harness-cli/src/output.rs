// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Everything the binary prints: log lines on stderr, documents on stdout.

use clap::{
    Args, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use owo_colors::{OwoColorize, Style};
use std::{
    fmt,
    io::{self, BufWriter, Write},
    sync::Once,
};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
    warn,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log target for lines that continue a previous message and get no `error:`-style heading.
pub(crate) const NO_HEADING_TARGET: &str = "harness::no_heading";

/// Log target the runner uses for per-attempt status lines, which carry their own status word.
const OUTCOME_TARGET: &str = "harness_runner::outcome";

/// Environment variable holding a `tracing` target filter, such as `harness_runner=trace`.
const LOG_ENV: &str = "HARNESS_LOG";

pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
    .valid(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .invalid(AnsiColor::Yellow.on_default().effects(Effects::BOLD));

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output
    #[arg(long, short, global = true, env = "HARNESS_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "HARNESS_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    /// Installs the stderr logger and returns the styles for error messages.
    ///
    /// Only the first call installs a logger.
    pub(crate) fn init(self) -> StderrStyles {
        let colorize = self.color.colorize_stderr();
        let default_level = if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        install_logger(default_level, colorize);
        StderrStyles::new(colorize)
    }
}

/// When to colorize output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum Color {
    /// Colorize if stderr is a terminal that supports it.
    #[default]
    Auto,

    /// Always colorize.
    Always,

    /// Never colorize.
    Never,
}

impl Color {
    fn colorize_stderr(self) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(supports_color::Stream::Stderr).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

static INSTALL_LOGGER: Once = Once::new();

fn install_logger(default_level: LevelFilter, colorize: bool) {
    INSTALL_LOGGER.call_once(|| {
        let (targets, bad_filter) = log_targets(std::env::var(LOG_ENV).ok(), default_level);

        let layer = tracing_subscriber::fmt::layer()
            .event_format(LogFormatter { colorize })
            .with_writer(io::stderr)
            .with_filter(targets);
        tracing_subscriber::registry().with(layer).init();

        if let Some(err) = bad_filter {
            warn!("ignoring {LOG_ENV}: {err}");
        }
    });
}

/// Parses the `HARNESS_LOG` filter. An unset, empty or invalid filter falls back to
/// `default_level`, and an invalid one is returned alongside for reporting.
fn log_targets(
    filter: Option<String>,
    default_level: LevelFilter,
) -> (Targets, Option<tracing_subscriber::filter::ParseError>) {
    let fallback = Targets::new().with_default(default_level);
    match filter.as_deref() {
        None | Some("") => (fallback, None),
        Some(filter) => match filter.parse() {
            Ok(targets) => (targets, None),
            Err(err) => (fallback, Some(err)),
        },
    }
}

/// Formats events as `<level>: <message>`, without timestamps, spans or fields.
struct LogFormatter {
    colorize: bool,
}

impl LogFormatter {
    fn heading(&self, level: Level) -> (&'static str, Style) {
        let (label, style) = match level {
            Level::ERROR => ("error", Style::new().red().bold()),
            Level::WARN => ("warning", Style::new().yellow().bold()),
            Level::INFO => ("info", Style::new().bold()),
            Level::DEBUG => ("debug", Style::new().bold()),
            Level::TRACE => ("trace", Style::new().dimmed()),
        };
        (label, if self.colorize { style } else { Style::new() })
    }
}

impl<S, N> FormatEvent<S, N> for LogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        if !matches!(metadata.target(), NO_HEADING_TARGET | OUTCOME_TARGET) {
            let (label, style) = self.heading(*metadata.level());
            write!(writer, "{}: ", label.style(style))?;
        }

        let mut message = MessageWriter {
            writer: &mut writer,
            result: Ok(()),
        };
        event.record(&mut message);
        message.result?;

        writeln!(writer)
    }
}

/// Writes the `message` field of an event and drops the rest.
struct MessageWriter<'w, 'a> {
    writer: &'a mut format::Writer<'w>,
    result: fmt::Result,
}

impl Visit for MessageWriter<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" && self.result.is_ok() {
            self.result = write!(self.writer, "{value:?}");
        }
    }
}

/// Styles for error messages printed to stderr.
#[derive(Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
}

impl StderrStyles {
    fn new(colorize: bool) -> Self {
        if colorize {
            Self {
                bold: Style::new().bold(),
            }
        } else {
            Self::default()
        }
    }
}

/// Where documents printed on stdout go.
#[derive(Default)]
pub enum OutputWriter {
    /// The process's stdout.
    #[default]
    Stdout,

    /// An in-memory buffer, for tests.
    #[cfg(test)]
    Captured(Vec<u8>),
}

impl OutputWriter {
    /// Returns a buffered writer. Callers must flush it.
    pub(crate) fn stdout(&mut self) -> Box<dyn Write + '_> {
        match self {
            Self::Stdout => Box::new(BufWriter::new(io::stdout().lock())),
            #[cfg(test)]
            Self::Captured(buf) => Box::new(buf),
        }
    }
}
