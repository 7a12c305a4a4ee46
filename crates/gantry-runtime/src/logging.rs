//! Logging setup built on `tracing-subscriber`.
//!
//! The runtime installs a global subscriber from the `[logging]` section when
//! it is built. Embedders that manage logging themselves call
//! [`RuntimeBuilder::without_logging`](crate::RuntimeBuilder::without_logging)
//! and may use [`LoggingBuilder`] directly:
//!
//! ```rust,ignore
//! use gantry_runtime::logging::LoggingBuilder;
//! use tracing_subscriber::fmt::format::FmtSpan;
//!
//! LoggingBuilder::new()
//!     .directive("gantry_supervisor=debug")
//!     .span_events(FmtSpan::NEW | FmtSpan::CLOSE)
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

impl SpanEventConfig {
    /// The `tracing-subscriber` span event mask for these flags.
    pub fn to_fmt_span(&self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(FmtSpan::NONE, |mask, (_, span)| mask | span)
    }
}

/// Builder for the global `tracing` subscriber.
#[derive(Debug)]
pub struct LoggingBuilder {
    level: Level,
    directives: Vec<String>,
    span_events: FmtSpan,
    format: LogFormat,
    output: LogOutput,
    thread_ids: bool,
    file_location: bool,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact output to stdout at `INFO`.
    pub fn new() -> Self {
        Self {
            level: Level::INFO,
            directives: Vec::new(),
            span_events: FmtSpan::NONE,
            format: LogFormat::default(),
            output: LogOutput::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
        }
    }

    /// Mirrors a `[logging]` section.
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.to_tracing_level(),
            directives: config
                .filters
                .iter()
                .map(|(target, level)| format!("{target}={level}"))
                .collect(),
            span_events: config.span_events.to_fmt_span(),
            format: config.format,
            output: config.output,
            thread_ids: config.thread_ids,
            file_location: config.file_location,
            file_path: config.file_path.clone(),
            rotation: config.rotation,
        }
    }

    /// Base level for targets without a directive.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Adds an `EnvFilter` directive such as `gantry_core=trace`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Span lifecycle events to log.
    pub fn span_events(mut self, events: FmtSpan) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Writes to `path`, rotated as given.
    pub fn file(mut self, path: impl Into<PathBuf>, rotation: LogRotation) -> Self {
        self.output = LogOutput::File;
        self.file_path = Some(path.into());
        self.rotation = rotation;
        self
    }

    /// Installs the subscriber, ignoring an already installed one.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.filter();
        let layer = self.layer(self.writer());
        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
    }

    fn filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()));

        self.directives
            .iter()
            .fold(base, |filter, directive| match directive.parse() {
                Ok(d) => filter.add_directive(d),
                Err(e) => {
                    eprintln!("Ignoring invalid log directive '{directive}': {e}");
                    filter
                }
            })
    }

    fn writer(&self) -> BoxMakeWriter {
        match (self.output, &self.file_path) {
            (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
            (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
            (LogOutput::File, Some(path)) => BoxMakeWriter::new(file_appender(path, self.rotation)),
            (LogOutput::File, None) => {
                eprintln!("File logging requested without a file path, logging to stdout");
                BoxMakeWriter::new(std::io::stdout)
            }
        }
    }

    fn layer(&self, writer: BoxMakeWriter) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(self.span_events.clone())
            .with_thread_ids(self.thread_ids)
            .with_file(self.file_location)
            .with_line_number(self.file_location);

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => {
                eprintln!("JSON logging requires the `json-log` feature, using compact output");
                layer.compact().boxed()
            }
        }
    }
}

fn file_appender(path: &Path, rotation: LogRotation) -> RollingFileAppender {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path.file_name().unwrap_or_else(|| OsStr::new("gantry.log"));
    match rotation {
        LogRotation::Never => rolling::never(dir, name),
        LogRotation::Hourly => rolling::hourly(dir, name),
        LogRotation::Daily => rolling::daily(dir, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_builder_from_config() {
        let mut config = LoggingConfig {
            level: LogLevel::Debug,
            thread_ids: true,
            rotation: LogRotation::Daily,
            ..Default::default()
        };
        config
            .filters
            .insert("gantry_supervisor".into(), LogLevel::Trace);
        config.span_events.close = true;

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.directives, ["gantry_supervisor=trace"]);
        assert!(builder.thread_ids);
        assert_eq!(builder.span_events, FmtSpan::CLOSE);
        assert_eq!(builder.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_span_event_mask() {
        let mut events = SpanEventConfig::default();
        assert_eq!(events.to_fmt_span(), FmtSpan::NONE);

        events.new = true;
        events.close = true;
        assert_eq!(events.to_fmt_span(), FmtSpan::NEW | FmtSpan::CLOSE);

        events.enter = true;
        events.exit = true;
        assert_eq!(events.to_fmt_span(), FmtSpan::FULL);
    }

    #[test]
    fn test_file_builder_switches_output() {
        let builder = LoggingBuilder::new().file("/tmp/gantry/gantry.log", LogRotation::Hourly);
        assert_eq!(builder.output, LogOutput::File);
        assert_eq!(builder.rotation, LogRotation::Hourly);
        assert!(builder.file_path.is_some());
    }
}
