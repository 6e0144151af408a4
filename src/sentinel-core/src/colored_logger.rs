//! Colored logging infrastructure for component identification
//!
//! Provides a custom tracing formatter that prefixes every line with the
//! component that emitted it (capture, detection, delivery). The same
//! formatter without colors feeds the append-only event log.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    format::{FormatEvent, FormatFields, Writer},
    FmtContext,
};
use tracing_subscriber::registry::LookupSpan;

/// Component identifier for prefixing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Main,
    Capture,
    Detect,
    Deliver,
}

impl Component {
    /// Map an event target (module path) to its component
    pub fn from_target(target: &str) -> Self {
        if target.starts_with("sentinel_capture") {
            Component::Capture
        } else if target.starts_with("sentinel_processing")
            || target.starts_with("sentinel_core::detector")
            || target.starts_with("sentinel_core::dispatcher")
            || target.starts_with("sentinel_core::snapshot")
        {
            Component::Detect
        } else if target.starts_with("sentinel_delivery") {
            Component::Deliver
        } else {
            Component::Main
        }
    }

    /// Get the string representation for logging prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Main => "MAIN",
            Component::Capture => "CAPTURE",
            Component::Detect => "DETECT",
            Component::Deliver => "DELIVER",
        }
    }

    /// Get the color style for this component
    pub fn color_style(&self) -> Style {
        match self {
            Component::Main => Style::new().cyan().bold(),
            Component::Capture => Style::new().blue().bold(),
            Component::Detect => Style::new().green().bold(),
            Component::Deliver => Style::new().magenta().bold(),
        }
    }
}

/// Custom formatter with component prefixes and colors
pub struct ColoredFormatter;

impl<S, N> FormatEvent<S, N> for ColoredFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let component = Component::from_target(metadata.target());

        // Timestamp (HH:MM:SS format)
        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%H:%M:%S").dimmed())?;

        let prefix = format!("[{:7}]", component.as_str());
        write!(writer, "{} ", prefix.style(component.color_style()))?;

        match *metadata.level() {
            Level::ERROR => write!(writer, "{} ", "ERROR".red().bold())?,
            Level::WARN => write!(writer, "{} ", "WARN ".yellow().bold())?,
            Level::INFO => write!(writer, "{} ", "INFO ".green().bold())?,
            Level::DEBUG => write!(writer, "{} ", "DEBUG".blue().bold())?,
            Level::TRACE => write!(writer, "{} ", "TRACE".dimmed().bold())?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// One plain line per event for the log file
pub struct PlainFormatter;

impl<S, N> FormatEvent<S, N> for PlainFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let component = Component::from_target(metadata.target());

        write!(
            writer,
            "{} [{}] {:5} ",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            component.as_str(),
            metadata.level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Logging destinations
#[derive(Debug, Clone, Copy)]
pub struct LogOptions<'a> {
    pub verbose: bool,
    /// Colored output on stdout, off when detached
    pub console: bool,
    /// Append-only event log
    pub log_file: Option<&'a Path>,
}

/// Initialize logging
///
/// `RUST_LOG` overrides the default level. Should be called once per process.
pub fn init_logging(options: LogOptions<'_>) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if options.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let console_layer = options.console.then(|| {
        tracing_subscriber::fmt::layer()
            .event_format(ColoredFormatter)
            .with_writer(io::stdout)
    });

    let file_layer = match options.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("failed to open log file {:?}: {}", path, e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .event_format(PlainFormatter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_from_target() {
        assert_eq!(Component::from_target("sentinel_capture::ffmpeg"), Component::Capture);
        assert_eq!(Component::from_target("sentinel_processing::roi"), Component::Detect);
        assert_eq!(Component::from_target("sentinel_core::detector"), Component::Detect);
        assert_eq!(Component::from_target("sentinel_core::dispatcher"), Component::Detect);
        assert_eq!(Component::from_target("sentinel_delivery::pool"), Component::Deliver);
        assert_eq!(Component::from_target("sentinel"), Component::Main);
        assert_eq!(Component::from_target("sentinel_core::lifecycle"), Component::Main);
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(Component::Deliver.as_str(), "DELIVER");
        assert_eq!(Component::Main.as_str(), "MAIN");
    }
}
