use std::fmt::{self as stdfmt, Write as _};
use std::path::Path;

use anyhow::Result;
use slide_config::{LogFormat, LoggingConfig};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Field formatter for the file layer, kept distinct from the stderr layer's
/// so span fields are cached separately.
#[derive(Default)]
pub struct FileFields(DefaultFields);

impl<'writer> fmt::FormatFields<'writer> for FileFields {
    fn format_fields<R: tracing_subscriber::field::RecordFields>(
        &self,
        writer: fmt::format::Writer<'writer>,
        fields: R,
    ) -> stdfmt::Result {
        self.0.format_fields(writer, fields)
    }
}

// ---------------------------------------------------------------------------
// DomainFormat
// ---------------------------------------------------------------------------

/// Plain-text formatter printing the `domain` field as a `[domain]` tag:
///
/// ```text
/// 2026-10-17T09:12:44Z  INFO [win] window published count=5 end=1500
/// ```
pub struct DomainFormat {
    timer: SystemTime,
}

impl DomainFormat {
    pub fn new() -> Self {
        Self { timer: SystemTime }
    }
}

impl Default for DomainFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> FormatEvent<S, N> for DomainFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> fmt::FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let ansi = writer.has_ansi_escapes();

        if self.timer.format_time(&mut writer).is_err() {
            write!(writer, "<unknown time>")?;
        }

        let level = *event.metadata().level();
        if ansi {
            let color = match level {
                Level::ERROR => "31",
                Level::WARN => "33",
                Level::INFO => "32",
                Level::DEBUG => "34",
                Level::TRACE => "35",
            };
            write!(writer, " \x1b[{color}m{level:>5}\x1b[0m ")?;
        } else {
            write!(writer, " {level:>5} ")?;
        }

        let mut fields = DomainFields::default();
        event.record(&mut fields);

        match &fields.domain {
            Some(domain) if ansi => write!(writer, "\x1b[1;36m[{domain}]\x1b[0m ")?,
            Some(domain) => write!(writer, "[{domain}] ")?,
            // `log` records from slide-core carry their module path instead
            None => write!(writer, "{}: ", event.metadata().target())?,
        }

        write!(writer, "{}", fields.message)?;
        if !fields.rest.is_empty() {
            write!(writer, " {}", fields.rest)?;
        }
        writeln!(writer)
    }
}

#[derive(Default)]
struct DomainFields {
    domain: Option<String>,
    message: String,
    rest: String,
}

impl DomainFields {
    fn push(&mut self, name: &str, value: stdfmt::Arguments<'_>) {
        // metadata copied in by the `log` bridge
        if name.starts_with("log.") {
            return;
        }
        if !self.rest.is_empty() {
            self.rest.push(' ');
        }
        write!(&mut self.rest, "{name}={value}").ok();
    }
}

impl Visit for DomainFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "domain" => self.domain = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            name => self.push(name, format_args!("{value:?}")),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        match field.name() {
            "domain" => {
                self.domain = Some(format!("{value:?}").trim_matches('"').to_string());
            }
            "message" => {
                write!(&mut self.message, "{value:?}").ok();
            }
            name => self.push(name, format_args!("{value:?}")),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field.name(), format_args!("{value}"));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field.name(), format_args!("{value}"));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field.name(), format_args!("{value}"));
    }
}

// ---------------------------------------------------------------------------
// init_tracing
// ---------------------------------------------------------------------------

/// Install the global subscriber described by `[logging]`.
///
/// `RUST_LOG`, when set, replaces the configured directives. A relative log
/// file resolves against `base_dir`. The returned guard flushes the file
/// writer on drop and must live as long as the process logs.
pub fn init_tracing(config: &LoggingConfig, base_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directives = config.directives();
        EnvFilter::try_new(&directives)
            .map_err(|e| anyhow::anyhow!("invalid log filter '{directives}': {e}"))?
    };
    let json = config.format == LogFormat::Json;

    let stderr_layer: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .event_format(DomainFormat::new())
            .with_writer(std::io::stderr)
            .boxed()
    };

    let Some(file_path) = &config.file else {
        tracing_subscriber::registry()
            .with(stderr_layer.with_filter(filter))
            .try_init()?;
        return Ok(None);
    };

    let resolved = if file_path.is_relative() {
        base_dir.join(file_path)
    } else {
        file_path.clone()
    };
    let dir = resolved
        .parent()
        .ok_or_else(|| anyhow::anyhow!("log file path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;
    let file_name = resolved
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path has no file name"))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let file_layer: BoxedLayer = if json {
        fmt::layer()
            .json()
            .fmt_fields(FileFields::default())
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .event_format(DomainFormat::new())
            .fmt_fields(FileFields::default())
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(stderr_layer.and_then(file_layer).with_filter(filter))
        .try_init()?;
    Ok(Some(guard))
}
