// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Process-wide logging setup.
//!
//! The subscriber is installed once by the binary; modules never touch it
//! directly. Per-module `log_level` / `log_format` configuration keys are
//! applied through [`scoped_overrides`], which swaps the reporting level and
//! output format for the duration of a bracketed lifecycle call and restores
//! the previous state when the returned guard drops.

use std::{
    fmt::Debug,
    path::PathBuf,
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields, FormattedFields,
        format::Writer,
        writer::BoxMakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogFormat {
    Default = 0,
    Json = 1,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unknown log format '{other}'")),
        }
    }
}

/// Maps the reporting level names accepted on the command line and in
/// configuration files to `tracing` filter directives.
pub fn normalize_level(level: &str) -> Result<String> {
    let directive = match level.to_ascii_lowercase().as_str() {
        "fatal" | "error" => "error",
        "warning" | "warn" => "warn",
        "status" | "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        "none" | "off" => "off",
        other => return Err(anyhow!("unknown reporting level '{other}'")),
    };
    Ok(directive.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    /// Reporting level directive, already normalized.
    pub level: String,
    pub format: Option<LogFormat>,
    pub log_file: Option<PathBuf>,
}

struct Logger {
    filter_handle: reload::Handle<EnvFilter, Registry>,
    current_level: Mutex<String>,
    format: Arc<AtomicU8>,
}

static LOGGER: OnceCell<Logger> = OnceCell::new();

/// Installs the global subscriber. Returns the writer guards that must stay
/// alive for the duration of the process.
pub fn init_logger(opts: &LoggerOptions) -> Result<Vec<WorkerGuard>> {
    let level = if opts.level.is_empty() {
        "warn".to_string()
    } else {
        opts.level.clone()
    };
    let env_filter = EnvFilter::try_new(&level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse reporting level")?;
    let (filter_layer, filter_handle) = reload::Layer::new(env_filter);

    let format = Arc::new(AtomicU8::new(
        opts.format.unwrap_or(LogFormat::Default) as u8,
    ));

    let mut guards = Vec::with_capacity(2);
    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    guards.push(stderr_guard);

    let writer = match &opts.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create log directory {parent:?}"))?;
            }
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot open log file {path:?}"))?;
            let (file_writer, file_guard) = tracing_appender::non_blocking(file);
            guards.push(file_guard);
            BoxMakeWriter::new(fmt::writer::MakeWriterExt::and(stderr_writer, file_writer))
        },
        None => BoxMakeWriter::new(stderr_writer),
    };

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .event_format(SectionFormatter {
            format: format.clone(),
        });

    let subscriber = Registry::default().with(filter_layer).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;

    LOGGER
        .set(Logger {
            filter_handle,
            current_level: Mutex::new(level),
            format,
        })
        .map_err(|_| anyhow!("logger is already initialized"))?;

    Ok(guards)
}

/// Guard restoring the previous reporting level and format when dropped.
#[derive(Default)]
pub struct LogScope {
    prev_level: Option<String>,
    prev_format: Option<LogFormat>,
}

/// Applies a scoped reporting level / format override. `None` values leave
/// the corresponding state untouched; without an installed logger this is a
/// no-op.
pub fn scoped_overrides(level: Option<&str>, format: Option<LogFormat>) -> LogScope {
    let Some(logger) = LOGGER.get() else {
        return LogScope::default();
    };
    let mut scope = LogScope::default();

    if let Some(level) = level
        && let Ok(filter) = EnvFilter::try_new(level)
        && logger.filter_handle.reload(filter).is_ok()
        && let Ok(mut current) = logger.current_level.lock()
    {
        scope.prev_level = Some(std::mem::replace(&mut *current, level.to_string()));
    }

    if let Some(format) = format {
        let prev = logger.format.swap(format as u8, Ordering::SeqCst);
        scope.prev_format = Some(if prev == LogFormat::Json as u8 {
            LogFormat::Json
        } else {
            LogFormat::Default
        });
    }

    scope
}

impl Drop for LogScope {
    fn drop(&mut self) {
        let Some(logger) = LOGGER.get() else {
            return;
        };
        if let Some(prev) = self.prev_level.take()
            && let Ok(filter) = EnvFilter::try_new(&prev)
            && logger.filter_handle.reload(filter).is_ok()
            && let Ok(mut current) = logger.current_level.lock()
        {
            *current = prev;
        }
        if let Some(prev) = self.prev_format.take() {
            logger.format.store(prev as u8, Ordering::SeqCst);
        }
    }
}

/// Event formatter producing either the human-readable default format
///
/// ```text
/// |2026-08-01 10:32:01.513| (INFO) [R:EchoModule] dispatched message
/// ```
///
/// or one JSON object per line when the JSON format is active.
struct SectionFormatter {
    format: Arc<AtomicU8>,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    level: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl<S, N> FormatEvent<S, N> for SectionFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let section = current_section::<S, N>(ctx);

        if self.format.load(Ordering::SeqCst) == LogFormat::Json as u8 {
            let mut visitor = JsonVisitor::default();
            event.record(&mut visitor);

            let entry = LogEntry {
                timestamp: Utc::now().to_rfc3339(),
                level: event.metadata().level().to_string(),
                target: event.metadata().target().to_string(),
                section,
                fields: visitor.fields,
            };
            return writeln!(
                writer,
                "{}",
                serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?
            );
        }

        write!(
            writer,
            "|{}| ({}) ",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            event.metadata().level()
        )?;
        if let Some(section) = section {
            write!(writer, "[{section}] ")?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Innermost `section` field recorded on the active span scope.
fn current_section<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    let scope = ctx.event_scope()?;
    for span in scope {
        if let Some(fields) = span.extensions().get::<FormattedFields<N>>() {
            // DefaultFields renders the span field as `section=<value>`.
            let text = fields.fields.as_str();
            if let Some(rest) = text.strip_prefix("section=") {
                let value = rest.split_whitespace().next().unwrap_or(rest);
                return Some(value.trim_matches('"').to_string());
            }
        }
    }
    None
}

#[derive(Default)]
struct JsonVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn Debug) {
        self.fields
            .insert(field.name().to_string(), json!(format!("{:?}", value)));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }
}
