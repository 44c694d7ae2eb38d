//! Log output for GitHub Actions
//!
//! Warnings, errors and debug events become workflow commands
//! (`::warning deploy=web::message`) so they show up as annotations. Info
//! events become status lines prefixed with the time elapsed since start.
//!
//! Fields of enclosing spans become params too. They are captured by
//! [`SpanFieldsLayer`], which must be installed next to the formatter.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Render `::command k=v,...::value` with params sorted by key
pub fn format_workflow_command(
    command: &str,
    params: &BTreeMap<String, String>,
    value: &str,
) -> String {
    if params.is_empty() {
        return format!("::{}::{}\n", command, escape_data(value));
    }

    let params = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, escape_property(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("::{} {}::{}\n", command, params, escape_data(value))
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

/// `HH:MM:SS] message`
pub fn format_status_line(elapsed: Duration, message: &str) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}] {}\n",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        message
    )
}

/// Event formatter producing workflow commands and status lines
pub struct WorkflowCommandFormat {
    started: Instant,
}

impl WorkflowCommandFormat {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for WorkflowCommandFormat
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
        // Outer spans first so inner spans and the event itself win
        let mut fields = FieldCollector::default();
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                if let Some(span_fields) = span.extensions().get::<SpanFields>() {
                    fields.params.extend(span_fields.0.clone());
                }
            }
        }
        event.record(&mut fields);

        let line = match *event.metadata().level() {
            Level::ERROR => format_workflow_command("error", &fields.params, &fields.message),
            Level::WARN => format_workflow_command("warning", &fields.params, &fields.message),
            Level::INFO => {
                let message = match fields.params.get("deploy") {
                    Some(deploy) => format!("{}: {}", deploy, fields.message),
                    None => fields.message,
                };
                format_status_line(self.started.elapsed(), &message)
            }
            _ => format_workflow_command("debug", &fields.params, &fields.message),
        };

        writer.write_str(&line)
    }
}

/// Span fields as recorded so far
struct SpanFields(BTreeMap<String, String>);

/// Keeps the fields of every span so [`WorkflowCommandFormat`] can attach them to events
pub struct SpanFieldsLayer;

impl<S> Layer<S> for SpanFieldsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut fields = FieldCollector::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(SpanFields(fields.params));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut fields = FieldCollector::default();
        values.record(&mut fields);
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(existing) => existing.0.extend(fields.params),
            None => extensions.insert(SpanFields(fields.params)),
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    params: BTreeMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.params.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.params.insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

/// Everything logged by `f`, rendered by [`WorkflowCommandFormat`]
#[cfg(test)]
pub(crate) fn capture_workflow_commands(f: impl FnOnce()) -> String {
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::registry().with(SpanFieldsLayer).with(
        tracing_subscriber::fmt::layer()
            .event_format(WorkflowCommandFormat::new())
            .with_writer(move || writer.clone()),
    );
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
