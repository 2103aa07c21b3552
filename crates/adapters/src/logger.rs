//! Tracing-backed logger adapter.

use corpus_sync_ports::{LogEvent, LogFields, LogLevel, LoggerPort};

/// Logger emitting structured events through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Create a tracing logger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let fields = event.fields.as_ref().map(render_fields).unwrap_or_default();
        match event.level {
            LogLevel::Debug => {
                tracing::debug!(event = %event.event, fields = %fields, "{}", event.message);
            },
            LogLevel::Info => {
                tracing::info!(event = %event.event, fields = %fields, "{}", event.message);
            },
            LogLevel::Warn => {
                tracing::warn!(event = %event.event, fields = %fields, "{}", event.message);
            },
            LogLevel::Error => {
                tracing::error!(event = %event.event, fields = %fields, "{}", event.message);
            },
        }
    }
}

fn render_fields(fields: &LogFields) -> String {
    serde_json::to_string(fields).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn fields_render_as_json() {
        let mut fields = LogFields::new();
        fields.insert("added".into(), Value::from(3));
        fields.insert("removed".into(), Value::from(1));
        assert_eq!(render_fields(&fields), r#"{"added":3,"removed":1}"#);
    }

    #[test]
    fn logging_does_not_panic_without_subscriber() {
        let logger = TracingLogger::new();
        logger.info("sync.run.completed", "run completed", None);
        logger.error("sync.run.failed", "run failed", Some(LogFields::new()));
    }
}
