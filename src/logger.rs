//! Logging sinks for access records.
//!
//! This module provides the [`AccessLogger`] port along with a few ready-made
//! implementations: [`TracingLogger`] forwards records as `tracing` events,
//! [`JsonLogger`] writes JSON lines to any [`io::Write`], and [`NopLogger`]
//! drops everything.

use std::io;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{error, info};

use crate::AccessRecord;

/// Sink for access records.
///
/// Delivery is fire-and-forget: implementations report their own failures and
/// never hand them back to the middleware.
pub trait AccessLogger: Send + Sync + 'static {
    /// Emit a single access record.
    fn log(&self, record: &AccessRecord);
}

impl<T: AccessLogger + ?Sized> AccessLogger for Arc<T> {
    fn log(&self, record: &AccessRecord) {
        (**self).log(record)
    }
}

impl<T: AccessLogger + ?Sized> AccessLogger for Box<T> {
    fn log(&self, record: &AccessRecord) {
        (**self).log(record)
    }
}

/// Logger used when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl AccessLogger for NopLogger {
    fn log(&self, _record: &AccessRecord) {}
}

/// Emits each record as an `info` event on the `access_log` target.
///
/// Every record field becomes a structured event field and the summary
/// becomes the event message.
///
/// # Examples
///
/// ```rust,no_run
/// use accesslog::{AccessLogConfig, AccessLogLayer, NopMetrics, TracingLogger};
///
/// # #[tokio::main]
/// # async fn main() {
/// tracing_subscriber::fmt().init();
/// let layer = AccessLogLayer::new(AccessLogConfig::default(), TracingLogger, NopMetrics);
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl AccessLogger for TracingLogger {
    fn log(&self, record: &AccessRecord) {
        info!(
            target: "access_log",
            method = %record.method,
            uri = %record.uri,
            "type" = %record.kind,
            status = %record.status,
            status_code = record.status_code,
            duration = record.duration,
            size = record.size,
            "{}",
            record.message
        );
    }
}

/// Writes one JSON object per line, with `level` and `time` fields added.
///
/// Write failures are reported through `tracing` and otherwise dropped.
#[derive(Debug)]
pub struct JsonLogger<W> {
    out: Mutex<W>,
}

impl<W: io::Write + Send + 'static> JsonLogger<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_line(&self, record: &AccessRecord) -> io::Result<()> {
        let mut fields = record.fields();
        fields.insert("level".into(), Value::from("info"));
        fields.insert("time".into(), Value::from(chrono::Utc::now().to_rfc3339()));

        let mut line = serde_json::to_vec(&fields)?;
        line.push(b'\n');

        let mut out = self
            .out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        out.write_all(&line)?;
        out.flush()
    }
}

impl<W: io::Write + Send + 'static> AccessLogger for JsonLogger<W> {
    fn log(&self, record: &AccessRecord) {
        if let Err(e) = self.write_line(record) {
            error!(error = %e, uri = %record.uri, "Failed to write access record");
        }
    }
}
