//! Metrics sinks for request observations.

use std::sync::Arc;
use std::time::Duration;

use ::metrics::{histogram, Label};

/// Sink for named timing and histogram observations.
///
/// Tags are `key:value` strings. Delivery is fire-and-forget.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Record a duration.
    fn timing(&self, name: &str, value: Duration, tags: &[String]);

    /// Record a sample in a histogram.
    fn histogram(&self, name: &str, value: f64, tags: &[String]);
}

impl<T: MetricsRecorder + ?Sized> MetricsRecorder for Arc<T> {
    fn timing(&self, name: &str, value: Duration, tags: &[String]) {
        (**self).timing(name, value, tags)
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        (**self).histogram(name, value, tags)
    }
}

impl<T: MetricsRecorder + ?Sized> MetricsRecorder for Box<T> {
    fn timing(&self, name: &str, value: Duration, tags: &[String]) {
        (**self).timing(name, value, tags)
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        (**self).histogram(name, value, tags)
    }
}

/// Recorder used when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopMetrics;

impl MetricsRecorder for NopMetrics {
    fn timing(&self, _name: &str, _value: Duration, _tags: &[String]) {}

    fn histogram(&self, _name: &str, _value: f64, _tags: &[String]) {}
}

/// Forwards observations to the global [`metrics`] recorder.
///
/// Each `key:value` tag becomes a label; a tag without `:` becomes a label with
/// an empty value. Timings are recorded in seconds.
#[derive(Debug, Clone, Default)]
pub struct FacadeMetrics {
    prefix: Option<String>,
}

impl FacadeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every metric name with `prefix` and a `_` separator.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{name}"),
            None => name.to_owned(),
        }
    }
}

fn labels(tags: &[String]) -> Vec<Label> {
    tags.iter()
        .map(|tag| match tag.split_once(':') {
            Some((key, value)) => Label::new(key.to_owned(), value.to_owned()),
            None => Label::new(tag.clone(), String::new()),
        })
        .collect()
}

impl MetricsRecorder for FacadeMetrics {
    fn timing(&self, name: &str, value: Duration, tags: &[String]) {
        histogram!(self.name(name), labels(tags)).record(value.as_secs_f64());
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        histogram!(self.name(name), labels(tags)).record(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_split_on_first_colon() {
        let tags = vec![
            "status:ok".to_string(),
            "status_code:200".to_string(),
            "path:/a:b".to_string(),
            "bare".to_string(),
        ];
        let labels = labels(&tags);
        assert_eq!(labels[0], Label::new("status", "ok"));
        assert_eq!(labels[1], Label::new("status_code", "200"));
        assert_eq!(labels[2], Label::new("path", "/a:b"));
        assert_eq!(labels[3], Label::new("bare", ""));
    }

    #[test]
    fn test_prefixed_names() {
        assert_eq!(FacadeMetrics::new().name("request_time"), "request_time");
        assert_eq!(
            FacadeMetrics::with_prefix("api").name("request_time"),
            "api_request_time"
        );
    }

    #[test]
    fn test_recording_without_global_recorder_is_noop() {
        let tags = vec!["status:ok".to_string()];
        FacadeMetrics::new().timing("request_time", Duration::from_millis(5), &tags);
        FacadeMetrics::new().histogram("request_size", 3.0, &tags);
    }
}
