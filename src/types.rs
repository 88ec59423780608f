//! Data types for recorded accesses.
//!
//! This module holds the outcome classification and the structured record
//! handed to the [`AccessLogger`](crate::AccessLogger) for each request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Outcome of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The handler answered with a 2xx status
    Ok,
    /// The handler answered with any other status
    Error,
    /// The request deadline passed
    Timeout,
    /// The request was cancelled
    Canceled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Error => "error",
            Outcome::Timeout => "timeout",
            Outcome::Canceled => "canceled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric tags for a request: `status:<outcome>` then `status_code:<code>`.
pub fn tags(outcome: Outcome, status_code: u16) -> Vec<String> {
    vec![
        format!("status:{outcome}"),
        format!("status_code:{status_code}"),
    ]
}

/// Structured access record, one per request.
///
/// `uri` always holds the full request target; only `message` is shortened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request target including path and query
    pub uri: String,
    /// Always `"access"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Outcome classification
    pub status: Outcome,
    /// Final HTTP status code
    pub status_code: u16,
    /// Elapsed time in seconds
    pub duration: f64,
    /// Response body size in bytes
    pub size: u64,
    /// `"<METHOD> <uri> <status_code>"` with the uri middle-truncated
    pub message: String,
}

impl AccessRecord {
    pub const KIND: &'static str = "access";

    /// The record as a field-name to value mapping.
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("method".into(), self.method.clone().into());
        fields.insert("uri".into(), self.uri.clone().into());
        fields.insert("type".into(), self.kind.clone().into());
        fields.insert("status".into(), self.status.as_str().into());
        fields.insert("status_code".into(), self.status_code.into());
        fields.insert("duration".into(), self.duration.into());
        fields.insert("size".into(), self.size.into());
        fields.insert("message".into(), self.message.clone().into());
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> AccessRecord {
        AccessRecord {
            method: "GET".to_string(),
            uri: "/path?q=1".to_string(),
            kind: AccessRecord::KIND.to_string(),
            status: Outcome::Ok,
            status_code: 202,
            duration: 0.25,
            size: 3,
            message: "GET /path?q=1 202".to_string(),
        }
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(Outcome::Ok.to_string(), "ok");
        assert_eq!(Outcome::Error.to_string(), "error");
        assert_eq!(Outcome::Timeout.to_string(), "timeout");
        assert_eq!(Outcome::Canceled.to_string(), "canceled");
    }

    #[test]
    fn test_tags_order() {
        assert_eq!(
            tags(Outcome::Timeout, 504),
            vec!["status:timeout".to_string(), "status_code:504".to_string()]
        );
    }

    #[test]
    fn test_fields_types() {
        let fields = sample_record().fields();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields["type"], "access");
        assert_eq!(fields["status"], "ok");
        assert_eq!(fields["status_code"], 202);
        assert_eq!(fields["size"], 3);
        assert_eq!(fields["duration"], 0.25);
        assert_eq!(fields["uri"], "/path?q=1");
    }

    #[test]
    fn test_serializes_like_fields() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, Value::Object(record.fields()));
    }
}
