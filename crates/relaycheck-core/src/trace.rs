//! Diagnostic trace of a validation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    /// A step is starting.
    Info,
    /// A step completed.
    Success,
    /// A step degraded but the run continues.
    Warning,
    /// The run stopped here.
    Error,
}

/// One timestamped entry in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Severity.
    pub kind: TraceKind,
    /// Human-readable text.
    pub message: String,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
}

/// Append-only event log for a single run.
#[derive(Debug, Default)]
pub(crate) struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub(crate) fn push(&mut self, kind: TraceKind, message: impl Into<String>) {
        self.events.push(TraceEvent {
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub(crate) fn info(&mut self, message: impl Into<String>) {
        self.push(TraceKind::Info, message);
    }

    pub(crate) fn success(&mut self, message: impl Into<String>) {
        self.push(TraceKind::Success, message);
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.push(TraceKind::Warning, message);
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.push(TraceKind::Error, message);
    }

    pub(crate) fn finish(self, success: bool, summary: impl Into<String>) -> TestResult {
        TestResult {
            success,
            summary_message: summary.into(),
            trace: self.events,
        }
    }
}

/// Outcome of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// True if every requested step passed.
    pub success: bool,
    /// One-line verdict.
    pub summary_message: String,
    /// Events in the order they happened.
    pub trace: Vec<TraceEvent>,
}

impl TestResult {
    /// Returns the kinds of all events, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<TraceKind> {
        self.trace.iter().map(|event| event.kind).collect()
    }

    /// Returns the final event.
    #[must_use]
    pub fn last(&self) -> Option<&TraceEvent> {
        self.trace.last()
    }

    /// Returns the first event whose message contains `needle`.
    #[must_use]
    pub fn find(&self, needle: &str) -> Option<&TraceEvent> {
        self.trace.iter().find(|event| event.message.contains(needle))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn events_keep_order_and_time() {
        let mut trace = Trace::default();
        trace.info("starting");
        trace.success("done");
        let result = trace.finish(true, "ok");

        assert_eq!(result.kinds(), vec![TraceKind::Info, TraceKind::Success]);
        assert!(result.trace[0].at <= result.trace[1].at);
        assert_eq!(result.last().unwrap().message, "done");
        assert!(result.find("start").is_some());
    }

    #[test]
    fn serializes_with_wire_names() {
        let mut trace = Trace::default();
        trace.warning("no auth");
        let json = serde_json::to_value(trace.finish(false, "failed")).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["summaryMessage"], "failed");
        assert_eq!(json["trace"][0]["kind"], "warning");
        assert!(json["trace"][0]["at"].is_string());
    }
}
