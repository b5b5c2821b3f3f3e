// crates/stream/src/metrics.rs
//! Stream session metrics.
//!
//! Recorded through the `metrics` facade; the binary decides which recorder
//! (if any) is installed.

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::formatter::EventKind;

pub const SESSIONS_OPENED: &str = "livewatch_sessions_opened_total";
pub const SESSIONS_ACTIVE: &str = "livewatch_sessions_active";
pub const EVENTS_DELIVERED: &str = "livewatch_events_delivered_total";
pub const FORMAT_ERRORS: &str = "livewatch_format_errors_total";

/// Register descriptions for every stream metric.
pub fn describe() {
    describe_counter!(SESSIONS_OPENED, "Stream sessions that attached to a running job");
    describe_gauge!(SESSIONS_ACTIVE, "Stream sessions currently delivering events");
    describe_counter!(EVENTS_DELIVERED, "Events written to client push channels, by kind");
    describe_counter!(FORMAT_ERRORS, "Events skipped because the formatter failed, by kind");
}

pub(crate) fn session_opened() {
    counter!(SESSIONS_OPENED).increment(1);
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

pub(crate) fn session_closed() {
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

pub(crate) fn event_delivered(kind: EventKind) {
    counter!(EVENTS_DELIVERED, "kind" => kind.as_str()).increment(1);
}

pub(crate) fn format_failed(kind: EventKind) {
    counter!(FORMAT_ERRORS, "kind" => kind.as_str()).increment(1);
}
