//! Failure telemetry and logging setup.
//!
//! Every failed turn is reported to a [`TelemetryCollector`] as a
//! [`TurnFailure`]. Reporting is fire-and-forget: a collector must not block
//! and cannot influence the turn.
//!
//! # Key Types
//!
//! - [`TelemetryCollector`] - the reporting seam
//! - [`TracingTelemetry`] - default collector, writes an error event
//! - [`ChannelTelemetry`] - forwards failures to an unbounded channel

use crate::error::{ErrorKind, LlmError};
use crate::llm::traits::Vendor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;
use uuid::Uuid;

pub mod logging;

pub use logging::{init_logging, LoggingConfig, LoggingGuard};

/// One failed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnFailure {
    pub turn_id: Uuid,
    /// Vendor the turn was routed to; unset when resolution itself failed
    pub vendor: Option<Vendor>,
    pub model_id: String,
    pub message: String,
    pub kind: ErrorKind,
    /// Whether the message matched the vendor's context-limit phrase
    pub context_limit: bool,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub occurred_at: DateTime<Utc>,
}

impl TurnFailure {
    /// Describe `error` for a turn that ran for `elapsed`
    pub fn from_error(
        turn_id: Uuid,
        vendor: Option<Vendor>,
        model_id: impl Into<String>,
        error: &LlmError,
        elapsed: Duration,
    ) -> Self {
        Self {
            turn_id,
            vendor: error.vendor().or(vendor),
            model_id: model_id.into(),
            message: error.to_string(),
            kind: error.kind(),
            context_limit: error.is_context_limit(),
            status: error.status(),
            elapsed_ms: elapsed.as_millis() as u64,
            occurred_at: Utc::now(),
        }
    }
}

impl fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vendor = self.vendor.map(|v| v.as_str()).unwrap_or("unresolved");
        write!(
            f,
            "turn {} ({}/{}) failed after {}ms: {}",
            self.turn_id, vendor, self.model_id, self.elapsed_ms, self.message
        )
    }
}

/// Receiver of turn failures
pub trait TelemetryCollector: Send + Sync + fmt::Debug {
    fn record_failure(&self, failure: TurnFailure);
}

/// Writes each failure as a structured `error!` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetryCollector for TracingTelemetry {
    fn record_failure(&self, failure: TurnFailure) {
        error!(
            turn_id = %failure.turn_id,
            vendor = failure.vendor.map(|v| v.as_str()).unwrap_or("unresolved"),
            model = %failure.model_id,
            kind = ?failure.kind,
            status = ?failure.status,
            context_limit = failure.context_limit,
            elapsed_ms = failure.elapsed_ms,
            "❌ {}",
            failure.message
        );
    }
}

/// Forwards failures to an unbounded channel.
///
/// Failures are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelTelemetry {
    tx: mpsc::UnboundedSender<TurnFailure>,
}

impl ChannelTelemetry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TurnFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetryCollector for ChannelTelemetry {
    fn record_failure(&self, failure: TurnFailure) {
        let _ = self.tx.send(failure);
    }
}
