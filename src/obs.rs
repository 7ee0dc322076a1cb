//! Optional observability helpers for client calls and token refreshes.
//!
//! # Feature Flags
//!
//! - `tracing` (default) emits structured spans named `admin_api.call` (fields `method`,
//!   `endpoint`, `category`) and `admin_api.refresh`, plus events for breaker transitions,
//!   backoff sleeps, refresh outcomes, and credential clears.
//! - `metrics` increments `admin_api_call_total` (labels `category`, `outcome`) and
//!   `admin_api_refresh_total` (label `outcome`).

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

pub(crate) use self::tracing::log_event;

// self
use crate::{_prelude::*, error::ErrorKind};

/// Span categories emitted by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
	/// One logical pipeline call.
	Call,
	/// One refresh-endpoint round trip.
	Refresh,
}
impl SpanKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SpanKind::Call => "call",
			SpanKind::Refresh => "refresh",
		}
	}
}
impl Display for SpanKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call or refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to the pipeline.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure(ErrorKind),
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure(kind) => kind.as_str(),
		}
	}

	/// Derives the outcome label from a pipeline result.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => CallOutcome::Success,
			Err(e) => CallOutcome::Failure(e.kind()),
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
