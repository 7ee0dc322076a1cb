// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing token refresh traffic.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	calls: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	coalesced: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh requests actually sent to the server.
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh calls that produced new tokens.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh calls that failed (rejected or unavailable).
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns how many callers joined an in-flight refresh instead of starting one.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	pub(crate) fn record_call(&self) {
		self.calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}
}
