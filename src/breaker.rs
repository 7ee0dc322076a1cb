//! Circuit breaker that short-circuits calls while the backend is failing.
//!
//! Transitions are driven only by completed call outcomes and elapsed time. Once the open
//! timeout elapses the breaker moves to [`CircuitStatus::HalfOpen`] with the failure count
//! reset and admits calls again; a single server/network failure in that state reopens it
//! immediately instead of waiting for a fresh streak.

// self
use crate::{_prelude::*, config::BreakerConfig, obs::log_event};

/// Breaker status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
	/// Normal operation.
	Closed,
	/// Rejecting every call until the timeout elapses.
	Open,
	/// Timeout elapsed; calls are admitted and one failure reopens.
	HalfOpen,
}

/// Snapshot of the breaker's internal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CircuitState {
	/// Current status.
	pub status: CircuitStatus,
	/// Server/network failures since the last success or reset.
	pub consecutive_failures: u32,
	/// Instant the breaker last opened, while open.
	pub opened_at: Option<Instant>,
}
impl Default for CircuitState {
	fn default() -> Self {
		Self { status: CircuitStatus::Closed, consecutive_failures: 0, opened_at: None }
	}
}

/// Thread-safe circuit breaker shared by every pipeline call.
#[derive(Debug)]
pub struct CircuitBreaker {
	config: BreakerConfig,
	inner: Mutex<CircuitState>,
}
impl CircuitBreaker {
	/// Creates a closed breaker.
	pub fn new(config: BreakerConfig) -> Self {
		Self { config, inner: Mutex::new(CircuitState::default()) }
	}

	/// Returns `true` when a call may proceed, moving an expired open breaker to half-open.
	pub fn allow(&self) -> bool {
		let mut inner = self.inner.lock();

		match inner.status {
			CircuitStatus::Closed | CircuitStatus::HalfOpen => true,
			CircuitStatus::Open => {
				let expired = inner
					.opened_at
					.is_none_or(|opened_at| opened_at.elapsed() >= self.config.open_timeout);

				if expired {
					inner.status = CircuitStatus::HalfOpen;
					inner.consecutive_failures = 0;
					inner.opened_at = None;

					log_event!(info, "circuit breaker timeout elapsed; admitting trial calls");
				}

				expired
			},
		}
	}

	/// Records a completed successful call.
	///
	/// A success that lands while the breaker is open (a call dispatched before it opened)
	/// only clears the streak; the breaker stays open until its timeout elapses.
	pub fn record_success(&self) {
		let mut inner = self.inner.lock();

		inner.consecutive_failures = 0;

		match inner.status {
			CircuitStatus::Open => {},
			CircuitStatus::HalfOpen => {
				inner.status = CircuitStatus::Closed;
				inner.opened_at = None;

				log_event!(info, "circuit breaker closed after a successful trial call");
			},
			CircuitStatus::Closed => inner.opened_at = None,
		}
	}

	/// Records a completed failed call; only server/network failures count.
	pub fn record_failure(&self, is_server_or_network_error: bool) {
		if !is_server_or_network_error {
			return;
		}

		let mut inner = self.inner.lock();

		inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

		let reopen = inner.status == CircuitStatus::HalfOpen;

		if inner.status != CircuitStatus::Open
			&& (reopen || inner.consecutive_failures >= self.config.max_consecutive_failures)
		{
			inner.status = CircuitStatus::Open;
			inner.opened_at = Some(Instant::now());

			log_event!(
				warn,
				consecutive_failures = inner.consecutive_failures,
				reopen,
				"circuit breaker opened"
			);
		}
	}

	/// Administrative override forcing the breaker closed.
	pub fn reset(&self) {
		*self.inner.lock() = CircuitState::default();
	}

	/// Returns a snapshot of the current state.
	pub fn state(&self) -> CircuitState {
		*self.inner.lock()
	}

	/// Returns the current status.
	pub fn status(&self) -> CircuitStatus {
		self.inner.lock().status
	}
}
impl Default for CircuitBreaker {
	fn default() -> Self {
		Self::new(BreakerConfig::default())
	}
}
