//! Shared multiplicative backoff for 429 responses.

// self
use crate::{_prelude::*, config::BackoffConfig};

/// Client-wide backoff delay that grows on every 429 and resets on success.
#[derive(Debug)]
pub struct Backoff {
	config: BackoffConfig,
	current: Mutex<Duration>,
}
impl Backoff {
	/// Creates a backoff starting at the configured base delay.
	pub fn new(config: BackoffConfig) -> Self {
		Self { config, current: Mutex::new(config.base) }
	}

	/// Multiplies the delay (capped) and returns the new value to sleep for.
	///
	/// A product too large for a [`Duration`] saturates at the cap.
	pub fn escalate(&self) -> Duration {
		let mut current = self.current.lock();
		let next = Duration::try_from_secs_f64(current.as_secs_f64() * self.config.multiplier)
			.map_or(self.config.cap, |next| next.min(self.config.cap));

		*current = next;

		next
	}

	/// Resets the delay to its base value.
	pub fn reset(&self) {
		*self.current.lock() = self.config.base;
	}

	/// Returns the current delay without changing it.
	pub fn current(&self) -> Duration {
		*self.current.lock()
	}
}
impl Default for Backoff {
	fn default() -> Self {
		Self::new(BackoffConfig::default())
	}
}
