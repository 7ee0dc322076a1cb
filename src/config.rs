//! Client configuration: base URL, deadlines, and the resilience knobs.
//!
//! Every constant the pipeline relies on is overridable through [`ClientConfigBuilder`];
//! [`ClientConfigBuilder::build`] validates the combination before a client can be created.

// self
use crate::{_prelude::*, error::ConfigError, rate_limit::RateCategory};

/// Circuit breaker thresholds and timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerConfig {
	/// Consecutive server/network failures that open the breaker.
	pub max_consecutive_failures: u32,
	/// Time the breaker stays open before admitting calls again.
	pub open_timeout: Duration,
}
impl Default for BreakerConfig {
	fn default() -> Self {
		Self { max_consecutive_failures: 5, open_timeout: Duration::from_millis(30_000) }
	}
}

/// Minimum spacing between admitted requests, per category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
	/// Spacing for `/auth/` endpoints.
	pub auth: Duration,
	/// Spacing for `/dashboard` endpoints.
	pub dashboard: Duration,
	/// Spacing for everything else.
	pub general: Duration,
	/// Number of admission timestamps retained per category.
	pub history: usize,
}
impl RateLimitConfig {
	/// Spacing that applies to `category`.
	pub fn spacing(&self, category: RateCategory) -> Duration {
		match category {
			RateCategory::Auth => self.auth,
			RateCategory::Dashboard => self.dashboard,
			RateCategory::General => self.general,
		}
	}

	/// Configuration with zero spacing in every category.
	pub fn unthrottled() -> Self {
		Self { auth: Duration::ZERO, dashboard: Duration::ZERO, general: Duration::ZERO, ..Self::default() }
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			auth: Duration::from_millis(1_000),
			dashboard: Duration::from_millis(500),
			general: Duration::from_millis(100),
			history: 32,
		}
	}
}

/// Multiplicative backoff applied to 429 retries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffConfig {
	/// Delay the backoff resets to after a success.
	pub base: Duration,
	/// Factor applied on every 429.
	pub multiplier: f64,
	/// Upper bound for the delay.
	pub cap: Duration,
}
impl Default for BackoffConfig {
	fn default() -> Self {
		Self { base: Duration::from_millis(100), multiplier: 1.5, cap: Duration::from_millis(10_000) }
	}
}

/// Validated client configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
	/// API root; endpoint paths are appended to it verbatim.
	pub base_url: Url,
	/// Deadline applied to every dispatch, including refresh calls.
	pub request_timeout: Duration,
	/// Circuit breaker settings.
	pub breaker: BreakerConfig,
	/// Rate limiter settings.
	pub rate_limit: RateLimitConfig,
	/// 429 backoff settings.
	pub backoff: BackoffConfig,
	/// Path of the refresh endpoint.
	pub refresh_path: String,
	/// Path of the login endpoint.
	pub login_path: String,
	/// Path of the logout endpoint.
	pub logout_path: String,
}
impl ClientConfig {
	/// Default dispatch deadline.
	pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: impl AsRef<str>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Shorthand for `ClientConfig::builder(base_url).build()`.
	pub fn new(base_url: impl AsRef<str>) -> Result<Self, ConfigError> {
		Self::builder(base_url).build()
	}

	/// Joins an endpoint path onto the base URL.
	pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, ConfigError> {
		let base = self.base_url.as_str().trim_end_matches('/');
		let joined = if endpoint.starts_with('/') {
			format!("{base}{endpoint}")
		} else {
			format!("{base}/{endpoint}")
		};

		Url::parse(&joined)
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: endpoint.to_owned(), source })
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}
		if self.breaker.max_consecutive_failures == 0 {
			return Err(ConfigError::InvalidThreshold);
		}
		if !self.backoff.multiplier.is_finite() || self.backoff.multiplier < 1.0 {
			return Err(ConfigError::InvalidBackoff { reason: "multiplier must be at least 1.0" });
		}
		if self.backoff.base > self.backoff.cap {
			return Err(ConfigError::InvalidBackoff { reason: "base must not exceed cap" });
		}

		Ok(())
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// Raw base URL, parsed during [`build`](Self::build).
	pub base_url: String,
	/// Dispatch deadline.
	pub request_timeout: Duration,
	/// Circuit breaker settings.
	pub breaker: BreakerConfig,
	/// Rate limiter settings.
	pub rate_limit: RateLimitConfig,
	/// 429 backoff settings.
	pub backoff: BackoffConfig,
	/// Refresh endpoint path.
	pub refresh_path: String,
	/// Login endpoint path.
	pub login_path: String,
	/// Logout endpoint path.
	pub logout_path: String,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with defaults.
	pub fn new(base_url: impl AsRef<str>) -> Self {
		Self {
			base_url: base_url.as_ref().to_owned(),
			request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
			breaker: BreakerConfig::default(),
			rate_limit: RateLimitConfig::default(),
			backoff: BackoffConfig::default(),
			refresh_path: "/auth/refresh-token".into(),
			login_path: "/auth/login".into(),
			logout_path: "/auth/logout".into(),
		}
	}

	/// Overrides the dispatch deadline.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the circuit breaker settings.
	pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
		self.breaker = breaker;

		self
	}

	/// Overrides the rate limiter settings.
	pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.rate_limit = rate_limit;

		self
	}

	/// Overrides the 429 backoff settings.
	pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
		self.backoff = backoff;

		self
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the logout endpoint path.
	pub fn logout_path(mut self, path: impl Into<String>) -> Self {
		self.logout_path = path.into();

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let base_url = Url::parse(&self.base_url)
			.map_err(|source| ConfigError::InvalidBaseUrl { source })?;
		let config = ClientConfig {
			base_url,
			request_timeout: self.request_timeout,
			breaker: self.breaker,
			rate_limit: self.rate_limit,
			backoff: self.backoff,
			refresh_path: self.refresh_path,
			login_path: self.login_path,
			logout_path: self.logout_path,
		};

		config.validate()?;

		Ok(config)
	}
}
