//! Caller-facing request description and per-call retry bookkeeping.

// std
use std::collections::BTreeMap;
// self
use crate::{_prelude::*, error::ConfigError, http::Method, rate_limit::RateCategory};

/// Number of refresh-and-retry rounds a single call may go through.
pub const MAX_AUTH_RETRIES: u32 = 1;
/// Number of 429 retries a single call may go through.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 1;

/// Why a call is being re-dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryReason {
	/// The server answered 401 and the token was refreshed.
	Unauthorized,
	/// The server answered 429 and the backoff delay elapsed.
	RateLimited,
}

/// One logical API call as seen by the pipeline.
///
/// `requires_auth` is derived from the endpoint: anything outside `/auth/` and `/health`
/// is protected. Retry counters are owned by the pipeline and only ever grow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// Path appended to the configured base URL (query string included).
	pub endpoint: String,
	/// HTTP method.
	pub method: Method,
	/// Extra headers; names are stored lowercase.
	pub headers: BTreeMap<String, String>,
	/// Optional JSON body bytes.
	pub body: Option<Vec<u8>>,
	/// Whether a bearer token must be attached.
	pub requires_auth: bool,
	attempt: u32,
	auth_retries: u32,
	rate_limit_retries: u32,
}
impl ApiRequest {
	/// Creates a request for `endpoint`.
	pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
		let endpoint = endpoint.into();
		let requires_auth = Self::is_protected(&endpoint);

		Self {
			endpoint,
			method,
			headers: BTreeMap::new(),
			body: None,
			requires_auth,
			attempt: 0,
			auth_retries: 0,
			rate_limit_retries: 0,
		}
	}

	/// `GET` request.
	pub fn get(endpoint: impl Into<String>) -> Self {
		Self::new(Method::Get, endpoint)
	}

	/// `POST` request.
	pub fn post(endpoint: impl Into<String>) -> Self {
		Self::new(Method::Post, endpoint)
	}

	/// `PUT` request.
	pub fn put(endpoint: impl Into<String>) -> Self {
		Self::new(Method::Put, endpoint)
	}

	/// `PATCH` request.
	pub fn patch(endpoint: impl Into<String>) -> Self {
		Self::new(Method::Patch, endpoint)
	}

	/// `DELETE` request.
	pub fn delete(endpoint: impl Into<String>) -> Self {
		Self::new(Method::Delete, endpoint)
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);
		self.headers.insert("content-type".into(), "application/json".into());

		Ok(self)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Overrides whether a bearer token is required.
	pub fn with_auth(mut self, requires_auth: bool) -> Self {
		self.requires_auth = requires_auth;

		self
	}

	/// Rate category the endpoint belongs to.
	pub fn category(&self) -> RateCategory {
		RateCategory::for_endpoint(&self.endpoint)
	}

	/// Number of dispatches started so far, retries included.
	pub fn attempt(&self) -> u32 {
		self.attempt
	}

	/// Returns `true` for endpoints that need a bearer token.
	pub fn is_protected(endpoint: &str) -> bool {
		!endpoint.contains("/auth/") && !endpoint.contains("/health")
	}

	pub(crate) fn record_dispatch(&mut self) {
		self.attempt += 1;
	}

	/// Consumes one retry for `reason`; returns `false` once the budget is spent.
	pub(crate) fn begin_retry(&mut self, reason: RetryReason) -> bool {
		let (used, max) = match reason {
			RetryReason::Unauthorized => (&mut self.auth_retries, MAX_AUTH_RETRIES),
			RetryReason::RateLimited => (&mut self.rate_limit_retries, MAX_RATE_LIMIT_RETRIES),
		};

		if *used >= max {
			return false;
		}

		*used += 1;

		true
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn protection_follows_endpoint() {
		assert!(ApiRequest::get("/users").requires_auth);
		assert!(ApiRequest::get("/dashboard/stats").requires_auth);
		assert!(!ApiRequest::post("/auth/login").requires_auth);
		assert!(!ApiRequest::get("/health").requires_auth);
		assert!(ApiRequest::get("/auth/login").with_auth(true).requires_auth);
		assert_eq!(ApiRequest::post("/auth/login").category(), RateCategory::Auth);
	}

	#[test]
	fn retry_budgets_are_independent_and_bounded() {
		let mut request = ApiRequest::get("/users");

		assert!(request.begin_retry(RetryReason::Unauthorized));
		assert!(!request.begin_retry(RetryReason::Unauthorized));
		assert!(request.begin_retry(RetryReason::RateLimited));
		assert!(!request.begin_retry(RetryReason::RateLimited));
	}

	#[test]
	fn json_sets_body_and_content_type() {
		let request = ApiRequest::put("/users/7")
			.json(&serde_json::json!({ "role": "admin" }))
			.expect("JSON body should serialize.")
			.header("X-Request-Id", "req-1");

		assert_eq!(request.body.as_deref(), Some(br#"{"role":"admin"}"#.as_slice()));
		assert_eq!(request.headers.get("content-type").map(String::as_str), Some("application/json"));
		assert_eq!(request.headers.get("x-request-id").map(String::as_str), Some("req-1"));
	}
}
