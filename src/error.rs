//! Client-level error taxonomy shared by the pipeline, token manager, and stores.
//!
//! Every failure a dashboard caller can observe is folded into [`Error`] at the pipeline
//! boundary. Callers branch on [`Error::kind`] and use [`Error::requires_login`] as the
//! redirect-to-login signal.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Circuit breaker is open; no network call was attempted.
	#[error("Service is temporarily unavailable; the circuit breaker is open.")]
	ServiceUnavailable,
	/// Protected endpoint was called without a usable access token.
	#[error("Authentication is required to call {endpoint}.")]
	AuthenticationRequired {
		/// Endpoint that required authentication.
		endpoint: String,
	},
	/// Session expired: a 401 could not be recovered through a token refresh.
	#[error("Authentication expired: {reason}.")]
	AuthenticationExpired {
		/// Human-readable reason string.
		reason: String,
	},
	/// Server kept answering 429 after the local retry budget was spent.
	#[error("Rate limited by the server.")]
	RateLimited {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Server answered with a 5xx status.
	#[error("Server error {status}: {message}.")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Server-provided or synthesized message.
		message: String,
	},
	/// Server rejected the request with a 4xx status (or an unsuccessful envelope).
	#[error("Request rejected with status {status}: {message}.")]
	ClientError {
		/// HTTP status code.
		status: u16,
		/// Server-provided error code, when available.
		code: Option<String>,
		/// Server-provided or synthesized message.
		message: String,
	},
	/// Transport-level failure (DNS, connection reset, timeout).
	#[error(transparent)]
	Network(#[from] TransportError),

	/// Successful response body could not be decoded into the expected envelope.
	#[error("Response from {endpoint} could not be decoded.")]
	Decode {
		/// Endpoint whose body failed to decode.
		endpoint: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}
impl Error {
	/// Returns the flat discriminant callers branch on.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::ServiceUnavailable => ErrorKind::ServiceUnavailable,
			Self::AuthenticationRequired { .. } => ErrorKind::AuthenticationRequired,
			Self::AuthenticationExpired { .. } => ErrorKind::AuthenticationExpired,
			Self::RateLimited { .. } => ErrorKind::RateLimited,
			Self::ServerError { .. } => ErrorKind::ServerError,
			Self::ClientError { .. } => ErrorKind::ClientError,
			Self::Network(_) => ErrorKind::NetworkError,
			Self::Decode { .. } => ErrorKind::InvalidResponse,
			Self::Config(_) => ErrorKind::Config,
			Self::Storage(_) => ErrorKind::Storage,
		}
	}

	/// Returns `true` when the caller should redirect the user to the login screen.
	pub fn requires_login(&self) -> bool {
		matches!(self, Self::AuthenticationRequired { .. } | Self::AuthenticationExpired { .. })
	}

	/// HTTP status attached to the error, if the server produced one.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::ServerError { status, .. } | Self::ClientError { status, .. } => Some(*status),
			Self::RateLimited { .. } => Some(429),
			Self::AuthenticationExpired { .. } => Some(401),
			Self::ServiceUnavailable => Some(503),
			_ => None,
		}
	}
}

/// Flat error classification mirroring [`Error`] variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// See [`Error::ServiceUnavailable`].
	ServiceUnavailable,
	/// See [`Error::AuthenticationRequired`].
	AuthenticationRequired,
	/// See [`Error::AuthenticationExpired`].
	AuthenticationExpired,
	/// See [`Error::RateLimited`].
	RateLimited,
	/// See [`Error::ServerError`].
	ServerError,
	/// See [`Error::ClientError`].
	ClientError,
	/// See [`Error::Network`].
	NetworkError,
	/// See [`Error::Decode`].
	InvalidResponse,
	/// See [`Error::Config`].
	Config,
	/// See [`Error::Storage`].
	Storage,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ServiceUnavailable => "service_unavailable",
			Self::AuthenticationRequired => "authentication_required",
			Self::AuthenticationExpired => "authentication_expired",
			Self::RateLimited => "rate_limited",
			Self::ServerError => "server_error",
			Self::ClientError => "client_error",
			Self::NetworkError => "network_error",
			Self::InvalidResponse => "invalid_response",
			Self::Config => "config",
			Self::Storage => "storage",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than http/https.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// URL that failed validation.
		url: String,
	},
	/// Endpoint path could not be joined onto the base URL.
	#[error("Endpoint `{endpoint}` does not form a valid URL.")]
	InvalidEndpoint {
		/// Endpoint path supplied by the caller.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	BodySerialize(#[from] serde_json::Error),
	/// Breaker threshold must admit at least one failure.
	#[error("The consecutive failure threshold must be at least 1.")]
	InvalidThreshold,
	/// Backoff parameters are inconsistent.
	#[error("Backoff configuration is invalid: {reason}.")]
	InvalidBackoff {
		/// Which constraint failed.
		reason: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Dispatch did not complete before its deadline.
	#[error("Request timed out after {after:?}.")]
	Timeout {
		/// Deadline that elapsed.
		after: Duration,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Shared token refresh failed before the server produced an answer.
	#[error("Token refresh did not complete: {message}.")]
	Refresh {
		/// Summary of the underlying failure.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
