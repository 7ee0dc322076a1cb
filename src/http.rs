//! Transport primitives for outbound API calls.
//!
//! The module exposes [`HttpTransport`] alongside plain [`HttpRequest`] and
//! [`HttpResponse`] values so embedders can plug in any HTTP stack without the pipeline
//! depending on it. The crate ships [`ReqwestTransport`] behind the default `reqwest`
//! feature. Deadlines are enforced by the pipeline, not by the transport.

// std
use std::collections::BTreeMap;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing a single request.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// pipeline and the token manager without additional wrappers. A transport never retries
/// and never interprets status codes; any response the server produced is returned as
/// `Ok`, and only failures to obtain a response are reported as [`TransportError`].
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request` and resolves with the raw response.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// HTTP methods used by the dashboard API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`.
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound request handed to a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Header map; names are stored lowercase.
	pub headers: BTreeMap<String, String>,
	/// Optional JSON body bytes.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Creates a bodiless request.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None }
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Attaches a JSON body and the matching content type.
	pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
		self.headers.insert("content-type".into(), "application/json".into());
		self.body = Some(body);

		self
	}

	/// Looks up a header case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Returns the bearer token carried in `Authorization`, if any.
	pub fn bearer_token(&self) -> Option<&str> {
		self.header("authorization").and_then(|value| value.strip_prefix("Bearer "))
	}
}

/// Raw response returned by a transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header map; names are stored lowercase.
	pub headers: BTreeMap<String, String>,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Creates a JSON response from a serializable value.
	pub fn json(status: u16, value: &serde_json::Value) -> Self {
		Self::new(status, value.to_string()).with_header("content-type", "application/json")
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Looks up a header case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Parses the `Retry-After` header as delta-seconds or an RFC 2822 date.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(self.header("retry-after")?, OffsetDateTime::now_utc())
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn build_request(&self, request: HttpRequest) -> Result<reqwest::Request, TransportError> {
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		};
		let mut builder = self.0.request(method, request.url);

		for (name, value) in &request.headers {
			let name = HeaderName::from_bytes(name.as_bytes()).map_err(TransportError::network)?;
			let value = HeaderValue::from_str(value).map_err(TransportError::network)?;

			builder = builder.header(name, value);
		}
		if let Some(body) = request.body {
			if !request.headers.contains_key(CONTENT_TYPE.as_str()) {
				builder = builder.header(CONTENT_TYPE, "application/json");
			}

			builder = builder.body(body);
		}

		Ok(builder.build()?)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let request = self.build_request(request)?;
			let response = self.0.execute(request).await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse { status, headers, body })
		})
	}
}

fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Duration::try_from(delta).ok();
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = datetime!(2025-11-10 12:00 UTC);

		assert_eq!(parse_retry_after("7", now), Some(Duration::from_secs(7)));
		assert_eq!(
			parse_retry_after("Mon, 10 Nov 2025 12:00:30 +0000", now),
			Some(Duration::from_secs(30))
		);
		assert_eq!(parse_retry_after("Mon, 10 Nov 2025 11:59:00 +0000", now), None);
		assert_eq!(parse_retry_after("soon", now), None);
	}

	#[test]
	fn headers_are_case_insensitive() {
		let url = Url::parse("https://api.example.com/users").expect("Fixture URL should parse.");
		let request =
			HttpRequest::new(Method::Get, url).with_header("Authorization", "Bearer abc123def456");

		assert_eq!(request.header("AUTHORIZATION"), Some("Bearer abc123def456"));
		assert_eq!(request.bearer_token(), Some("abc123def456"));

		let response = HttpResponse::new(429, "").with_header("Retry-After", "2");

		assert_eq!(response.retry_after(), Some(Duration::from_secs(2)));
		assert!(!response.is_success());
	}
}
