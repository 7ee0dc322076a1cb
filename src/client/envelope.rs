//! The `{ success, data, message, error, timestamp }` response envelope.

// self
use crate::_prelude::*;

/// Standard response wrapper returned by every dashboard endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
	/// Whether the server considers the call successful.
	#[serde(default = "default_success")]
	pub success: bool,
	/// Payload, when the endpoint returns one. A missing field decodes as `None`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	/// Human-readable message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	/// Machine-readable error code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Server timestamp in milliseconds since the Unix epoch.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<i64>,
}
impl<T> ApiEnvelope<T> {
	/// Envelope used for bodiless 2xx responses.
	pub fn empty() -> Self {
		Self { success: true, data: None, message: None, error: None, timestamp: None }
	}

	/// Unwraps the payload, turning an unsuccessful or empty envelope into an error.
	pub fn into_data(self) -> Result<T> {
		if !self.success {
			return Err(Error::ClientError {
				status: 200,
				message: self
					.message
					.or_else(|| self.error.clone())
					.unwrap_or_else(|| "request was not successful".into()),
				code: self.error,
			});
		}

		self.data.ok_or_else(|| Error::ClientError {
			status: 200,
			code: None,
			message: "response carried no data".into(),
		})
	}
}

fn default_success() -> bool {
	true
}

/// Decodes a 2xx body; an empty body yields [`ApiEnvelope::empty`].
pub(crate) fn decode<T>(endpoint: &str, body: &[u8]) -> Result<ApiEnvelope<T>>
where
	T: DeserializeOwned,
{
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(ApiEnvelope::empty());
	}

	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::Decode { endpoint: endpoint.to_owned(), source })
}

/// Pulls `(error code, message)` out of a non-2xx body, falling back to `fallback`.
pub(crate) fn error_details(body: &[u8], fallback: impl FnOnce() -> String) -> (Option<String>, String) {
	let envelope = serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(body).ok();

	match envelope {
		Some(envelope) => {
			let message = envelope.message.or_else(|| envelope.error.clone()).unwrap_or_else(fallback);

			(envelope.error, message)
		},
		None => (None, fallback()),
	}
}
