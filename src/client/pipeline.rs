//! The request pipeline every call flows through.
//!
//! Stages run in a fixed order on each dispatch: circuit check, rate gate, auth gate,
//! dispatch under the request deadline. The response then goes through the status
//! policy, which may loop back for exactly one refresh-and-retry (401) and one delayed
//! retry (429) before producing a terminal result.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	client::{
		ApiClient, ApiEnvelope, ApiRequest, RetryReason,
		envelope::{self, error_details},
	},
	error::TransportError,
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{self, CallOutcome, CallSpan, log_event},
};

/// Response paired with the bearer token the request carried.
struct Dispatched {
	response: HttpResponse,
	bearer: Option<TokenSecret>,
}

impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Runs `request` through the pipeline and decodes the response envelope.
	pub async fn execute<D>(&self, request: ApiRequest) -> Result<ApiEnvelope<D>>
	where
		D: DeserializeOwned,
	{
		let category = request.category();
		let span = CallSpan::call(request.method, &request.endpoint, category);

		obs::record_call_outcome(category, CallOutcome::Attempt);

		let result = span.instrument(self.run(request)).await;

		obs::record_call_outcome(category, CallOutcome::of(&result));

		result
	}

	async fn run<D>(&self, mut request: ApiRequest) -> Result<ApiEnvelope<D>>
	where
		D: DeserializeOwned,
	{
		request.record_dispatch();

		let mut dispatched = self.dispatch(&request).await?;

		loop {
			let Dispatched { response, bearer } = dispatched;

			match response.status {
				200..=299 => {
					self.breaker.record_success();
					self.backoff.reset();

					return envelope::decode(&request.endpoint, &response.body);
				},
				401 if request.requires_auth => {
					if !self.tokens.has_refresh_token() {
						return Err(self.expire("no refresh token available").await);
					}
					if !request.begin_retry(RetryReason::Unauthorized) {
						return Err(self.expire("request was rejected again after a token refresh").await);
					}

					request.record_dispatch();

					let stale = bearer.as_ref().map(TokenSecret::expose);
					let retry = &request;

					dispatched = self.tokens.refresh_and_retry(stale, || self.dispatch(retry)).await?;
				},
				429 => {
					if !request.begin_retry(RetryReason::RateLimited) {
						return Err(Error::RateLimited { retry_after: response.retry_after() });
					}

					let delay = self.backoff.escalate();

					log_event!(info, endpoint = %request.endpoint, ?delay, "rate limited; backing off");

					tokio::time::sleep(delay).await;
					request.record_dispatch();

					dispatched = self.dispatch(&request).await?;
				},
				status @ 500..=599 => {
					self.breaker.record_failure(true);

					let (_, message) =
						error_details(&response.body, || format!("server answered {status}"));

					return Err(Error::ServerError { status, message });
				},
				status => {
					let (code, message) =
						error_details(&response.body, || format!("server answered {status}"));

					return Err(Error::ClientError { status, code, message });
				},
			}
		}
	}

	async fn dispatch(&self, request: &ApiRequest) -> Result<Dispatched> {
		if !self.breaker.allow() {
			return Err(Error::ServiceUnavailable);
		}

		let category = request.category();

		self.limiter.wait_for_slot(category).await;
		self.limiter.record_request(category);

		if request.requires_auth && !self.tokens.ensure_token().await {
			return Err(Error::AuthenticationRequired { endpoint: request.endpoint.clone() });
		}

		let url = self.config.endpoint_url(&request.endpoint)?;
		let bearer = self.tokens.access_token();
		let mut http = HttpRequest::new(request.method, url);

		for (name, value) in &request.headers {
			http = http.with_header(name, value.clone());
		}
		if let Some(token) = &bearer {
			http = http.with_header("authorization", token.bearer());
		}
		if let Some(body) = &request.body {
			http.body = Some(body.clone());
		}

		let timeout = self.config.request_timeout;
		let response = match tokio::time::timeout(timeout, self.transport.send(http)).await {
			Ok(Ok(response)) => response,
			Ok(Err(e)) => {
				self.breaker.record_failure(true);

				return Err(e.into());
			},
			Err(_) => {
				self.breaker.record_failure(true);

				return Err(TransportError::Timeout { after: timeout }.into());
			},
		};

		Ok(Dispatched { response, bearer })
	}

	async fn expire(&self, reason: &str) -> Error {
		if let Err(e) = self.tokens.clear_tokens().await {
			log_event!(warn, error = %e, "failed to clear expired credentials");
		}

		Error::AuthenticationExpired { reason: reason.to_owned() }
	}
}
