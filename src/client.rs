//! Public facade tying the token manager, breaker, limiter, and backoff into one client.

pub mod envelope;
pub mod request;

mod pipeline;

pub use envelope::ApiEnvelope;
pub use request::*;

// self
use crate::{
	_prelude::*,
	auth::{SessionTokens, TokenManager},
	backoff::Backoff,
	breaker::{CircuitBreaker, CircuitState},
	config::ClientConfig,
	http::HttpTransport,
	obs::log_event,
	rate_limit::RateLimiter,
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestTransport};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Resilient client for the admin dashboard API.
///
/// Every call goes through the same pipeline: circuit check, per-category rate gate, auth
/// gate, dispatch, and status policy. Cloning is cheap and clones share all state, so one
/// client can serve the whole dashboard.
pub struct ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	config: Arc<ClientConfig>,
	transport: Arc<T>,
	tokens: Arc<TokenManager<T>>,
	breaker: Arc<CircuitBreaker>,
	limiter: Arc<RateLimiter>,
	backoff: Arc<Backoff>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
	) -> Result<Self> {
		let transport = transport.into();
		let refresh_url = config.endpoint_url(&config.refresh_path)?;
		let tokens =
			TokenManager::new(store, transport.clone(), refresh_url, config.request_timeout);

		Ok(Self {
			breaker: Arc::new(CircuitBreaker::new(config.breaker)),
			limiter: Arc::new(RateLimiter::new(config.rate_limit)),
			backoff: Arc::new(Backoff::new(config.backoff)),
			tokens: Arc::new(tokens),
			transport,
			config: Arc::new(config),
		})
	}

	/// Active configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Token manager owning this client's credentials.
	pub fn tokens(&self) -> &TokenManager<T> {
		&self.tokens
	}

	/// Circuit breaker guarding this client.
	pub fn breaker(&self) -> &CircuitBreaker {
		&self.breaker
	}

	/// Per-category rate limiter.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// Shared 429 backoff.
	pub fn backoff(&self) -> &Backoff {
		&self.backoff
	}

	/// Snapshot of the circuit breaker.
	pub fn circuit_state(&self) -> CircuitState {
		self.breaker.state()
	}

	/// Forces the breaker back to `Closed`.
	pub fn reset_circuit(&self) {
		self.breaker.reset();
	}

	/// `GET endpoint`.
	pub async fn get<D>(&self, endpoint: &str) -> Result<ApiEnvelope<D>>
	where
		D: DeserializeOwned,
	{
		self.execute(ApiRequest::get(endpoint)).await
	}

	/// `POST endpoint` with a JSON body.
	pub async fn post<D, B>(&self, endpoint: &str, body: &B) -> Result<ApiEnvelope<D>>
	where
		D: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		self.execute(ApiRequest::post(endpoint).json(body)?).await
	}

	/// `PUT endpoint` with a JSON body.
	pub async fn put<D, B>(&self, endpoint: &str, body: &B) -> Result<ApiEnvelope<D>>
	where
		D: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		self.execute(ApiRequest::put(endpoint).json(body)?).await
	}

	/// `PATCH endpoint` with a JSON body.
	pub async fn patch<D, B>(&self, endpoint: &str, body: &B) -> Result<ApiEnvelope<D>>
	where
		D: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		self.execute(ApiRequest::patch(endpoint).json(body)?).await
	}

	/// `DELETE endpoint`.
	pub async fn delete<D>(&self, endpoint: &str) -> Result<ApiEnvelope<D>>
	where
		D: DeserializeOwned,
	{
		self.execute(ApiRequest::delete(endpoint)).await
	}

	/// Probes the unauthenticated health endpoint.
	pub async fn health(&self) -> Result<ApiEnvelope<serde_json::Value>> {
		self.execute(ApiRequest::get("/health")).await
	}

	/// Exchanges credentials for a session and installs the returned tokens.
	///
	/// Returns the remaining `data` fields (user profile and similar) with the tokens
	/// stripped out.
	pub async fn login(&self, email: &str, password: &str) -> Result<serde_json::Value> {
		let request = ApiRequest::post(self.config.login_path.as_str())
			.json(&serde_json::json!({ "email": email, "password": password }))?;
		let mut data = self.execute::<serde_json::Value>(request).await?.into_data()?;
		let tokens = serde_json::from_value::<SessionTokens>(data.clone()).map_err(|e| {
			Error::ClientError {
				status: 200,
				code: None,
				message: format!("login response carried no usable token: {e}"),
			}
		})?;

		self.tokens.set_tokens(tokens.token, tokens.refresh_token.unwrap_or_default()).await?;

		if let Some(profile) = data.as_object_mut() {
			profile.remove("token");
			profile.remove("refreshToken");
		}

		log_event!(info, "session established");

		Ok(data)
	}

	/// Ends the session. Server errors are ignored; local credentials are always cleared.
	pub async fn logout(&self) -> Result<()> {
		if self.tokens.access_token().is_some() {
			let request = ApiRequest::post(self.config.logout_path.as_str());

			if let Err(e) = self.execute::<serde_json::Value>(request).await {
				log_event!(debug, error = %e, "logout call failed; clearing credentials anyway");
			}
		}

		self.tokens.clear_tokens().await
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client backed by a fresh reqwest transport.
	pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

		Self::with_transport(config, store, ReqwestTransport::with_client(client))
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			transport: self.transport.clone(),
			tokens: self.tokens.clone(),
			breaker: self.breaker.clone(),
			limiter: self.limiter.clone(),
			backoff: self.backoff.clone(),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("circuit", &self.breaker.status())
			.field("tokens", &self.tokens)
			.finish()
	}
}
