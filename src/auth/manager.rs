//! Token lifecycle owner with single-flight refresh coordination.
//!
//! [`TokenManager`] keeps the in-memory [`Credentials`], mirrors every change into the
//! injected [`TokenStore`], and guarantees that concurrent callers hitting a 401 never
//! issue more than one refresh call at a time. The first caller becomes the leader and
//! performs the `POST <refresh_path>` round trip; everybody arriving while it runs is
//! queued as a waiter. When the leader finishes, waiters are drained in arrival order and
//! all of them observe the same [`RefreshOutcome`].

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{
		Credentials, RefreshMetrics, TokenSecret,
		credentials,
	},
	error::TransportError,
	http::{HttpRequest, HttpTransport, Method},
	obs::{self, CallOutcome, CallSpan, log_event},
	store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, StoreError, TokenStore},
};

/// Token pair returned by the refresh and login endpoints inside `data`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
	/// New access token.
	pub token: String,
	/// Rotated refresh token; absent when the server keeps the old one valid.
	#[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
}
impl Debug for SessionTokens {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionTokens")
			.field("token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

#[derive(Deserialize)]
struct RefreshEnvelope {
	#[serde(default)]
	success: bool,
	#[serde(default)]
	data: Option<SessionTokens>,
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	error: Option<String>,
}

/// Outcome shared by every caller that waited on one refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// New tokens are installed; callers should re-issue their request.
	Refreshed,
	/// The server refused the refresh token; credentials were cleared.
	Rejected {
		/// Server-provided or synthesized reason.
		reason: String,
	},
	/// The refresh could not be completed (transport failure, 5xx, 429); credentials kept.
	Unavailable {
		/// HTTP status, when the server answered.
		status: Option<u16>,
		/// Summary of the failure.
		reason: String,
	},
}
impl RefreshOutcome {
	/// Converts the outcome into the error a waiting caller should surface.
	pub fn into_result(self) -> Result<()> {
		match self {
			Self::Refreshed => Ok(()),
			Self::Rejected { reason } => Err(Error::AuthenticationExpired { reason }),
			Self::Unavailable { status: Some(429), .. } => Err(Error::RateLimited { retry_after: None }),
			Self::Unavailable { status: Some(status), reason } =>
				Err(Error::ServerError { status, message: reason }),
			Self::Unavailable { status: None, reason } =>
				Err(TransportError::Refresh { message: reason }.into()),
		}
	}

	fn as_outcome(&self) -> CallOutcome {
		match self.clone().into_result() {
			Ok(()) => CallOutcome::Success,
			Err(e) => CallOutcome::Failure(e.kind()),
		}
	}
}

#[derive(Default)]
struct TokenState {
	credentials: Credentials,
	flight: Option<Vec<oneshot::Sender<RefreshOutcome>>>,
}

/// Owns credentials and serializes refreshes for one session.
pub struct TokenManager<T>
where
	T: ?Sized + HttpTransport,
{
	store: Arc<dyn TokenStore>,
	transport: Arc<T>,
	refresh_url: Url,
	timeout: Duration,
	state: Mutex<TokenState>,
	metrics: Arc<RefreshMetrics>,
}
impl<T> TokenManager<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a manager that refreshes against `refresh_url` through `transport`.
	pub fn new(
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
		refresh_url: Url,
		timeout: Duration,
	) -> Self {
		Self {
			store,
			transport: transport.into(),
			refresh_url,
			timeout,
			state: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Shared refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns a copy of the in-memory credentials.
	pub fn credentials(&self) -> Credentials {
		self.state.lock().credentials.clone()
	}

	/// Returns the in-memory access token, if any.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.state.lock().credentials.access_token.clone()
	}

	/// Returns `true` when a refresh token is held in memory.
	pub fn has_refresh_token(&self) -> bool {
		self.state.lock().credentials.refresh_token.is_some()
	}

	/// Returns `true` while a refresh call is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().flight.is_some()
	}

	/// Makes sure a well-formed access token is available, loading it from the store if
	/// memory is empty. Malformed tokens clear the session and yield `false`.
	pub async fn ensure_token(&self) -> bool {
		let cached = self.access_token();
		let access = match cached {
			Some(token) => Some(token),
			None => self.load_from_store().await,
		};

		match access {
			Some(token) if token.is_well_formed() => true,
			Some(_) => {
				log_event!(warn, "stored access token is malformed; clearing credentials");

				if let Err(e) = self.clear_tokens().await {
					log_event!(warn, error = %e, "failed to clear malformed credentials");
				}

				false
			},
			None => false,
		}
	}

	/// Replaces both tokens and persists them.
	pub async fn set_tokens(&self, access: impl Into<String>, refresh: impl Into<String>) -> Result<()> {
		let credentials = Credentials::new(access, refresh);
		let access = credentials.access().map(str::to_owned);
		let refresh = credentials.refresh().map(str::to_owned);

		self.state.lock().credentials = credentials;
		self.persist(ACCESS_TOKEN_KEY, access).await?;
		self.persist(REFRESH_TOKEN_KEY, refresh).await?;

		Ok(())
	}

	/// Wipes in-memory credentials and both store entries.
	pub async fn clear_tokens(&self) -> Result<()> {
		self.state.lock().credentials = Credentials::default();

		log_event!(info, "credentials cleared");

		let access = self.store.delete(ACCESS_TOKEN_KEY).await;
		let refresh = self.store.delete(REFRESH_TOKEN_KEY).await;

		access.and(refresh).map_err(Error::from)
	}

	/// Refreshes (or joins an in-flight refresh) and then runs `pending_call`.
	///
	/// `stale_access` is the token the failed request carried. If it has already been
	/// replaced, no new refresh is started and `pending_call` runs with the current token.
	pub async fn refresh_and_retry<R, F, Fut>(
		&self,
		stale_access: Option<&str>,
		pending_call: F,
	) -> Result<R>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<R>>,
	{
		self.refresh(stale_access).await.into_result()?;

		pending_call().await
	}

	/// Single-flight refresh. Returns once the shared refresh has completed.
	pub async fn refresh(&self, stale_access: Option<&str>) -> RefreshOutcome {
		let waiter = {
			let mut state = self.state.lock();

			if let (Some(current), Some(stale)) = (&state.credentials.access_token, stale_access)
				&& !current.matches(stale)
				&& state.flight.is_none()
			{
				return RefreshOutcome::Refreshed;
			}

			match state.flight.as_mut() {
				Some(waiters) => {
					let (tx, rx) = oneshot::channel();

					waiters.push(tx);

					Some(rx)
				},
				None => {
					state.flight = Some(Vec::new());

					None
				},
			}
		};

		if let Some(rx) = waiter {
			self.metrics.record_coalesced();

			log_event!(debug, "joined in-flight token refresh");

			return rx.await.unwrap_or_else(|_| RefreshOutcome::Unavailable {
				status: None,
				reason: "refresh was abandoned before completing".into(),
			});
		}

		let flight = Flight { state: &self.state, armed: true };
		let outcome = CallSpan::refresh().instrument(self.perform_refresh()).await;

		obs::record_refresh_outcome(outcome.as_outcome());
		flight.complete(outcome.clone());

		outcome
	}

	async fn perform_refresh(&self) -> RefreshOutcome {
		let refresh_token = self.state.lock().credentials.refresh().map(str::to_owned);
		let Some(refresh_token) = refresh_token else {
			let outcome = RefreshOutcome::Rejected { reason: "no refresh token available".into() };

			self.apply(&outcome, None).await;

			return outcome;
		};

		self.metrics.record_call();

		log_event!(info, "refreshing access token");

		let body = serde_json::json!({ "refreshToken": refresh_token }).to_string();
		let request = HttpRequest::new(Method::Post, self.refresh_url.clone())
			.with_json_body(body.into_bytes());
		let response =
			match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
				Ok(Ok(response)) => response,
				Ok(Err(e)) => {
					let outcome = RefreshOutcome::Unavailable { status: None, reason: e.to_string() };

					self.apply(&outcome, None).await;

					return outcome;
				},
				Err(_) => {
					let outcome = RefreshOutcome::Unavailable {
						status: None,
						reason: TransportError::Timeout { after: self.timeout }.to_string(),
					};

					self.apply(&outcome, None).await;

					return outcome;
				},
			};
		let parsed = serde_json::from_slice::<RefreshEnvelope>(&response.body).ok();
		let reason = parsed
			.as_ref()
			.and_then(|envelope| envelope.message.clone().or_else(|| envelope.error.clone()))
			.unwrap_or_else(|| format!("refresh endpoint answered {}", response.status));
		let (outcome, tokens) = match response.status {
			200..=299 => match parsed {
				Some(RefreshEnvelope { success: true, data: Some(tokens), .. })
					if !tokens.token.trim().is_empty() =>
					(RefreshOutcome::Refreshed, Some(tokens)),
				_ => (RefreshOutcome::Rejected { reason }, None),
			},
			429 | 500..=599 =>
				(RefreshOutcome::Unavailable { status: Some(response.status), reason }, None),
			_ => (RefreshOutcome::Rejected { reason }, None),
		};

		self.apply(&outcome, tokens).await;

		outcome
	}

	async fn apply(&self, outcome: &RefreshOutcome, tokens: Option<SessionTokens>) {
		match outcome {
			RefreshOutcome::Refreshed => {
				self.metrics.record_success();

				let Some(tokens) = tokens else { return };
				let refresh = tokens
					.refresh_token
					.or_else(|| self.state.lock().credentials.refresh().map(str::to_owned))
					.unwrap_or_default();

				if let Err(e) = self.set_tokens(tokens.token, refresh).await {
					log_event!(warn, error = %e, "refreshed tokens could not be persisted");
				}

				log_event!(info, "access token refreshed");
			},
			RefreshOutcome::Rejected { reason } => {
				self.metrics.record_failure();

				log_event!(warn, reason = %reason, "token refresh rejected; clearing credentials");

				if let Err(e) = self.clear_tokens().await {
					log_event!(warn, error = %e, "failed to clear rejected credentials");
				}
			},
			RefreshOutcome::Unavailable { status, reason } => {
				self.metrics.record_failure();

				log_event!(warn, ?status, reason = %reason, "token refresh unavailable; keeping credentials");
			},
		}
	}

	async fn load_from_store(&self) -> Option<TokenSecret> {
		let access = self.read_store(ACCESS_TOKEN_KEY).await.and_then(credentials::non_empty)?;
		let refresh = self.read_store(REFRESH_TOKEN_KEY).await.and_then(credentials::non_empty);
		let mut state = self.state.lock();

		if state.credentials.access_token.is_none() {
			state.credentials = Credentials {
				access_token: Some(access),
				refresh_token: refresh,
				updated_at: None,
			};
		}

		state.credentials.access_token.clone()
	}

	async fn read_store(&self, key: &str) -> Option<String> {
		match self.store.get(key).await {
			Ok(value) => value,
			Err(e) => {
				log_event!(warn, key, error = %e, "token store read failed");

				None
			},
		}
	}

	async fn persist(&self, key: &str, value: Option<String>) -> Result<(), StoreError> {
		match value {
			Some(value) => self.store.set(key, value).await,
			None => self.store.delete(key).await,
		}
	}
}
impl<T> Debug for TokenManager<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("TokenManager")
			.field("refresh_url", &self.refresh_url.as_str())
			.field("credentials", &state.credentials)
			.field("refreshing", &state.flight.is_some())
			.finish()
	}
}

/// Leader's handle on the in-flight refresh. Dropping it without completing releases the
/// flight and wakes every waiter with an abandoned outcome.
struct Flight<'a> {
	state: &'a Mutex<TokenState>,
	armed: bool,
}
impl Flight<'_> {
	fn complete(mut self, outcome: RefreshOutcome) {
		self.armed = false;

		let waiters = self.state.lock().flight.take().unwrap_or_default();

		for waiter in waiters {
			let _ = waiter.send(outcome.clone());
		}
	}
}
impl Drop for Flight<'_> {
	fn drop(&mut self) {
		if self.armed {
			let abandoned = self.state.lock().flight.take();

			drop(abandoned);
		}
	}
}
