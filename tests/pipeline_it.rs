// std
use std::{
	collections::HashMap,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
use serde_json::{Value, json};
// self
use admin_api_client::{
	ApiClient, ClientConfig, Error, ErrorKind,
	breaker::CircuitStatus,
	config::{BreakerConfig, RateLimitConfig},
	error::TransportError,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	store::{ACCESS_TOKEN_KEY, MemoryStore, REFRESH_TOKEN_KEY, TokenStore},
};

const ACCESS: &str = "abc123def456";
const REFRESH: &str = "refresh-initial";
const ROTATED: &str = "access-rotated-0001";

type Handler = dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Scripted API: the handler receives the request and how many times its path was hit before.
struct FakeApi {
	handler: Box<Handler>,
	latency: Duration,
	path_latency: HashMap<String, Duration>,
	log: Mutex<Vec<HttpRequest>>,
	hits: Mutex<HashMap<String, usize>>,
}
impl FakeApi {
	fn new<F>(handler: F) -> Self
	where
		F: 'static + Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync,
	{
		Self {
			handler: Box::new(handler),
			latency: Duration::from_millis(20),
			path_latency: HashMap::new(),
			log: Mutex::new(Vec::new()),
			hits: Mutex::new(HashMap::new()),
		}
	}

	fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = latency;

		self
	}

	fn with_path_latency(mut self, path: &str, latency: Duration) -> Self {
		self.path_latency.insert(path.to_owned(), latency);

		self
	}

	fn hits(&self, path: &str) -> usize {
		self.hits.lock().get(path).copied().unwrap_or(0)
	}

	fn total(&self) -> usize {
		self.log.lock().len()
	}

	fn requests(&self) -> Vec<HttpRequest> {
		self.log.lock().clone()
	}
}
impl HttpTransport for FakeApi {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let nth = {
				let mut hits = self.hits.lock();
				let counter = hits.entry(request.url.path().to_owned()).or_default();
				let nth = *counter;

				*counter += 1;

				nth
			};

			let latency =
				self.path_latency.get(request.url.path()).copied().unwrap_or(self.latency);

			self.log.lock().push(request.clone());
			tokio::time::sleep(latency).await;

			(self.handler)(&request, nth)
		})
	}
}

fn ok(data: Value) -> Result<HttpResponse, TransportError> {
	Ok(HttpResponse::json(200, &json!({ "success": true, "data": data })))
}

fn status(code: u16, message: &str) -> Result<HttpResponse, TransportError> {
	Ok(HttpResponse::json(code, &json!({ "success": false, "message": message })))
}

fn rotated_tokens() -> Result<HttpResponse, TransportError> {
	ok(json!({ "token": ROTATED, "refreshToken": "refresh-rotated-0001" }))
}

fn config() -> admin_api_client::config::ClientConfigBuilder {
	ClientConfig::builder("https://api.example.com/api").rate_limit(RateLimitConfig::unthrottled())
}

async fn client_with(
	config: ClientConfig,
	api: FakeApi,
	tokens: Option<(&str, &str)>,
) -> (ApiClient<FakeApi>, Arc<FakeApi>, Arc<MemoryStore>) {
	let api = Arc::new(api);
	let store = Arc::new(MemoryStore::default());
	let client =
		ApiClient::with_transport(config, store.clone() as Arc<dyn TokenStore>, api.clone())
			.expect("Client should build from a valid configuration.");

	if let Some((access, refresh)) = tokens {
		client.tokens().set_tokens(access, refresh).await.expect("Seeding tokens should succeed.");
	}

	(client, api, store)
}

async fn client(
	api: FakeApi,
	tokens: Option<(&str, &str)>,
) -> (ApiClient<FakeApi>, Arc<FakeApi>, Arc<MemoryStore>) {
	client_with(config().build().expect("Test configuration should validate."), api, tokens).await
}

#[tokio::test(start_paused = true)]
async fn protected_call_without_token_fails_before_dispatch() {
	let (client, api, _store) = client(FakeApi::new(|_, _| ok(json!({}))), None).await;
	let err = client.get::<Value>("/users").await.expect_err("Call without a token should fail.");

	assert!(matches!(err, Error::AuthenticationRequired { ref endpoint } if endpoint == "/users"));
	assert!(err.requires_login());
	assert_eq!(api.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn stored_token_is_attached_as_bearer() {
	let (client, api, store) =
		client(FakeApi::new(|_, _| ok(json!({ "users": 3 }))), None).await;

	store.set(ACCESS_TOKEN_KEY, ACCESS.into()).await.expect("Seeding the store should succeed.");

	let envelope = client.get::<Value>("/users?page=2").await.expect("Call should succeed.");
	let requests = api.requests();

	assert_eq!(envelope.data, Some(json!({ "users": 3 })));
	assert_eq!(requests[0].bearer_token(), Some(ACCESS));
	assert_eq!(requests[0].url.as_str(), "https://api.example.com/api/users?page=2");
}

#[tokio::test(start_paused = true)]
async fn public_endpoints_skip_the_auth_gate() {
	let (client, api, _store) = client(FakeApi::new(|_, _| ok(json!({ "status": "ok" }))), None).await;
	let envelope = client.health().await.expect("Health probe should succeed without a token.");

	assert!(envelope.success);
	assert_eq!(api.requests()[0].header("authorization"), None);
}

#[tokio::test(start_paused = true)]
async fn concurrent_unauthorized_calls_share_one_refresh() {
	let api = FakeApi::new(|request, _| match request.url.path() {
		"/api/auth/refresh-token" => rotated_tokens(),
		_ if request.bearer_token() == Some(ROTATED) => ok(json!({ "ok": true })),
		_ => status(401, "Token expired"),
	});
	let (client, api, store) = client(api, Some((ACCESS, REFRESH))).await;
	let handles = (0..5)
		.map(|i| {
			let client = client.clone();

			tokio::spawn(async move { client.get::<Value>(&format!("/users/{i}")).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let envelope = handle
			.await
			.expect("Task should not panic.")
			.expect("Every call should succeed after the shared refresh.");

		assert_eq!(envelope.data, Some(json!({ "ok": true })));
	}

	assert_eq!(api.hits("/api/auth/refresh-token"), 1);
	assert_eq!(client.tokens().metrics().calls(), 1);
	assert_eq!(store.peek(ACCESS_TOKEN_KEY).as_deref(), Some(ROTATED));
	assert_eq!(store.peek(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-rotated-0001"));
}

#[tokio::test(start_paused = true)]
async fn repeated_unauthorized_after_refresh_expires_the_session() {
	let api = FakeApi::new(|request, _| match request.url.path() {
		"/api/auth/refresh-token" => rotated_tokens(),
		_ => status(401, "Still unauthorized"),
	});
	let (client, api, store) = client(api, Some((ACCESS, REFRESH))).await;
	let err = client.get::<Value>("/users").await.expect_err("Second 401 should be terminal.");

	assert_eq!(err.kind(), ErrorKind::AuthenticationExpired);
	assert!(err.requires_login());
	assert_eq!(api.hits("/api/users"), 2);
	assert_eq!(api.hits("/api/auth/refresh-token"), 1);
	assert!(store.is_empty());
	assert!(client.tokens().credentials().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_refresh_clears_tokens_and_requires_login() {
	let api = FakeApi::new(|request, _| match request.url.path() {
		"/api/auth/refresh-token" => status(401, "Invalid refresh token"),
		_ => status(401, "Token expired"),
	});
	let (client, api, store) = client(api, Some((ACCESS, REFRESH))).await;
	let err = client.get::<Value>("/dashboard/stats").await.expect_err("Refresh should fail.");

	assert!(
		matches!(err, Error::AuthenticationExpired { ref reason } if reason == "Invalid refresh token")
	);
	assert_eq!(api.hits("/api/dashboard/stats"), 1);
	assert!(store.is_empty());

	let err = client.get::<Value>("/dashboard/stats").await.expect_err("Session should be gone.");

	assert_eq!(err.kind(), ErrorKind::AuthenticationRequired);
	assert_eq!(api.hits("/api/dashboard/stats"), 1);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_without_refresh_token_expires_immediately() {
	let (client, api, _store) = client(FakeApi::new(|_, _| status(401, "nope")), Some((ACCESS, ""))).await;
	let err = client.get::<Value>("/users").await.expect_err("401 without refresh token should fail.");

	assert_eq!(err.kind(), ErrorKind::AuthenticationExpired);
	assert_eq!(api.hits("/api/auth/refresh-token"), 0);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_on_public_endpoint_is_a_client_error() {
	let (client, api, _store) =
		client(FakeApi::new(|_, _| status(401, "Invalid credentials")), None).await;
	let err = client.login("ops@example.com", "wrong").await.expect_err("Login should fail.");

	assert!(matches!(err, Error::ClientError { status: 401, ref message, .. } if message == "Invalid credentials"));
	assert_eq!(api.hits("/api/auth/refresh-token"), 0);
}

#[tokio::test(start_paused = true)]
async fn server_errors_open_the_breaker_without_touching_tokens() {
	let (client, api, store) =
		client(FakeApi::new(|_, _| status(500, "Database unavailable")), Some((ACCESS, REFRESH))).await;

	for _ in 0..5 {
		let err = client.get::<Value>("/users").await.expect_err("500 should surface.");

		assert!(matches!(err, Error::ServerError { status: 500, ref message } if message == "Database unavailable"));
	}

	assert_eq!(client.circuit_state().status, CircuitStatus::Open);

	let err = client.get::<Value>("/users").await.expect_err("Open breaker should short-circuit.");

	assert!(matches!(err, Error::ServiceUnavailable));
	assert_eq!(api.total(), 5);
	assert_eq!(store.peek(ACCESS_TOKEN_KEY).as_deref(), Some(ACCESS));

	client.reset_circuit();

	assert_eq!(client.circuit_state().status, CircuitStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn half_open_failure_reopens_immediately() {
	let healthy = Arc::new(AtomicBool::new(false));
	let flag = healthy.clone();
	let api = FakeApi::new(move |_, _| {
		if flag.load(Ordering::SeqCst) { ok(json!({})) } else { status(503, "Overloaded") }
	});
	let config = config()
		.breaker(BreakerConfig { max_consecutive_failures: 2, open_timeout: Duration::from_secs(1) })
		.build()
		.expect("Test configuration should validate.");
	let (client, api, _store) = client_with(config, api, Some((ACCESS, REFRESH))).await;

	for _ in 0..2 {
		client.get::<Value>("/users").await.expect_err("503 should surface.");
	}

	assert_eq!(client.circuit_state().status, CircuitStatus::Open);

	tokio::time::sleep(Duration::from_secs(1)).await;

	let err = client.get::<Value>("/users").await.expect_err("Trial call should fail.");

	assert_eq!(err.kind(), ErrorKind::ServerError);
	assert_eq!(client.circuit_state().status, CircuitStatus::Open);
	assert!(matches!(client.get::<Value>("/users").await, Err(Error::ServiceUnavailable)));
	assert_eq!(api.total(), 3);

	healthy.store(true, Ordering::SeqCst);
	tokio::time::sleep(Duration::from_secs(1)).await;
	client.get::<Value>("/users").await.expect("Recovered trial call should succeed.");

	assert_eq!(client.circuit_state().status, CircuitStatus::Closed);
	assert_eq!(client.circuit_state().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn late_success_keeps_an_open_breaker_open() {
	let api = FakeApi::new(|request, _| match request.url.path() {
		"/api/slow" => ok(json!({ "slow": true })),
		_ => status(500, "Database unavailable"),
	})
	.with_path_latency("/api/slow", Duration::from_secs(5));
	let (client, api, _store) = client(api, Some((ACCESS, REFRESH))).await;
	let slow = {
		let client = client.clone();

		tokio::spawn(async move { client.get::<Value>("/slow").await })
	};

	tokio::task::yield_now().await;

	assert_eq!(api.hits("/api/slow"), 1);

	for _ in 0..5 {
		client.get::<Value>("/fail").await.expect_err("500 should surface.");
	}

	assert_eq!(client.circuit_state().status, CircuitStatus::Open);

	let envelope = slow
		.await
		.expect("Task should not panic.")
		.expect("Call dispatched before the breaker opened should still succeed.");

	assert_eq!(envelope.data, Some(json!({ "slow": true })));
	assert_eq!(client.circuit_state().status, CircuitStatus::Open);
	assert!(matches!(client.get::<Value>("/fail").await, Err(Error::ServiceUnavailable)));
	assert_eq!(api.total(), 6);

	tokio::time::sleep(Duration::from_secs(30)).await;
	client.get::<Value>("/fail").await.expect_err("Trial call should reach the server.");

	assert_eq!(api.total(), 7);
	assert_eq!(client.circuit_state().status, CircuitStatus::Open);
}

#[tokio::test(start_paused = true)]
async fn client_errors_do_not_trip_the_breaker() {
	let api = FakeApi::new(|_, _| {
		Ok(HttpResponse::json(
			404,
			&json!({ "success": false, "error": "NOT_FOUND", "message": "User not found" }),
		))
	});
	let (client, _api, _store) = client(api, Some((ACCESS, REFRESH))).await;
	let err = client.delete::<Value>("/users/42").await.expect_err("404 should surface.");

	match err {
		Error::ClientError { status, code, message } => {
			assert_eq!(status, 404);
			assert_eq!(code.as_deref(), Some("NOT_FOUND"));
			assert_eq!(message, "User not found");
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(client.circuit_state().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_call_retries_once_then_surfaces() {
	let api = FakeApi::new(|_, _| Ok(HttpResponse::new(429, "").with_header("Retry-After", "3")));
	let (client, api, _store) = client(api, Some((ACCESS, REFRESH))).await;
	let err = client.get::<Value>("/users").await.expect_err("Persistent 429 should surface.");

	assert!(matches!(err, Error::RateLimited { retry_after: Some(delay) } if delay == Duration::from_secs(3)));
	assert_eq!(api.total(), 2);
	assert_eq!(client.backoff().current(), Duration::from_millis(150));
	assert_eq!(client.circuit_state().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_recovery_resets_backoff() {
	let api = FakeApi::new(|_, nth| {
		if nth == 0 { Ok(HttpResponse::new(429, "")) } else { ok(json!({ "count": 1 })) }
	});
	let (client, api, _store) = client(api, Some((ACCESS, REFRESH))).await;
	let envelope = client.get::<Value>("/dashboard/stats").await.expect("Retry should succeed.");

	assert_eq!(envelope.data, Some(json!({ "count": 1 })));
	assert_eq!(api.total(), 2);
	assert_eq!(client.backoff().current(), Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn transport_failures_count_toward_the_breaker() {
	let api = FakeApi::new(|_, _| Err(TransportError::network(std::io::Error::other("connection reset"))));
	let config = config()
		.breaker(BreakerConfig { max_consecutive_failures: 2, ..BreakerConfig::default() })
		.build()
		.expect("Test configuration should validate.");
	let (client, _api, store) = client_with(config, api, Some((ACCESS, REFRESH))).await;

	for _ in 0..2 {
		let err = client.get::<Value>("/users").await.expect_err("Transport failure should surface.");

		assert_eq!(err.kind(), ErrorKind::NetworkError);
	}

	assert_eq!(client.circuit_state().status, CircuitStatus::Open);
	assert_eq!(store.peek(ACCESS_TOKEN_KEY).as_deref(), Some(ACCESS));
}

#[tokio::test(start_paused = true)]
async fn slow_responses_time_out_as_network_errors() {
	let api = FakeApi::new(|_, _| ok(json!({}))).with_latency(Duration::from_secs(5));
	let config = config()
		.request_timeout(Duration::from_secs(1))
		.build()
		.expect("Test configuration should validate.");
	let (client, _api, _store) = client_with(config, api, Some((ACCESS, REFRESH))).await;
	let err = client.get::<Value>("/users").await.expect_err("Slow call should time out.");

	assert!(matches!(err, Error::Network(TransportError::Timeout { after }) if after == Duration::from_secs(1)));
	assert_eq!(client.circuit_state().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_server_failure_keeps_the_session() {
	let api = FakeApi::new(|request, _| match request.url.path() {
		"/api/auth/refresh-token" => status(502, "Bad gateway"),
		_ => status(401, "Token expired"),
	});
	let (client, _api, store) = client(api, Some((ACCESS, REFRESH))).await;
	let err = client.get::<Value>("/users").await.expect_err("Refresh outage should surface.");

	assert!(matches!(err, Error::ServerError { status: 502, .. }));
	assert!(!err.requires_login());
	assert_eq!(store.peek(REFRESH_TOKEN_KEY).as_deref(), Some(REFRESH));
}
