#![allow(dead_code)]

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use session_gate::config::Config;
use session_gate::domain::token::token_expiry;
use session_gate::{AppBuilder, api};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use time::OffsetDateTime;

static INIT: Once = Once::new();

pub const VALID_EMAIL: &str = "user@example.com";
pub const VALID_PASSWORD: &str = "correct-horse";

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("session_gate=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Signs a token expiring `ttl_secs` from now with a key the gateway never sees.
pub fn token_expiring_in(ttl_secs: i64) -> String {
    let claims = json!({ "sub": "user-1", "iat": now(), "exp": now() + ttl_secs });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"backend_secret")).unwrap()
}

pub fn token_without_exp() -> String {
    let claims = json!({ "sub": "user-1", "iat": now() });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"backend_secret")).unwrap()
}

pub fn exp_of(token: &str) -> i64 {
    token_expiry(token).expect("token should carry an expiry").unix_timestamp()
}

/// State of the mock backend: auth endpoints plus a couple of protected API routes.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub api_calls: AtomicUsize,
    pub refresh_delay_ms: AtomicU64,
    pub refresh_failure: Mutex<Option<StatusCode>>,
}

impl MockBackend {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn fail_refresh_with(&self, status: StatusCode) {
        *self.refresh_failure.lock().unwrap() = Some(status);
    }

    pub fn delay_refresh(&self, delay: Duration) {
        self.refresh_delay_ms.store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }
}

async fn mock_refresh(State(backend): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    let call = i64::try_from(backend.refresh_calls.fetch_add(1, Ordering::SeqCst)).unwrap();
    let delay = backend.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let failure = *backend.refresh_failure.lock().unwrap();
    if let Some(status) = failure {
        return (status, Json(json!({ "error": "refresh failed" }))).into_response();
    }
    if body["refreshToken"].as_str().unwrap_or_default().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "refreshToken required" }))).into_response();
    }

    Json(json!({
        "accessToken": token_expiring_in(900 + call),
        "refreshToken": token_expiring_in(86_400 + call),
    }))
    .into_response()
}

async fn mock_login(Json(body): Json<Value>) -> Response {
    if body["email"] == VALID_EMAIL && body["password"] == VALID_PASSWORD {
        Json(json!({
            "accessToken": token_expiring_in(900),
            "refreshToken": token_expiring_in(86_400),
        }))
        .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid credentials" }))).into_response()
    }
}

async fn mock_logout(State(backend): State<Arc<MockBackend>>) -> StatusCode {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

fn bearer_is_valid(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(token_expiry)
        .is_some_and(|exp| exp > OffsetDateTime::now_utc())
}

async fn mock_me(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.api_calls.fetch_add(1, Ordering::SeqCst);
    if bearer_is_valid(&headers) {
        Json(json!({ "id": "user-1" })).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn mock_echo(State(backend): State<Arc<MockBackend>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    backend.api_calls.fetch_add(1, Ordering::SeqCst);
    if bearer_is_valid(&headers) { Json(body).into_response() } else { StatusCode::UNAUTHORIZED.into_response() }
}

async fn mock_always_unauthorized(State(backend): State<Arc<MockBackend>>) -> StatusCode {
    backend.api_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::UNAUTHORIZED
}

pub fn mock_backend_router(backend: Arc<MockBackend>) -> Router {
    Router::new()
        .route("/auth/refresh", post(mock_refresh))
        .route("/auth/login", post(mock_login))
        .route("/auth/logout", post(mock_logout))
        .route("/api/me", get(mock_me).delete(mock_me))
        .route("/api/echo", post(mock_echo))
        .route("/api/always-401", get(mock_always_unauthorized))
        .with_state(backend)
}

/// Page renderer stand-in: reports what it received.
async fn mock_page(request: Request) -> Json<Value> {
    let cookie = request.headers().get(header::COOKIE).and_then(|v| v.to_str().ok()).map(str::to_string);
    Json(json!({
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "query": request.uri().query(),
        "cookie": cookie,
    }))
}

pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub backend_url: String,
    pub backend: Arc<MockBackend>,
    pub config: Config,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_args(&[]).await
    }

    pub async fn spawn_with_args(extra: &[&str]) -> Self {
        setup_tracing();

        let backend = Arc::new(MockBackend::default());
        let backend_url = serve(mock_backend_router(Arc::clone(&backend))).await;
        let upstream_url = serve(Router::new().fallback(mock_page)).await;

        // clap rejects repeated options, so explicit URLs replace the mocks.
        let mut args = vec!["session-gate".to_string()];
        for (flag, url) in [("--auth-service-url", &backend_url), ("--upstream-url", &upstream_url)] {
            if !extra.contains(&flag) {
                args.extend([flag.to_string(), url.clone()]);
            }
        }
        args.extend(extra.iter().map(ToString::to_string));
        let config = Config::parse_from(args);

        let state = AppBuilder::new(config.clone()).build().unwrap();
        let server_url = serve(api::app_router(state)).await;
        let mgmt_url = serve(api::mgmt_router()).await;

        let client = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap();

        Self { server_url, mgmt_url, backend_url, backend, config, client }
    }

    pub async fn get_with_cookies(&self, path: &str, cookies: &str) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{path}", self.server_url));
        if !cookies.is_empty() {
            request = request.header(header::COOKIE, cookies);
        }
        request.send().await.unwrap()
    }
}

pub fn cookies(access: Option<&str>, refresh: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(access) = access {
        parts.push(format!("accessToken={access}"));
    }
    if let Some(refresh) = refresh {
        parts.push(format!("refreshToken={refresh}"));
    }
    parts.join("; ")
}

pub fn set_cookies(resp: &reqwest::Response) -> Vec<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value assigned to `name` by the response's `Set-Cookie` headers, if any.
pub fn set_cookie_value(set_cookies: &[String], name: &str) -> Option<String> {
    set_cookies.iter().find_map(|cookie| {
        let (pair, _) = cookie.split_once(';').unwrap_or((cookie.as_str(), ""));
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub fn location(resp: &reqwest::Response) -> String {
    resp.headers()[header::LOCATION].to_str().unwrap().to_string()
}
