//! Authenticated request gateway
//!
//! Every call to the backend goes through [`Gateway::send`]:
//!
//! 1. Pre-flight: authentication endpoints go out bare. Otherwise a stored
//!    access token is attached if it is still valid for longer than the
//!    refresh margin; if not, the coordinator supplies a new one first.
//! 2. Dispatch with a per-request `x-request-id` and the configured timeout.
//! 3. Post-flight: a 401, or a 403 that names the token, on a first attempt
//!    triggers one refresh and one replay of the same request. The replay is
//!    never replayed again.
//!
//! Every other response, success or failure, reaches the caller unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use backoffice_auth::{
    ApiEnvelope, DEFAULT_BASE_URL, DEFAULT_REFRESH_MARGIN_SECS, DEFAULT_TIMEOUT_SECS,
    SessionStore, endpoint, extract_message, is_auth_endpoint, is_token_valid,
};
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::classify::is_token_failure;
use crate::coordinator::{HttpRefresher, RefreshCoordinator, Refresher};
use crate::error::{Error, RefreshFailure, Result, StatusError};
use crate::metrics;

/// Header carrying the correlation id of one logical request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Backend API root, e.g. `http://localhost:8091/api/v1`.
    pub base_url: String,
    /// Transport timeout per attempt.
    pub timeout: Duration,
    /// Tokens expiring within this margin are refreshed before use.
    pub refresh_margin: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
        }
    }
}

/// A backend call, described independently of any attempt to send it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/mesas/4`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::InvalidRequest(format!("serializing request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Whether this targets login or refresh, which never carry a token.
    pub fn is_auth_endpoint(&self) -> bool {
        is_auth_endpoint(&self.path)
    }
}

/// A successful (2xx) backend response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    /// Decode the raw body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn envelope<T: DeserializeOwned>(&self) -> Result<ApiEnvelope<T>> {
        self.json()
    }

    /// Decode the envelope and unwrap its payload.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(self.envelope::<T>()?.into_data()?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One send of a request. The replay is a new value with `retried` set,
/// so the original attempt is never mutated.
#[derive(Debug, Clone, Copy)]
struct Attempt<'a> {
    request: &'a ApiRequest,
    retried: bool,
}

impl<'a> Attempt<'a> {
    fn first(request: &'a ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    fn replay(self) -> Self {
        Self {
            request: self.request,
            retried: true,
        }
    }
}

/// Authenticated HTTP client for the back-office API.
///
/// Cheap to clone; clones share the HTTP connection pool, the session store
/// and the refresh coordinator.
#[derive(Clone)]
pub struct Gateway {
    client: reqwest::Client,
    base_url: String,
    margin: Duration,
    store: Arc<dyn SessionStore>,
    coordinator: RefreshCoordinator,
}

impl Gateway {
    /// Gateway that refreshes through the backend's refresh endpoint.
    pub fn new(config: GatewayConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let client = build_client(&config)?;
        let refresher = Arc::new(HttpRefresher::new(client.clone(), config.base_url.clone()));
        Ok(Self::assemble(config, client, store, refresher))
    }

    /// Gateway with a caller-supplied refresher.
    pub fn with_refresher(
        config: GatewayConfig,
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn Refresher>,
    ) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self::assemble(config, client, store, refresher))
    }

    fn assemble(
        config: GatewayConfig,
        client: reqwest::Client,
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn Refresher>,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(store.clone(), refresher, config.refresh_margin);
        info!(
            base_url = %config.base_url,
            timeout_secs = config.timeout.as_secs_f64(),
            refresh_margin_secs = config.refresh_margin.as_secs(),
            "gateway initialized"
        );
        Self {
            client,
            base_url: config.base_url,
            margin: config.refresh_margin,
            store,
            coordinator,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn refresh_margin(&self) -> Duration {
        self.margin
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::POST, path).with_json(body)?)
            .await
    }

    /// POST without a body (logout and similar actions).
    pub async fn post_empty(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::POST, path)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::PUT, path).with_json(body)?)
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::PATCH, path).with_json(body)?)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Send a request with transparent authentication.
    ///
    /// Returns `NoSession` or `SessionExpired` when no valid token can be
    /// obtained; the session has been cleared in that case.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let started = Instant::now();

        let result = self.execute(&request, &request_id).await;

        let status = match &result {
            Ok(response) => response.status.to_string(),
            Err(Error::Status(e)) => e.status.to_string(),
            Err(_) => metrics::STATUS_ERROR.to_string(),
        };
        metrics::record_request(
            request.method.as_str(),
            &status,
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn execute(&self, request: &ApiRequest, request_id: &str) -> Result<ApiResponse> {
        let attempt = Attempt::first(request);
        let token = self.preflight(request, request_id).await?;

        match self.dispatch(attempt, token.as_deref(), request_id).await {
            Err(Error::Status(failure)) if should_replay(attempt, &failure) => {
                info!(
                    request_id,
                    status = failure.status,
                    path = %request.path,
                    "access token rejected, refreshing and replaying"
                );
                let fresh = self
                    .coordinator
                    .replace_token(token.as_deref().unwrap_or_default())
                    .await
                    .map_err(Error::SessionExpired)?;
                metrics::record_replay();
                self.dispatch(attempt.replay(), Some(&fresh), request_id)
                    .await
            }
            other => other,
        }
    }

    /// Pick the token to send, refreshing first when the stored one is
    /// expired or about to expire.
    async fn preflight(&self, request: &ApiRequest, request_id: &str) -> Result<Option<String>> {
        if request.is_auth_endpoint() {
            return Ok(None);
        }

        let Some(token) = self.store.access_token().filter(|t| !t.is_empty()) else {
            debug!(request_id, "no session, sending unauthenticated");
            return Ok(None);
        };

        if is_token_valid(&token, self.margin) {
            return Ok(Some(token));
        }

        debug!(request_id, "access token expired or expiring, refreshing before send");
        match self.coordinator.replace_token(&token).await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(failure @ RefreshFailure::MissingRefreshToken) => {
                Err(Error::SessionExpired(failure))
            }
            Err(failure) => Err(Error::NoSession(failure)),
        }
    }

    async fn dispatch(
        &self,
        attempt: Attempt<'_>,
        token: Option<&str>,
        request_id: &str,
    ) -> Result<ApiResponse> {
        let request = attempt.request;
        let url = endpoint(&self.base_url, &request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(REQUEST_ID_HEADER, request_id);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            request_id,
            method = %request.method,
            path = %request.path,
            authenticated = token.is_some(),
            retried = attempt.retried,
            "sending request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(ApiResponse {
                status: status.as_u16(),
                headers,
                body,
            });
        }

        let text = String::from_utf8_lossy(&body).into_owned();
        debug!(request_id, status = status.as_u16(), "backend rejected request");
        Err(Error::Status(StatusError {
            status: status.as_u16(),
            message: extract_message(&text),
            body: text,
        }))
    }
}

fn build_client(config: &GatewayConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(config.timeout).build()?)
}

/// Replay only first attempts at non-auth endpoints that failed on the token.
fn should_replay(attempt: Attempt<'_>, failure: &StatusError) -> bool {
    !attempt.retried
        && !attempt.request.is_auth_endpoint()
        && is_token_failure(failure.status, &failure.message)
}
