//! Mock back-office backend for gateway tests
//!
//! An axum server on `127.0.0.1:0` serving the auth endpoints and a handful
//! of business routes. Only tokens the mock issued itself are accepted, so a
//! token that is unexpired but unknown behaves like a revoked one.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use backoffice_auth::UserInfo;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};

use crate::gateway::GatewayConfig;

const API_PREFIX: &str = "/api/v1";

type Reply = (StatusCode, Json<Value>);

/// Unsigned JWT expiring `exp_offset_secs` from now (negative = expired).
pub(crate) fn mint_token(exp_offset_secs: i64) -> String {
    let now = backoffice_auth::claims::now_epoch_secs() as i64;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "exp": now + exp_offset_secs,
            "iat": now,
            "sub": "mesero1",
            "jti": uuid::Uuid::new_v4().to_string(),
        })
        .to_string(),
    );
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

fn user_json() -> Value {
    json!({
        "id": 12,
        "username": "mesero1",
        "nombre": "Lucia Ramos",
        "email": "lucia@example.com",
        "tipoUsuario": "MESERO",
        "tipoUsuarioDisplayName": "Mesero",
        "empresaId": 3,
        "empresaNombre": "La Terraza",
        "permissions": ["MANAGE_ORDERS", "VIEW_ORDERS", "VIEW_RESERVATIONS", "MANAGE_TABLES"]
    })
}

pub(crate) fn sample_user() -> UserInfo {
    serde_json::from_value(user_json()).unwrap()
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub request_id: Option<String>,
    pub query: Option<String>,
}

#[derive(Default)]
pub(crate) struct MockState {
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    refresh_delay: Duration,
    reject_refresh: AtomicBool,
    accepted: Mutex<HashSet<String>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockState {
    fn issue(&self, exp_offset_secs: i64) -> String {
        let token = mint_token(exp_offset_secs);
        self.accepted.lock().unwrap().insert(token.clone());
        token
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| self.accepted.lock().unwrap().contains(token))
    }

    fn guard(&self, headers: &HeaderMap) -> Result<(), Reply> {
        if self.authorized(headers) {
            Ok(())
        } else {
            Err(fail(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

pub(crate) struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub(crate) async fn start() -> Self {
        Self::start_with_refresh_delay(Duration::ZERO).await
    }

    pub(crate) async fn start_with_refresh_delay(refresh_delay: Duration) -> Self {
        let state = Arc::new(MockState {
            refresh_delay,
            ..Default::default()
        });

        let api = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/auth/me", get(me))
            .route("/auth/validate", get(validate))
            .route("/mesas", get(tables))
            .route("/pedidos", get(orders))
            .route("/reportes", get(reports))
            .route("/always-401", get(always_unauthorized))
            .route("/lento", get(slow))
            .route("/roto", get(broken))
            .route("/publico", get(public))
            .route("/eco", post(echo))
            .route("/productos", get(list_products).post(create_product))
            .route("/productos/buscar", get(search_products))
            .route(
                "/productos/{id}",
                get(get_product).put(update_product).delete(delete_product),
            )
            .route("/categorias", get(empty_list));

        let app = Router::new()
            .nest(API_PREFIX, api)
            .layer(middleware::from_fn_with_state(state.clone(), record))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self {
            base_url: format!("http://{addr}{API_PREFIX}"),
            state,
        }
    }

    pub(crate) fn config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(5),
            refresh_margin: Duration::from_secs(30),
        }
    }

    /// Mint a token the backend will accept.
    pub(crate) fn issue_token(&self, exp_offset_secs: i64) -> String {
        self.state.issue(exp_offset_secs)
    }

    pub(crate) fn reject_refresh(&self) {
        self.state.reject_refresh.store(true, Ordering::SeqCst);
    }

    /// Requests received for `path` (relative to the API root), in order.
    pub(crate) fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn record(State(state): State<Arc<MockState>>, request: Request, next: Next) -> Response {
    let recorded = RecordedRequest {
        method: request.method().to_string(),
        path: request
            .uri()
            .path()
            .trim_start_matches(API_PREFIX)
            .to_string(),
        authorization: header_value(request.headers(), "authorization"),
        request_id: header_value(request.headers(), "x-request-id"),
        query: request.uri().query().map(str::to_string),
    };
    state.requests.lock().unwrap().push(recorded);
    next.run(request).await
}

fn ok(data: Value) -> Reply {
    (
        StatusCode::OK,
        Json(json!({"status": "SUCCESS", "code": 200, "message": "OK", "data": data})),
    )
}

fn fail(status: StatusCode, message: &str) -> Reply {
    (
        status,
        Json(json!({"status": "ERROR", "code": status.as_u16(), "message": message})),
    )
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Reply {
    match (body["username"].as_str(), body["password"].as_str()) {
        (Some("mesero1"), Some("secreto")) => ok(json!({
            "accessToken": state.issue(900),
            "refreshToken": "rt_login",
            "tokenType": "Bearer",
            "expiresIn": 900,
            "user": user_json()
        })),
        (Some("bloqueado"), _) => fail(StatusCode::LOCKED, "Cuenta bloqueada"),
        (Some("inactivo"), _) => fail(StatusCode::FORBIDDEN, "Usuario inactivo"),
        _ => fail(StatusCode::UNAUTHORIZED, "Credenciales inválidas"),
    }
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Reply {
    let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(state.refresh_delay).await;

    if state.reject_refresh.load(Ordering::SeqCst) || body["refreshToken"].as_str().is_none() {
        return fail(StatusCode::UNAUTHORIZED, "Refresh token inválido");
    }
    ok(json!({
        "accessToken": state.issue(900),
        "refreshToken": format!("rt_{n}"),
    }))
}

async fn logout(State(state): State<Arc<MockState>>) -> Reply {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    ok(Value::Null)
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    state.me_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    ok(user_json())
}

async fn validate(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    ok(json!(true))
}

async fn tables(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    ok(json!([{"id": 1, "numero": 4}, {"id": 2, "numero": 7}]))
}

async fn orders(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if !state.authorized(&headers) {
        return fail(StatusCode::FORBIDDEN, "JWT expired");
    }
    ok(json!([]))
}

async fn reports() -> Reply {
    fail(StatusCode::FORBIDDEN, "Permisos insuficientes")
}

async fn always_unauthorized() -> Reply {
    fail(StatusCode::UNAUTHORIZED, "Unauthorized")
}

async fn slow() -> Reply {
    tokio::time::sleep(Duration::from_secs(2)).await;
    ok(Value::Null)
}

async fn broken() -> Reply {
    fail(StatusCode::INTERNAL_SERVER_ERROR, "Error interno")
}

async fn public() -> Reply {
    ok(json!("ok"))
}

async fn echo(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    ok(json!({"body": body, "query": query}))
}

fn products() -> Vec<Value> {
    vec![
        json!({"id": 1, "nombre": "Café", "precio": 2.5}),
        json!({"id": 2, "nombre": "Té verde", "precio": 2.0}),
    ]
}

async fn list_products(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    ok(json!(products()))
}

async fn get_product(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    match products().into_iter().find(|p| p["id"] == id) {
        Some(product) => ok(product),
        None => fail(StatusCode::NOT_FOUND, "Producto no encontrado"),
    }
}

async fn create_product(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    body["id"] = json!(99);
    ok(body)
}

async fn update_product(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(mut body): Json<Value>,
) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    body["id"] = json!(id);
    ok(body)
}

async fn delete_product(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    (
        StatusCode::OK,
        Json(json!({"status": "SUCCESS", "code": 200, "message": "Producto eliminado"})),
    )
}

async fn search_products(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    let found: Vec<Value> = products()
        .into_iter()
        .filter(|p| {
            query.get("nombre").is_none_or(|needle| {
                p["nombre"]
                    .as_str()
                    .is_some_and(|name| name.to_lowercase().contains(&needle.to_lowercase()))
            })
        })
        .collect();
    ok(json!(found))
}

async fn empty_list(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if let Err(reply) = state.guard(&headers) {
        return reply;
    }
    ok(Value::Null)
}
