//! In-process stub of the storefront REST backend.
//!
//! Serves the same wire contract the real backend speaks (login, refresh,
//! logout, userinfo, carts, orders) on an ephemeral port, with per-test
//! knobs: call counters, a refresh-failure switch, an artificial refresh
//! delay for overlap tests, and wholesale access-token revocation to force
//! 401s.
//!
//! Panics are acceptable here; this crate only ever runs under the test
//! harness.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing once for the whole test binary.
///
/// Defaults to warn level if RUST_LOG is not set; set
/// `RUST_LOG=clementine_client=debug` to watch the client's request flow
/// while a test runs.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into());
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}

/// Accounts the stub knows. Password is always `secret`.
pub const CUSTOMER_AN: (&str, i64) = ("an@example.com", 7);
pub const CUSTOMER_BINH: (&str, i64) = ("binh@example.com", 8);

#[derive(Clone)]
struct StubCartLine {
    item_id: i64,
    product_id: i64,
    quantity: u32,
}

/// Shared mutable state behind the stub's handlers, exposed to tests.
#[derive(Default)]
pub struct StubState {
    access_tokens: Mutex<HashMap<String, i64>>,
    refresh_tokens: Mutex<HashMap<String, i64>>,
    token_seq: AtomicI64,
    carts: Mutex<HashMap<i64, Vec<StubCartLine>>>,
    item_seq: AtomicI64,

    /// Network-call counters.
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub order_list_calls: AtomicUsize,

    /// When set, the refresh endpoint rejects every request.
    pub fail_refresh: AtomicBool,
    /// Artificial latency on refresh, to make concurrent callers overlap.
    pub refresh_delay: Mutex<Duration>,

    /// Header captures for assertion.
    pub login_saw_auth_header: AtomicBool,
    pub last_accept_language: Mutex<Option<String>>,
    pub idempotency_keys: Mutex<Vec<String>>,
}

impl StubState {
    /// Invalidate every outstanding access token, so the next authenticated
    /// request draws a 401. Refresh tokens stay valid.
    pub fn revoke_access_tokens(&self) {
        self.lock(&self.access_tokens).clear();
    }

    /// Remote quantity of a product in the customer's cart.
    #[must_use]
    pub fn cart_quantity(&self, customer_id: i64, product_id: i64) -> Option<u32> {
        self.lock(&self.carts)
            .get(&customer_id)?
            .iter()
            .find(|line| line.product_id == product_id)
            .map(|line| line.quantity)
    }

    fn issue_tokens(&self, customer_id: i64) -> (String, String) {
        let seq = self.token_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("access-{seq}");
        let refresh = format!("refresh-{seq}");
        self.lock(&self.access_tokens)
            .insert(access.clone(), customer_id);
        self.lock(&self.refresh_tokens)
            .insert(refresh.clone(), customer_id);
        (access, refresh)
    }

    fn authenticate(&self, headers: &HeaderMap) -> Option<i64> {
        let bearer = headers
            .get("authorization")?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?
            .to_owned();
        self.lock(&self.access_tokens).get(&bearer).copied()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().expect("stub state lock poisoned")
    }
}

/// The running stub server.
pub struct StubBackend {
    pub state: Arc<StubState>,
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl StubBackend {
    /// Bind an ephemeral port and start serving.
    pub async fn spawn() -> Self {
        init_tracing();
        let state = Arc::new(StubState::default());

        let router = Router::new()
            .route("/customers/login", post(login))
            .route("/customers/refresh", post(refresh))
            .route("/customers/logout", post(logout))
            .route("/customers/userinfo", get(userinfo))
            .route("/carts", get(get_cart).post(add_to_cart))
            .route("/carts/clear", post(clear_cart))
            .route(
                "/carts/{item_id}",
                axum::routing::patch(update_cart_item).delete(remove_cart_item),
            )
            .route("/orders", get(list_orders).post(create_order))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind stub backend");
        let addr = listener.local_addr().expect("stub backend has no address");

        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("stub backend stopped unexpectedly");
        });

        Self {
            state,
            addr,
            server,
        }
    }

    /// Base URL for a client configuration.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
}

fn customer_json(customer_id: i64, email: &str) -> Value {
    json!({
        "id": customer_id,
        "email": email,
        "first_name": "Test",
        "last_name": "Customer",
        "customer_type": "regular",
        "permissions": ["view_profile", "view_orders", "create_order", "cancel_order"],
        "is_vip": false,
    })
}

fn customer_for(username: &str) -> Option<i64> {
    match username {
        _ if username == CUSTOMER_AN.0 => Some(CUSTOMER_AN.1),
        _ if username == CUSTOMER_BINH.0 => Some(CUSTOMER_BINH.1),
        _ => None,
    }
}

async fn login(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key("authorization") {
        state.login_saw_auth_header.store(true, Ordering::SeqCst);
    }

    let username = body.get("username").and_then(Value::as_str).unwrap_or("");
    let password = body.get("password").and_then(Value::as_str).unwrap_or("");

    let Some(customer_id) = customer_for(username).filter(|_| password == "secret") else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email or password.");
    };

    let (access, refresh) = state.issue_tokens(customer_id);
    axum::Json(json!({
        "message": "Login successful!",
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "Bearer",
        "expires_in": 3600,
        "customer": customer_json(customer_id, username),
    }))
    .into_response()
}

async fn refresh(
    State(state): State<Arc<StubState>>,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = *state.lock(&state.refresh_delay);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state.fail_refresh.load(Ordering::SeqCst) {
        return error_response(StatusCode::NOT_ACCEPTABLE, "Invalid token");
    }

    let token = body
        .get("refresh_token")
        .and_then(Value::as_str)
        .unwrap_or("");
    let Some(customer_id) = state.lock(&state.refresh_tokens).get(token).copied() else {
        return error_response(StatusCode::NOT_ACCEPTABLE, "Invalid token");
    };

    let (access, refresh) = state.issue_tokens(customer_id);
    axum::Json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600,
    }))
    .into_response()
}

async fn logout(State(_state): State<Arc<StubState>>) -> Response {
    axum::Json(json!({ "message": "Logged out" })).into_response()
}

async fn userinfo(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };
    let email = if customer_id == CUSTOMER_BINH.1 {
        CUSTOMER_BINH.0
    } else {
        CUSTOMER_AN.0
    };
    axum::Json(json!({ "customer": customer_json(customer_id, email) })).into_response()
}

fn cart_item_json(line: &StubCartLine) -> Value {
    json!({
        "id": line.item_id,
        "product": {
            "id": line.product_id,
            "name": format!("Product {}", line.product_id),
            "price": "10",
            "sale_price": null,
            "image": null,
        },
        "quantity": line.quantity,
    })
}

async fn get_cart(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };

    *state.lock(&state.last_accept_language) = headers
        .get("accept-language")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let carts = state.lock(&state.carts);
    let items: Vec<Value> = carts
        .get(&customer_id)
        .map(|lines| lines.iter().map(cart_item_json).collect())
        .unwrap_or_default();
    axum::Json(json!({ "items": items })).into_response()
}

async fn add_to_cart(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };

    let product_id = body.get("product_id").and_then(Value::as_i64).unwrap_or(0);
    let quantity = body.get("quantity").and_then(Value::as_u64).unwrap_or(0);
    let line = StubCartLine {
        item_id: state.item_seq.fetch_add(1, Ordering::SeqCst) + 1,
        product_id,
        quantity: u32::try_from(quantity).unwrap_or(u32::MAX),
    };

    let response = cart_item_json(&line);
    state
        .lock(&state.carts)
        .entry(customer_id)
        .or_default()
        .push(line);
    axum::Json(response).into_response()
}

async fn update_cart_item(
    State(state): State<Arc<StubState>>,
    Path(item_id): Path<i64>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };

    let quantity = body.get("quantity").and_then(Value::as_u64).unwrap_or(0);
    let mut carts = state.lock(&state.carts);
    let Some(line) = carts
        .entry(customer_id)
        .or_default()
        .iter_mut()
        .find(|line| line.item_id == item_id)
    else {
        return error_response(StatusCode::NOT_FOUND, "Cart item not found");
    };
    line.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
    axum::Json(cart_item_json(line)).into_response()
}

async fn remove_cart_item(
    State(state): State<Arc<StubState>>,
    Path(item_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };
    state
        .lock(&state.carts)
        .entry(customer_id)
        .or_default()
        .retain(|line| line.item_id != item_id);
    StatusCode::NO_CONTENT.into_response()
}

async fn clear_cart(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };
    state.lock(&state.carts).remove(&customer_id);
    axum::Json(json!({ "message": "Cart cleared" })).into_response()
}

fn order_json(customer_id: i64) -> Value {
    json!({
        "id": customer_id * 100,
        "order_status": 0,
        "payment_method": 0,
        "payment_status": 0,
        "total_amount": "150",
    })
}

async fn list_orders(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };
    state.order_list_calls.fetch_add(1, Ordering::SeqCst);
    axum::Json(json!([order_json(customer_id)])).into_response()
}

async fn create_order(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    axum::Json(_body): axum::Json<Value>,
) -> Response {
    let Some(customer_id) = state.authenticate(&headers) else {
        return unauthorized();
    };

    let Some(key) = headers
        .get("idempotency-key")
        .and_then(|value| value.to_str().ok())
    else {
        return error_response(StatusCode::BAD_REQUEST, "Idempotency-Key header required");
    };
    state.lock(&state.idempotency_keys).push(key.to_owned());

    axum::Json(order_json(customer_id)).into_response()
}
