//! Mock fitness backend and recording notifier for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use session_store::{CredentialStore, MemoryStore};
use tokio::net::TcpListener;

use crate::client::{ApiClient, ClientConfig};
use crate::coordinator::RefreshCoordinator;
use crate::notifier::{NotifyFuture, SessionNotifier};

/// How the mock answers `POST /sessions/refresh-token`.
#[derive(Clone)]
pub enum RefreshReply {
    /// Issue this token and start accepting it
    Issue(String),
    /// Issue this token but keep rejecting it
    IssueUnaccepted(String),
    /// 401 `token.invalid`
    Reject,
    /// Never answer
    Hang,
}

pub struct BackendState {
    accepted: Mutex<String>,
    reply: Mutex<RefreshReply>,
    /// Hold the refresh answer until this many 401s have been served.
    hold_until_rejections: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub rejections: AtomicUsize,
    /// Authorization header of every request that reached a protected route.
    pub auth_log: Mutex<Vec<Option<String>>>,
}

impl BackendState {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_reply(&self, reply: RefreshReply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn hold_refresh_until(&self, rejections: usize) {
        self.hold_until_rejections.store(rejections, Ordering::SeqCst);
    }

    /// Token the protected routes accept from now on.
    pub fn accept(&self, token: &str) {
        *self.accepted.lock().unwrap() = token.to_string();
    }

    pub fn successful_auth(&self) -> Vec<String> {
        let accepted = format!("Bearer {}", self.accepted.lock().unwrap());
        self.auth_log
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter(|auth| **auth == accepted)
            .cloned()
            .collect()
    }
}

pub struct MockBackend {
    pub url: String,
    pub state: Arc<BackendState>,
}

/// Start a backend that accepts `Bearer {accepted}` on its protected routes.
pub async fn start_backend(accepted: &str) -> MockBackend {
    let state = Arc::new(BackendState {
        accepted: Mutex::new(accepted.to_string()),
        reply: Mutex::new(RefreshReply::Issue("T2".into())),
        hold_until_rejections: AtomicUsize::new(0),
        refresh_calls: AtomicUsize::new(0),
        rejections: AtomicUsize::new(0),
        auth_log: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/sessions/refresh-token", post(refresh_handler))
        .route("/sessions", post(sign_in_handler))
        .route("/protected/{n}", get(protected_handler))
        .route("/groups", get(groups_handler))
        .route("/exercises/bygroup/{group}", get(exercises_by_group_handler))
        .route("/exercises/{id}", get(exercise_handler))
        .route("/history", get(history_handler).post(mark_done_handler))
        .route("/users", post(sign_up_handler).put(update_profile_handler))
        .route("/disabled", get(disabled_handler))
        .route("/bad-request", get(bad_request_handler))
        .route("/broken", get(broken_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend { url, state }
}

/// Client wired to `backend` with `token` stored and set as the default bearer.
pub async fn client_for(
    backend: &MockBackend,
    token: Option<&str>,
) -> (ApiClient, Arc<dyn CredentialStore>) {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    if let Some(token) = token {
        session_store::save_token(store.as_ref(), token).await.unwrap();
    }
    let config = ClientConfig {
        base_url: backend.url.clone(),
        timeout: Duration::from_secs(5),
        refresh_timeout: Duration::from_secs(2),
    };
    let coordinator = Arc::new(RefreshCoordinator::new(
        reqwest::Client::new(),
        &config,
        store.clone(),
    ));
    coordinator.set_token(token);
    (ApiClient::new(&config, coordinator), store)
}

/// Notifier that counts calls and clears the stored token on sign-out.
pub struct RecordingNotifier {
    store: Arc<dyn CredentialStore>,
    pub sign_outs: AtomicUsize,
    pub refreshed: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            sign_outs: AtomicUsize::new(0),
            refreshed: Mutex::new(Vec::new()),
        })
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn refreshed(&self) -> Vec<String> {
        self.refreshed.lock().unwrap().clone()
    }
}

impl SessionNotifier for RecordingNotifier {
    fn sign_out(&self) -> NotifyFuture<'_> {
        Box::pin(async move {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            session_store::remove_token(self.store.as_ref()).await.unwrap();
        })
    }

    fn on_token_refreshed(&self, token: &str) {
        self.refreshed.lock().unwrap().push(token.to_string());
    }
}

fn authorize(state: &BackendState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.auth_log.lock().unwrap().push(auth.clone());

    let expected = format!("Bearer {}", state.accepted.lock().unwrap());
    if auth.as_deref() == Some(expected.as_str()) {
        Ok(())
    } else {
        state.rejections.fetch_add(1, Ordering::SeqCst);
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "error", "message": "token.expired"})),
        ))
    }
}

async fn refresh_handler(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let hold = state.hold_until_rejections.load(Ordering::SeqCst);
    if hold > 0 {
        for _ in 0..400 {
            if state.rejections.load(Ordering::SeqCst) >= hold {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Let the client finish queueing the 401s it has already received.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let reply = state.reply.lock().unwrap().clone();
    match reply {
        RefreshReply::Issue(token) if body["token"].is_string() => {
            state.accept(&token);
            (StatusCode::OK, Json(json!({ "token": token })))
        }
        RefreshReply::IssueUnaccepted(token) => (StatusCode::OK, Json(json!({ "token": token }))),
        RefreshReply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            (StatusCode::GATEWAY_TIMEOUT, Json(json!({})))
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "error", "message": "token.invalid"})),
        ),
    }
}

async fn sign_in_handler(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["password"] != "123456" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "error", "message": "E-mail e/ou senha incorreta."})),
        );
    }
    let token = state.accepted.lock().unwrap().clone();
    (
        StatusCode::OK,
        Json(json!({
            "user": {"id": "u-1", "name": "Rildo", "email": body["email"], "avatar": "u-1.png"},
            "token": token,
        })),
    )
}

async fn protected_handler(
    State(state): State<Arc<BackendState>>,
    Path(n): Path<u32>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
    Ok(Json(json!({ "n": n, "authorization": auth })))
}

async fn groups_handler(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    Ok(Json(json!(["antebraço", "bíceps", "costas"])))
}

async fn exercises_by_group_handler(
    State(state): State<Arc<BackendState>>,
    Path(group): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    Ok(Json(json!([{
        "id": "7", "name": "Rosca direta", "group": group, "repetitions": 12, "series": 3,
        "demo": "rosca_direta.gif", "thumb": "rosca_direta.png", "updated_at": "2023-01-10 12:00:00"
    }])))
}

async fn exercise_handler(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    if id != "7" {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "Exercício não encontrado."})),
        ));
    }
    Ok(Json(json!({
        "id": 7, "name": "Rosca direta", "group": "bíceps", "repetitions": 12, "series": 3,
        "demo": "rosca_direta.gif", "thumb": "rosca_direta.png", "updated_at": "2023-01-10 12:00:00"
    })))
}

async fn history_handler(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    Ok(Json(json!([{
        "title": "10.01.23",
        "data": [{"id": 1, "name": "Rosca direta", "group": "bíceps", "hour": "08:15", "created_at": "2023-01-10 08:15:00"}]
    }])))
}

async fn mark_done_handler(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    if body["exercise_id"].is_null() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "Informe o exercício."})),
        ));
    }
    Ok(StatusCode::CREATED)
}

async fn sign_up_handler(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"] == "taken@example.com" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "Este e-mail já está em uso."})),
        );
    }
    (StatusCode::CREATED, Json(json!({})))
}

async fn update_profile_handler(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    if body["password"].is_string() && body["old_password"] != "123456" {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "A senha antiga não confere."})),
        ));
    }
    Ok(Json(json!({})))
}

async fn disabled_handler() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"status": "error", "message": "Usuário desativado."})),
    )
}

async fn bad_request_handler() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"status": "error", "message": "Informe o nome."})),
    )
}

async fn broken_handler() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream unavailable")
}
