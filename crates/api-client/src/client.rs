//! Authenticated HTTP client facade
//!
//! Every call goes out with the default `Authorization` header (unless the
//! caller overrides it) and every failure passes through the session
//! interceptor before it reaches the caller:
//! - refreshable 401 → coordinator renews the token, the request is replayed once
//! - other 401 → sign-out, then the classified error
//! - anything else → classified error (`Domain` or `Status`)
//!
//! Only one interceptor registration exists at a time. Registering again
//! replaces the previous one, so a single failure can never drive two
//! refresh attempts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use session_store::CredentialStore;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::classify::{SessionFailure, classify_error, classify_failure};
use crate::coordinator::{Recovery, RefreshCoordinator};
use crate::error::{Error, Result};
use crate::metrics;
use crate::notifier::SessionNotifier;

/// Connection settings for the fitness API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Upper bound on a single refresh call
    pub refresh_timeout: Duration,
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers; an explicit `Authorization` replaces the default bearer.
    pub headers: HeaderMap,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<RequestBody>,
    pub options: RequestOptions,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A non-2xx response, before interception.
struct Failure {
    status: u16,
    body: Vec<u8>,
    sent_token: Option<String>,
}

enum Attempt {
    Success(ApiResponse),
    Failed(Failure),
}

#[derive(Clone)]
struct Registration {
    id: u64,
    notifier: Arc<dyn SessionNotifier>,
}

struct Inner {
    base_url: String,
    timeout: Duration,
    default_headers: HeaderMap,
    coordinator: Arc<RefreshCoordinator>,
    registration: RwLock<Option<Registration>>,
    next_registration: AtomicU64,
}

/// HTTP client for the fitness API. Cheap to clone; clones share the
/// coordinator and the interceptor registration.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// Build a facade around an explicitly constructed coordinator.
    pub fn new(config: &ClientConfig, coordinator: Arc<RefreshCoordinator>) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            inner: Arc::new(Inner {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                timeout: config.timeout,
                default_headers,
                coordinator,
                registration: RwLock::new(None),
                next_registration: AtomicU64::new(0),
            }),
        }
    }

    /// Build the coordinator and facade together over one connection pool.
    pub fn connect(config: &ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        let coordinator = RefreshCoordinator::new(reqwest::Client::new(), config, store);
        Self::new(config, Arc::new(coordinator))
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.inner.coordinator
    }

    /// Replace (or clear) the default bearer token.
    pub fn set_token(&self, token: Option<&str>) {
        self.inner.coordinator.set_token(token);
    }

    pub async fn get(&self, path: &str, options: Option<RequestOptions>) -> Result<ApiResponse> {
        self.send(build(Method::GET, path, None, options)).await
    }

    pub async fn delete(&self, path: &str, options: Option<RequestOptions>) -> Result<ApiResponse> {
        self.send(build(Method::DELETE, path, None, options)).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse> {
        self.send(build(Method::POST, path, body, options)).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse> {
        self.send(build(Method::PUT, path, body, options)).await
    }

    pub async fn patch(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: Option<RequestOptions>,
    ) -> Result<ApiResponse> {
        self.send(build(Method::PATCH, path, body, options)).await
    }

    /// Send a request through the session interceptor.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let span = info_span!(
            "api_request",
            request_id = %uuid::Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );
        async move {
            match self.dispatch(&request, None).await? {
                Attempt::Success(response) => Ok(response),
                Attempt::Failed(failure) => self.intercept(&request, failure).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Install the session interceptor.
    ///
    /// Replaces any previous registration; the returned handle removes this
    /// registration (and only this one) when unregistered or dropped.
    pub fn register_intercept_token_manager(
        &self,
        notifier: Arc<dyn SessionNotifier>,
    ) -> InterceptorHandle {
        let id = self.inner.next_registration.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self
            .inner
            .registration
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Registration { id, notifier });
        if let Some(previous) = previous {
            debug!(replaced = previous.id, "replacing interceptor registration");
        }
        info!(registration = id, "session interceptor registered");

        InterceptorHandle {
            id,
            client: Arc::downgrade(&self.inner),
        }
    }

    pub fn has_interceptor(&self) -> bool {
        self.registration().is_some()
    }

    fn registration(&self) -> Option<Registration> {
        self.inner
            .registration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send once, without interception. `bearer` forces the Authorization header.
    async fn dispatch(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<Attempt> {
        let mut headers = self.inner.default_headers.clone();
        if let Some(authorization) = self.inner.coordinator.authorization() {
            headers.insert(AUTHORIZATION, header_value(&authorization)?);
        }
        if let Some(content_type) = &request.options.content_type {
            headers.insert(CONTENT_TYPE, header_value(content_type)?);
        }
        for (name, value) in &request.options.headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(token) = bearer {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        let sent_token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_owned);

        let url = format!("{}{}", self.inner.base_url, request.path);
        let mut builder = self
            .inner
            .coordinator
            .http_client()
            .request(request.method.clone(), url)
            .headers(headers)
            .timeout(self.inner.timeout);
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.body(
                serde_json::to_vec(value).map_err(|e| Error::InvalidRequest(e.to_string()))?,
            ),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            metrics::record_request(request.method.as_str(), 0);
            warn!(error = %e, "request failed before a response arrived");
            Error::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?
            .to_vec();
        metrics::record_request(request.method.as_str(), status);

        if (200..300).contains(&status) {
            return Ok(Attempt::Success(ApiResponse {
                status,
                headers: response_headers,
                body,
            }));
        }

        debug!(status, "request failed");
        Ok(Attempt::Failed(Failure {
            status,
            body,
            sent_token,
        }))
    }

    async fn intercept(&self, request: &ApiRequest, failure: Failure) -> Result<ApiResponse> {
        let Some(registration) = self.registration() else {
            return Err(classify_error(failure.status, &failure.body));
        };

        match classify_failure(failure.status, &failure.body) {
            SessionFailure::Refreshable => {
                let recovery = self
                    .inner
                    .coordinator
                    .recover(failure.sent_token.as_deref(), registration.notifier)
                    .await?;
                if let Recovery::Replay(token) = recovery {
                    debug!("replaying request with renewed token");
                    return match self.dispatch(request, Some(&token)).await? {
                        Attempt::Success(response) => Ok(response),
                        Attempt::Failed(replayed) => {
                            Err(classify_error(replayed.status, &replayed.body))
                        }
                    };
                }
            }
            SessionFailure::Invalid => {
                warn!(status = failure.status, "session rejected by server, signing out");
                metrics::record_sign_out("session_invalid");
                registration.notifier.sign_out().await;
            }
            SessionFailure::None => {}
        }

        Err(classify_error(failure.status, &failure.body))
    }
}

/// Removes an interceptor registration. Idempotent; also runs on drop.
pub struct InterceptorHandle {
    id: u64,
    client: Weak<Inner>,
}

impl InterceptorHandle {
    pub fn unregister(&self) {
        let Some(inner) = self.client.upgrade() else {
            return;
        };

        let removed = {
            let mut slot = inner
                .registration
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|r| r.id == self.id) {
                slot.take()
            } else {
                None
            }
        };

        if removed.is_some() {
            inner.coordinator.reset();
            info!(registration = self.id, "session interceptor unregistered");
        }
    }
}

impl Drop for InterceptorHandle {
    fn drop(&mut self) {
        self.unregister();
    }
}

fn build(
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
    options: Option<RequestOptions>,
) -> ApiRequest {
    ApiRequest {
        method,
        path: path.to_string(),
        body: body.map(RequestBody::Json),
        options: options.unwrap_or_default(),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::InvalidRequest(format!("invalid header value: {e}")))
}
