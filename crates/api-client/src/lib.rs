//! Authenticated HTTP client for the fitness API
//!
//! Wraps `reqwest` with a default bearer token and a session interceptor that
//! renews expired tokens without the caller noticing:
//! 1. A request fails with 401 `token.expired` / `token.invalid`
//! 2. The first such failure starts a refresh; later ones queue behind it
//! 3. The refresh outcome settles every queued request at once
//! 4. Each request is replayed once with the new token, or rejected after
//!    the session is signed out
//!
//! `AuthSession` sits on top and owns the signed-in user.

pub mod auth;
pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod resources;

#[cfg(test)]
mod testing;

pub use auth::{AuthSession, AuthState};
pub use classify::{REFRESHABLE_MESSAGES, SessionFailure, classify_error, classify_failure};
pub use client::{
    ApiClient, ApiRequest, ApiResponse, ClientConfig, InterceptorHandle, RequestBody,
    RequestOptions,
};
pub use coordinator::{Recovery, RefreshCoordinator};
pub use error::{Error, Result};
pub use notifier::{NotifyFuture, SessionCallbacks, SessionNotifier};
pub use resources::{ExerciseDto, HistoryByDay, HistoryEntry, ProfileUpdate};
