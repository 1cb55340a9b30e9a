//! Single-flight session refresh
//!
//! When a request fails with a refreshable 401, the facade asks the
//! coordinator to recover. The first caller starts one refresh; everyone
//! arriving while it runs joins the pending queue. When the refresh ends,
//! the queue is drained exactly once and every waiter gets the same
//! outcome: the new token (replay your request) or the failure.
//!
//! State machine (all transitions under one lock, no await inside):
//! - Idle → InFlight: first refreshable failure, refresh task spawned
//! - InFlight → InFlight: later failures enqueue a waiter
//! - InFlight → Idle: refresh finished, queue drained, flag cleared together
//! - InFlight → Idle: `reset()` cancels the cycle (interceptor unregistered)
//!
//! The refresh runs in its own task so a caller dropping its request cannot
//! leave the queue without a driver. Each cycle carries a number; a task
//! whose cycle was cancelled finds a different number and touches nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use common::Secret;
use session_store::CredentialStore;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::notifier::SessionNotifier;

type Waiter = oneshot::Sender<Result<String>>;

/// Last successful renewal: `from` was exchanged for `to`.
struct Renewal {
    from: String,
    to: Secret<String>,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<Waiter>,
    cycle: u64,
    task: Option<AbortHandle>,
    renewed: Option<Renewal>,
}

/// Result of joining the refresh protocol.
enum Ticket {
    /// Wait for the in-flight refresh
    Wait(oneshot::Receiver<Result<String>>),
    /// A refresh already replaced the caller's token
    Renewed(String),
}

/// What the facade should do with a request that failed with a refreshable 401.
#[derive(Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Re-send the request with this token.
    Replay(String),
    /// No session to recover; sign-out has been requested.
    SignedOut,
}

pub struct RefreshCoordinator {
    http: reqwest::Client,
    base_url: String,
    refresh_timeout: Duration,
    store: Arc<dyn CredentialStore>,
    bearer: RwLock<Option<Secret<String>>>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            refresh_timeout: config.refresh_timeout,
            store,
            bearer: RwLock::new(None),
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// `Authorization` value attached to outgoing requests by default.
    pub fn authorization(&self) -> Option<String> {
        self.bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|token| token.bearer())
    }

    /// Replace (or clear) the default bearer token. Clearing also forgets
    /// the last renewal, so a later session starts from scratch.
    pub fn set_token(&self, token: Option<&str>) {
        *self.bearer.write().unwrap_or_else(PoisonError::into_inner) =
            token.map(|t| Secret::new(t.to_string()));
        if token.is_none() {
            self.lock_state().renewed = None;
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Number of requests waiting on the current refresh.
    pub fn queued(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Recover from a refreshable 401.
    ///
    /// `sent_token` is the bearer the failed request actually carried. If the
    /// store already holds a different token, a refresh landed after that
    /// request went out; it is replayed with the stored token and no new
    /// refresh is dispatched.
    pub async fn recover(
        self: &Arc<Self>,
        sent_token: Option<&str>,
        notifier: Arc<dyn SessionNotifier>,
    ) -> Result<Recovery> {
        let Some(current) = session_store::load_token(self.store.as_ref()).await? else {
            warn!("refreshable 401 with no stored token, signing out");
            metrics::record_sign_out("missing_token");
            notifier.sign_out().await;
            return Ok(Recovery::SignedOut);
        };

        if let Some(sent) = sent_token {
            if sent != current {
                debug!("request carried a superseded token, replaying with stored token");
                self.set_token(Some(&current));
                return Ok(Recovery::Replay(current));
            }
        }

        let outcome = match self.enqueue(current, notifier) {
            Ticket::Renewed(token) => return Ok(Recovery::Replay(token)),
            Ticket::Wait(outcome) => outcome,
        };
        match outcome.await {
            Ok(Ok(token)) => Ok(Recovery::Replay(token)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::RefreshCancelled),
        }
    }

    /// Join the in-flight refresh, or start one. Check-and-set happens under
    /// a single lock acquisition with no suspension point.
    ///
    /// `token` was read from the store before the lock was taken. If a
    /// refresh exchanged it in between, the caller replays with the renewed
    /// token instead of renewing `token` a second time.
    fn enqueue(self: &Arc<Self>, token: String, notifier: Arc<dyn SessionNotifier>) -> Ticket {
        let mut state = self.lock_state();

        if !state.in_flight {
            if let Some(renewed) = state.renewed.as_ref().filter(|r| r.from == token) {
                debug!(
                    cycle = state.cycle,
                    "token already renewed since it was read, replaying"
                );
                return Ticket::Renewed(renewed.to.expose().clone());
            }
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);

        if state.in_flight {
            debug!(
                cycle = state.cycle,
                queued = state.waiters.len(),
                "refresh in flight, request queued"
            );
            return Ticket::Wait(rx);
        }

        state.in_flight = true;
        state.cycle += 1;
        let cycle = state.cycle;
        info!(cycle, "dispatching session refresh");

        let task = tokio::spawn(Arc::clone(self).run_refresh(cycle, token, notifier));
        state.task = Some(task.abort_handle());
        Ticket::Wait(rx)
    }

    async fn run_refresh(
        self: Arc<Self>,
        cycle: u64,
        token: String,
        notifier: Arc<dyn SessionNotifier>,
    ) {
        let outcome = self.renew(&token).await;

        match &outcome {
            Ok(new_token) => {
                notifier.on_token_refreshed(new_token);
                info!(cycle, "session refresh succeeded");
            }
            Err(e) => {
                // Sign out before draining: once the flag clears, the token
                // is already gone and late failures take the missing-token path.
                warn!(cycle, error = %e, "session refresh failed, signing out");
                metrics::record_sign_out("refresh_failed");
                notifier.sign_out().await;
            }
        }

        self.finish(cycle, &token, outcome);
    }

    /// Call the refresh endpoint (bounded by `refresh_timeout`) and persist the result.
    async fn renew(&self, token: &str) -> Result<String> {
        let call = session_store::refresh_session(&self.http, &self.base_url, token);
        let response = match tokio::time::timeout(self.refresh_timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                metrics::record_refresh("failure");
                return Err(Error::RefreshFailed(e.to_string()));
            }
            Err(_) => {
                metrics::record_refresh("timeout");
                return Err(Error::RefreshFailed(format!(
                    "no response within {}ms",
                    self.refresh_timeout.as_millis()
                )));
            }
        };

        // Bearer first: an abort during the save must not leave later
        // requests on the token that was just renewed away.
        self.set_token(Some(&response.token));
        if let Err(e) = session_store::save_token(self.store.as_ref(), &response.token).await {
            metrics::record_refresh("failure");
            return Err(Error::RefreshFailed(format!(
                "persisting renewed token: {e}"
            )));
        }

        metrics::record_refresh("success");
        Ok(response.token)
    }

    /// Drain the queue and clear the flag in one critical section.
    fn finish(&self, cycle: u64, renewed_from: &str, outcome: Result<String>) {
        let mut state = self.lock_state();
        if state.cycle != cycle || !state.in_flight {
            debug!(cycle, "refresh cycle was cancelled, dropping outcome");
            return;
        }

        state.renewed = outcome.as_ref().ok().map(|token| Renewal {
            from: renewed_from.to_string(),
            to: Secret::new(token.clone()),
        });

        let waiters = std::mem::take(&mut state.waiters);
        let drained = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        state.in_flight = false;
        state.task = None;
        debug!(cycle, drained, "refresh queue drained");
    }

    /// Cancel the current cycle, if any: abort the refresh task and reject
    /// every waiter with `RefreshCancelled`.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        let waiters = std::mem::take(&mut state.waiters);
        if state.in_flight {
            info!(
                cycle = state.cycle,
                rejected = waiters.len(),
                "refresh cycle cancelled"
            );
        }
        for waiter in waiters {
            let _ = waiter.send(Err(Error::RefreshCancelled));
        }
        state.in_flight = false;
        state.cycle += 1;
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
