//! Authentication session
//!
//! Owns the signed-in user and publishes it to the app shell through a
//! `watch` channel. It is also the notifier the interceptor calls: a forced
//! sign-out lands here and becomes a visible `SignedOut` state.

use std::sync::{Arc, PoisonError, RwLock};

use common::Secret;
use session_store::{CredentialStore, UserProfile};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::{ApiClient, InterceptorHandle};
use crate::error::Result;
use crate::notifier::{NotifyFuture, SessionNotifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Stored session not read yet
    Loading,
    SignedOut,
    SignedIn(Arc<UserProfile>),
}

pub struct AuthSession {
    client: ApiClient,
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<AuthState>,
    refreshed_token: RwLock<Option<Secret<String>>>,
}

impl AuthSession {
    pub fn new(client: ApiClient) -> Arc<Self> {
        let store = client.coordinator().store().clone();
        let (state, _) = watch::channel(AuthState::Loading);
        Arc::new(Self {
            client,
            store,
            state,
            refreshed_token: RwLock::new(None),
        })
    }

    /// Register this session as the interceptor's notifier.
    pub fn attach(self: &Arc<Self>) -> InterceptorHandle {
        self.client
            .register_intercept_token_manager(Arc::clone(self) as Arc<dyn SessionNotifier>)
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<Arc<UserProfile>> {
        match &*self.state.borrow() {
            AuthState::SignedIn(user) => Some(user.clone()),
            _ => None,
        }
    }

    /// Last token delivered by a refresh, if any.
    pub fn refreshed_token(&self) -> Option<String> {
        self.refreshed_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|token| token.expose().clone())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<UserProfile>> {
        let response = session_store::sign_in(
            self.client.coordinator().http_client(),
            self.client.base_url(),
            email,
            password,
        )
        .await?;

        session_store::save_user(self.store.as_ref(), &response.user).await?;
        session_store::save_token(self.store.as_ref(), &response.token).await?;
        self.client.set_token(Some(&response.token));

        let user = Arc::new(response.user);
        info!(user_id = %user.id, "signed in");
        self.state.send_replace(AuthState::SignedIn(user.clone()));
        Ok(user)
    }

    /// Drop the session locally. Safe to call when already signed out.
    pub async fn sign_out(&self) -> Result<()> {
        self.state.send_replace(AuthState::SignedOut);
        self.client.set_token(None);
        session_store::remove_user(self.store.as_ref()).await?;
        session_store::remove_token(self.store.as_ref()).await?;
        info!("signed out");
        Ok(())
    }

    /// Restore a stored session at startup. Both a profile and a token are
    /// required; either one alone is treated as signed out.
    pub async fn load_user_data(&self) -> Result<Option<Arc<UserProfile>>> {
        let loaded = async {
            let user = session_store::load_user(self.store.as_ref()).await?;
            let token = session_store::load_token(self.store.as_ref()).await?;
            Ok::<_, crate::Error>((user, token))
        }
        .await;

        let (user, token) = match loaded {
            Ok(pair) => pair,
            Err(e) => {
                self.state.send_replace(AuthState::SignedOut);
                return Err(e);
            }
        };

        match (user, token) {
            (Some(user), Some(token)) if !user.id.is_empty() => {
                self.client.set_token(Some(&token));
                let user = Arc::new(user);
                info!(user_id = %user.id, "restored stored session");
                self.state.send_replace(AuthState::SignedIn(user.clone()));
                Ok(Some(user))
            }
            _ => {
                self.state.send_replace(AuthState::SignedOut);
                Ok(None)
            }
        }
    }

    /// Replace the signed-in profile with `updated` and persist it.
    pub async fn update_user_profile(&self, updated: UserProfile) -> Result<Arc<UserProfile>> {
        let user = Arc::new(updated);
        self.state.send_replace(AuthState::SignedIn(user.clone()));
        session_store::save_user(self.store.as_ref(), &user).await?;
        Ok(user)
    }
}

impl SessionNotifier for AuthSession {
    fn sign_out(&self) -> NotifyFuture<'_> {
        Box::pin(async move {
            if let Err(e) = AuthSession::sign_out(self).await {
                warn!(error = %e, "failed to clear stored session during forced sign-out");
            }
        })
    }

    fn on_token_refreshed(&self, token: &str) {
        *self
            .refreshed_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Secret::new(token.to_string()));
    }
}
