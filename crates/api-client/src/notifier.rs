//! Session notifier contract
//!
//! The authentication layer hands the interceptor a notifier when it
//! registers. The coordinator calls it on terminal outcomes only: a renewed
//! token, or a session that cannot be recovered.

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by `sign_out` (keeps the trait dyn-compatible).
pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Callbacks the interceptor uses to reach the authentication layer.
pub trait SessionNotifier: Send + Sync {
    /// Return the app to a signed-out state. Must be idempotent; it may run
    /// while the app is already signed out.
    fn sign_out(&self) -> NotifyFuture<'_>;

    /// A refresh produced `token`. Fire-and-forget; must not panic.
    fn on_token_refreshed(&self, token: &str);
}

/// Notifier built from a pair of closures.
pub struct SessionCallbacks<S, R> {
    sign_out: S,
    on_token_refreshed: R,
}

impl<S, R> SessionCallbacks<S, R>
where
    S: Fn() + Send + Sync,
    R: Fn(&str) + Send + Sync,
{
    pub fn new(sign_out: S, on_token_refreshed: R) -> Self {
        Self {
            sign_out,
            on_token_refreshed,
        }
    }
}

impl<S, R> SessionNotifier for SessionCallbacks<S, R>
where
    S: Fn() + Send + Sync,
    R: Fn(&str) + Send + Sync,
{
    fn sign_out(&self) -> NotifyFuture<'_> {
        (self.sign_out)();
        Box::pin(async {})
    }

    fn on_token_refreshed(&self, token: &str) {
        (self.on_token_refreshed)(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn callbacks_forward_to_closures() {
        let sign_outs = Arc::new(AtomicUsize::new(0));
        let tokens = Arc::new(Mutex::new(Vec::new()));

        let notifier = SessionCallbacks::new(
            {
                let sign_outs = sign_outs.clone();
                move || {
                    sign_outs.fetch_add(1, Ordering::SeqCst);
                }
            },
            {
                let tokens = tokens.clone();
                move |token: &str| tokens.lock().unwrap().push(token.to_string())
            },
        );

        let notifier: Arc<dyn SessionNotifier> = Arc::new(notifier);
        notifier.sign_out().await;
        notifier.sign_out().await;
        notifier.on_token_refreshed("T2");

        assert_eq!(sign_outs.load(Ordering::SeqCst), 2);
        assert_eq!(*tokens.lock().unwrap(), vec!["T2".to_string()]);
    }
}
