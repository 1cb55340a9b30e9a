//! Session persistence and session endpoints for the fitness API
//!
//! Holds the two pieces of durable session state (bearer token and user
//! profile) behind the `CredentialStore` contract, and the two HTTP calls
//! that create or renew a session. The interceptor that decides *when* to
//! renew lives in `api-client`; this crate only knows *how*.
//!
//! Session flow:
//! 1. `session::sign_in()` posts credentials to `/sessions`
//! 2. Token and profile saved via `save_token()` / `save_user()`
//! 3. On an expired-token 401, `session::refresh_session()` posts the
//!    current token to `/sessions/refresh-token`
//! 4. The renewed token replaces the old one via `save_token()`
//! 5. Sign-out removes both keys

pub mod constants;
pub mod error;
pub mod profile;
pub mod session;
pub mod store;

pub use constants::*;
pub use error::{Error, Result};
pub use profile::UserProfile;
pub use session::{RefreshResponse, SignInResponse, refresh_session, sign_in};
pub use store::{
    CredentialStore, FileStore, MemoryStore, load_token, load_user, remove_token, remove_user,
    save_token, save_user,
};
