//! Session endpoints: sign-in and token renewal
//!
//! Both calls go out on the raw `reqwest::Client`, never through the
//! authenticated facade. A renewal that itself fails with 401 must surface
//! as a plain failure; routing it through the interceptor would queue it
//! behind the very refresh it belongs to.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{REFRESH_TOKEN_PATH, SIGN_IN_PATH};
use crate::error::{Error, Result};
use crate::profile::UserProfile;

/// Body of a successful `POST /sessions`.
#[derive(Debug, Deserialize, Serialize)]
pub struct SignInResponse {
    pub user: UserProfile,
    pub token: String,
}

/// Body of a successful `POST /sessions/refresh-token`.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshResponse {
    pub token: String,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    token: &'a str,
}

/// Exchange email and password for a user profile and bearer token.
pub async fn sign_in(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &str,
) -> Result<SignInResponse> {
    let response = client
        .post(endpoint(base_url, SIGN_IN_PATH))
        .json(&SignInRequest { email, password })
        .send()
        .await
        .map_err(|e| Error::Http(format!("sign-in request failed: {e}")))?;

    parse_success(response, "sign-in").await
}

/// Trade the current bearer token for a new one.
pub async fn refresh_session(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
) -> Result<RefreshResponse> {
    debug!("requesting session token refresh");
    let response = client
        .post(endpoint(base_url, REFRESH_TOKEN_PATH))
        .json(&RefreshRequest { token })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    parse_success(response, "token refresh").await
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

async fn parse_success<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: server_message(&body).unwrap_or(body),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("{what}: {e}")))
}

/// Pull `message` out of a `{"message": "..."}` error body.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_owned)
}
