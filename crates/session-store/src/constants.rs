//! Storage keys and session endpoint paths

/// Storage key for the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "@ignitegym:token";

/// Storage key for the serialized user profile.
pub const USER_PROFILE_KEY: &str = "@ignitegym:user";

/// Sign-in endpoint (email + password in, user + token out)
pub const SIGN_IN_PATH: &str = "/sessions";

/// Token renewal endpoint (current token in, new token out)
pub const REFRESH_TOKEN_PATH: &str = "/sessions/refresh-token";
