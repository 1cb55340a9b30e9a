//! Credential storage for the session token and user profile
//!
//! `CredentialStore` is a plain key-value contract: get, set, remove, each
//! atomic per call. Two backends ship here: `FileStore` persists a JSON
//! object to disk with temp-file + rename writes, and `MemoryStore` keeps
//! everything in process (tests, throwaway sessions).
//!
//! The typed helpers at the bottom are the only way the rest of the
//! workspace touches the two well-known keys.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{ACCESS_TOKEN_KEY, USER_PROFILE_KEY};
use crate::error::{Error, Result};
use crate::profile::UserProfile;

/// Boxed future returned by store operations (keeps the trait dyn-compatible).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable key-value persistence for session state.
///
/// Every call is a suspension point; callers must not assume a value read
/// earlier is still current after awaiting anything else.
pub trait CredentialStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

    /// Removing an absent key is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// File-backed store.
///
/// The Mutex serializes writers; reads lock briefly to clone one value.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Load the store from `path`, creating an empty `{}` file on cold start.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded session file");
            entries
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.insert(key.to_string(), value);
            debug!(key, "stored session value");
            write_atomic(&self.path, &state).await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(key).is_some() {
                debug!(key, "removed session value");
                write_atomic(&self.path, &state).await?;
            }
            Ok(())
        })
    }
}

/// In-process store with no persistence.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().await.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().await.remove(key);
            Ok(())
        })
    }
}

/// Write the store to `path` atomically.
///
/// Writes a sibling temp file then renames it over the target, so a crash
/// mid-write leaves the previous contents intact. The file holds a bearer
/// token, so it is created 0600 on unix.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing session file: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        Some(_) => PathBuf::from("."),
        None => return Err(Error::Io("session path has no parent directory".into())),
    };

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::Io(format!("creating session directory: {e}")))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session file");
    Ok(())
}

pub async fn load_token(store: &dyn CredentialStore) -> Result<Option<String>> {
    store.get(ACCESS_TOKEN_KEY).await
}

pub async fn save_token(store: &dyn CredentialStore, token: &str) -> Result<()> {
    store.set(ACCESS_TOKEN_KEY, token.to_string()).await
}

pub async fn remove_token(store: &dyn CredentialStore) -> Result<()> {
    store.remove(ACCESS_TOKEN_KEY).await
}

/// Load the stored profile. A missing key is `None`; a corrupt one is an error.
pub async fn load_user(store: &dyn CredentialStore) -> Result<Option<UserProfile>> {
    match store.get(USER_PROFILE_KEY).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::CredentialParse(format!("parsing stored user profile: {e}"))),
        None => Ok(None),
    }
}

pub async fn save_user(store: &dyn CredentialStore, user: &UserProfile) -> Result<()> {
    let raw = serde_json::to_string(user)
        .map_err(|e| Error::CredentialParse(format!("serializing user profile: {e}")))?;
    store.set(USER_PROFILE_KEY, raw).await
}

pub async fn remove_user(store: &dyn CredentialStore) -> Result<()> {
    store.remove(USER_PROFILE_KEY).await
}
