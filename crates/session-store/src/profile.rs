//! Signed-in user profile

use serde::{Deserialize, Deserializer, Serialize};

/// Profile of the signed-in user as returned by `POST /sessions`.
///
/// Records are never mutated in place; the `with_*` builders return a new
/// record so every holder of an `Arc<UserProfile>` keeps a consistent view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl UserProfile {
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_avatar(&self, avatar: impl Into<String>) -> Self {
        Self {
            avatar: Some(avatar.into()),
            ..self.clone()
        }
    }
}

/// Accept an identifier sent either as a JSON string or a JSON number.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(n) => n.to_string(),
    })
}
