//! Typed fitness API endpoints
//!
//! Thin wrappers over the facade verbs. Every call below goes through the
//! session interceptor like any other request.

use serde::{Deserialize, Serialize};
use serde_json::json;
use session_store::profile::string_or_number;

use crate::client::ApiClient;
use crate::error::Result;

pub const USERS_PATH: &str = "/users";
pub const GROUPS_PATH: &str = "/groups";
pub const HISTORY_PATH: &str = "/history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseDto {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub group: String,
    pub repetitions: u32,
    pub series: u32,
    /// Demo animation file name, see [`ApiClient::demo_url`]
    pub demo: String,
    pub thumb: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub group: String,
    pub hour: String,
    pub created_at: String,
}

/// One day of workout history; `title` is the server-formatted date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryByDay {
    pub title: String,
    pub data: Vec<HistoryEntry>,
}

/// Fields accepted by `PUT /users`. Omitted passwords leave the password unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
}

impl ApiClient {
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let body = json!({ "name": name, "email": email, "password": password });
        self.post(USERS_PATH, Some(body), None).await?;
        Ok(())
    }

    pub async fn groups(&self) -> Result<Vec<String>> {
        self.get(GROUPS_PATH, None).await?.json()
    }

    pub async fn exercises_by_group(&self, group: &str) -> Result<Vec<ExerciseDto>> {
        let path = format!("/exercises/bygroup/{}", urlencoding::encode(group));
        self.get(&path, None).await?.json()
    }

    pub async fn exercise(&self, id: &str) -> Result<ExerciseDto> {
        let path = format!("/exercises/{}", urlencoding::encode(id));
        self.get(&path, None).await?.json()
    }

    /// Record `exercise_id` as done now.
    pub async fn mark_done(&self, exercise_id: &str) -> Result<()> {
        let body = json!({ "exercise_id": exercise_id });
        self.post(HISTORY_PATH, Some(body), None).await?;
        Ok(())
    }

    pub async fn history(&self) -> Result<Vec<HistoryByDay>> {
        self.get(HISTORY_PATH, None).await?.json()
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<()> {
        let body = serde_json::to_value(update)
            .map_err(|e| crate::Error::InvalidRequest(e.to_string()))?;
        self.put(USERS_PATH, Some(body), None).await?;
        Ok(())
    }

    /// Public URL of an exercise demo animation.
    pub fn demo_url(&self, file: &str) -> String {
        format!("{}/exercise/demo/{file}", self.base_url())
    }

    /// Public URL of an exercise thumbnail.
    pub fn thumb_url(&self, file: &str) -> String {
        format!("{}/exercise/thumb/{file}", self.base_url())
    }

    /// Public URL of a user avatar.
    pub fn avatar_url(&self, file: &str) -> String {
        format!("{}/avatar/{file}", self.base_url())
    }
}
