use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PartyError;

/// A user profile as the social backend exposes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A notification to persist on the social backend.
#[derive(Debug, Serialize)]
pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub data: Value,
}

/// Abstraction over the externally owned friend graph, user directory, and
/// notification log.
///
/// Backed by the social backend's REST API in production and an in-memory
/// map in tests.
#[async_trait]
pub trait SocialStore: Send + Sync {
    /// User IDs on the other end of the caller's friend edges.
    async fn friends_of(&self, user_id: &str) -> Result<Vec<String>, PartyError>;
    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, PartyError>;
    async fn create_notification(&self, notification: NewNotification<'_>)
        -> Result<(), PartyError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpSocialStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSocialStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SocialStore for HttpSocialStore {
    async fn friends_of(&self, user_id: &str) -> Result<Vec<String>, PartyError> {
        let url = format!("{}/api/users/{}/friends", self.base_url, user_id);
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, PartyError> {
        let url = format!("{}/api/users/{}", self.base_url, user_id);
        let resp = self.client.get(url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }

    async fn create_notification(
        &self,
        notification: NewNotification<'_>,
    ) -> Result<(), PartyError> {
        let url = format!("{}/api/notifications", self.base_url);
        self.client
            .post(url)
            .json(&notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and local development)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserProfile>,
    friendships: HashSet<(String, String)>,
    notifications: Vec<(String, String)>,
}

#[derive(Default)]
pub struct MemorySocialStore {
    state: Mutex<MemoryState>,
}

impl MemorySocialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, profile: UserProfile) {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(profile.id.clone(), profile);
    }

    /// Friendships are bidirectional; one call wires both directions.
    pub fn add_friendship(&self, a: &str, b: &str) {
        let mut state = self.state.lock().unwrap();
        state.friendships.insert((a.to_string(), b.to_string()));
        state.friendships.insert((b.to_string(), a.to_string()));
    }

    /// Notifications recorded so far, as `(user_id, kind)` pairs.
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().notifications.clone()
    }
}

#[async_trait]
impl SocialStore for MemorySocialStore {
    async fn friends_of(&self, user_id: &str) -> Result<Vec<String>, PartyError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .friendships
            .iter()
            .filter(|(a, _)| a == user_id)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>, PartyError> {
        Ok(self.state.lock().unwrap().users.get(user_id).cloned())
    }

    async fn create_notification(
        &self,
        notification: NewNotification<'_>,
    ) -> Result<(), PartyError> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .push((notification.user_id.to_string(), notification.kind.to_string()));
        Ok(())
    }
}
