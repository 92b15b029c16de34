//! "Now watching" records, one per user, shown to online friends.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::rooms::room::ContentKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchActivity {
    pub room_code: String,
    pub content_type: ContentKind,
    pub content_id: String,
    pub content_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_poster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// At most one activity per user; starting a new one overwrites, never
/// stacks.
#[derive(Default)]
pub struct ActivityTracker {
    records: DashMap<String, WatchActivity>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, user_id: &str, activity: WatchActivity) {
        self.records.insert(user_id.to_string(), activity);
    }

    /// Clear the record. Returns true when there was one, so the caller only
    /// broadcasts a stop that means something.
    pub fn stop(&self, user_id: &str) -> bool {
        self.records.remove(user_id).is_some()
    }

    pub fn get(&self, user_id: &str) -> Option<WatchActivity> {
        self.records.get(user_id).map(|r| r.clone())
    }
}
