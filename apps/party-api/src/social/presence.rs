//! In-memory per-user presence tracking with multi-connection support.
//!
//! Presence is per-**user**, not per-connection. A user is online while at
//! least one of their connections is live, and the tracker reports a
//! transition only on the 0→1 and 1→0 edges — intermediate connects and
//! disconnects while the count stays positive are silent.

use std::collections::HashSet;

use dashmap::DashMap;

/// Result of binding a connection to a user.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConnectOutcome {
    /// True only when this was the user's first live connection.
    pub came_online: bool,
    /// Set when the connection was previously bound to a different user and
    /// unbinding it took that user offline.
    pub previous_user_offline: Option<String>,
}

/// Result of dropping a connection.
#[derive(Debug, PartialEq, Eq)]
pub struct DisconnectOutcome {
    pub user_id: String,
    /// True only when this was the user's last live connection.
    pub went_offline: bool,
}

#[derive(Default)]
pub struct PresenceTracker {
    /// userId → live connection ids.
    users: DashMap<String, HashSet<String>>,
    /// connectionId → userId.
    by_conn: DashMap<String, String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user. A connection that re-declares a
    /// different user is unbound from the previous one first.
    pub fn connect(&self, user_id: &str, conn_id: &str) -> ConnectOutcome {
        let mut outcome = ConnectOutcome::default();

        if let Some(previous) = self.by_conn.insert(conn_id.to_string(), user_id.to_string()) {
            if previous == user_id {
                // Same binding re-declared; the set insert below is a no-op.
            } else if self.remove_connection(&previous, conn_id) {
                outcome.previous_user_offline = Some(previous);
            }
        }

        let mut entry = self.users.entry(user_id.to_string()).or_default();
        let was_empty = entry.is_empty();
        entry.insert(conn_id.to_string());
        outcome.came_online = was_empty;
        outcome
    }

    /// Drop a connection. Returns `None` when the connection never declared
    /// a user.
    pub fn disconnect(&self, conn_id: &str) -> Option<DisconnectOutcome> {
        let (_, user_id) = self.by_conn.remove(conn_id)?;
        let went_offline = self.remove_connection(&user_id, conn_id);
        Some(DisconnectOutcome {
            user_id,
            went_offline,
        })
    }

    /// Remove one connection from a user's set; true when the set emptied.
    fn remove_connection(&self, user_id: &str, conn_id: &str) -> bool {
        let Some(mut entry) = self.users.get_mut(user_id) else {
            return false;
        };
        entry.remove(conn_id);
        if entry.is_empty() {
            drop(entry);
            self.users.remove(user_id);
            return true;
        }
        false
    }

    /// The user a connection declared itself as, if any.
    pub fn user_of(&self, conn_id: &str) -> Option<String> {
        self.by_conn.get(conn_id).map(|u| u.clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.get(user_id).is_some_and(|conns| !conns.is_empty())
    }

    /// Live connection ids for a user, for fan-out.
    pub fn connections(&self, user_id: &str) -> Vec<String> {
        self.users
            .get(user_id)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}
