//! Connection table and per-user fan-out for the social channel.

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::social::activity::ActivityTracker;
use crate::social::events::SocialEvent;
use crate::social::presence::PresenceTracker;

pub type SocialSender = UnboundedSender<SocialEvent>;

/// Process-wide social state: who is connected, who is online, and what
/// everyone is watching. All of it is ephemeral by design.
#[derive(Default)]
pub struct SocialHub {
    conns: DashMap<String, SocialSender>,
    pub presence: PresenceTracker,
    pub activity: ActivityTracker,
}

impl SocialHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn_id: &str, sender: SocialSender) {
        self.conns.insert(conn_id.to_string(), sender);
    }

    pub fn unregister(&self, conn_id: &str) {
        self.conns.remove(conn_id);
    }

    pub fn send_to_conn(&self, conn_id: &str, event: SocialEvent) {
        if let Some(sender) = self.conns.get(conn_id) {
            let _ = sender.send(event);
        }
    }

    /// Deliver an event to every live connection of a user (multi-device).
    pub fn send_to_user(&self, user_id: &str, event: &SocialEvent) {
        for conn_id in self.presence.connections(user_id) {
            if let Some(sender) = self.conns.get(&conn_id) {
                let _ = sender.send(event.clone());
            }
        }
    }
}
