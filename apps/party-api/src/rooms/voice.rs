//! Pending unmute-request bookkeeping for the host ↔ member handshake.
//!
//! Each request gets its own correlation id, so concurrent requests to
//! different members never cross-wire. A request that receives no answer
//! within the configured timeout resolves as an implicit reject.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use watchtide_common::id::{prefix, prefixed_ulid};

use crate::error::PartyError;

#[derive(Debug, Clone)]
pub struct PendingUnmute {
    pub room_code: String,
    /// Member id of the host that asked.
    pub host_id: String,
    /// Member id of the member being asked.
    pub target_id: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct UnmuteRequests {
    pending: DashMap<String, PendingUnmute>,
}

impl UnmuteRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return its correlation id.
    pub fn create(&self, room_code: &str, host_id: &str, target_id: &str) -> String {
        let request_id = prefixed_ulid(prefix::UNMUTE_REQUEST);
        self.pending.insert(
            request_id.clone(),
            PendingUnmute {
                room_code: room_code.to_string(),
                host_id: host_id.to_string(),
                target_id: target_id.to_string(),
                requested_at: Utc::now(),
            },
        );
        request_id
    }

    /// Consume a request in response to the target's answer. Only the member
    /// the request was addressed to may resolve it; whoever consumes the id
    /// first (answer or expiry) wins.
    pub fn resolve(&self, request_id: &str, responder_id: &str) -> Result<PendingUnmute, PartyError> {
        let removed = self
            .pending
            .remove_if(request_id, |_, pending| pending.target_id == responder_id);
        match removed {
            Some((_, pending)) => Ok(pending),
            None => Err(PartyError::state("Unknown or expired unmute request")),
        }
    }

    /// Consume a request on timeout. Returns `None` if it was already
    /// answered.
    pub fn expire(&self, request_id: &str) -> Option<PendingUnmute> {
        self.pending.remove(request_id).map(|(_, pending)| pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_consumes_the_request() {
        let requests = UnmuteRequests::new();
        let id = requests.create("ABCDEF", "host", "viewer");

        let pending = requests.resolve(&id, "viewer").unwrap();
        assert_eq!(pending.room_code, "ABCDEF");
        assert_eq!(pending.host_id, "host");

        // Second resolve fails — already consumed.
        assert!(requests.resolve(&id, "viewer").is_err());
    }

    #[test]
    fn only_the_target_may_resolve() {
        let requests = UnmuteRequests::new();
        let id = requests.create("ABCDEF", "host", "viewer");

        assert!(requests.resolve(&id, "other").is_err());
        // Still pending for the real target.
        assert!(requests.resolve(&id, "viewer").is_ok());
    }

    #[test]
    fn expiry_and_answer_race_is_first_wins() {
        let requests = UnmuteRequests::new();
        let id = requests.create("ABCDEF", "host", "viewer");

        assert!(requests.expire(&id).is_some());
        assert!(requests.resolve(&id, "viewer").is_err());
        assert!(requests.expire(&id).is_none());
    }

    #[test]
    fn concurrent_requests_do_not_cross_wire() {
        let requests = UnmuteRequests::new();
        let a = requests.create("ABCDEF", "host", "viewer-a");
        let b = requests.create("ABCDEF", "host", "viewer-b");
        assert_ne!(a, b);

        // Viewer B cannot answer viewer A's request.
        assert!(requests.resolve(&a, "viewer-b").is_err());
        assert!(requests.resolve(&b, "viewer-b").is_ok());
        assert!(requests.resolve(&a, "viewer-a").is_ok());
    }
}
