//! The per-room aggregate: membership, host identity, authoritative playback
//! state, visibility, schedule, chat history, polls, and the speaking set.
//!
//! A `Room` is always owned by the registry behind a per-room mutex; every
//! method here runs with that lock held, so membership mutation and the
//! broadcast that follows it are atomic to observers.

use std::collections::{HashSet, VecDeque};

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc::UnboundedSender;
use utoipa::ToSchema;

use crate::error::PartyError;
use crate::rooms::events::ServerEvent;
use crate::rooms::playback::PlaybackState;
use crate::rooms::polls::Poll;

/// Chat messages kept per room. Older entries are evicted; history is
/// room-lifetime only and never persisted.
pub const MAX_CHAT_HISTORY: usize = 200;

pub type EventSender = UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Show,
    Movie,
    Anime,
}

/// What the room is watching. Titles and poster come from the client, which
/// resolves them against the content catalog; this core never queries it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentRef {
    pub content_type: ContentKind,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_poster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomMember {
    /// Client-supplied session id; stable across reconnects of the same tab.
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Present when the member is an authenticated user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_user_id: Option<String>,
    pub is_host: bool,
    pub is_muted: bool,
    pub joined_at: DateTime<Utc>,
    /// Live connection to this member; `None` while the host is inside the
    /// disconnect grace window.
    #[serde(skip)]
    pub sender: Option<EventSender>,
}

impl RoomMember {
    /// The identity poll votes are keyed on.
    pub fn voter_key(&self) -> &str {
        self.auth_user_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reaction {
    pub id: String,
    pub username: String,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
}

/// Room lifecycle: `Scheduled → Live → Closed`. Scheduled rooms accept
/// members and chat but reject playback commands until the schedule elapses;
/// the transition is observed per request against wall clock, never pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Scheduled,
    Live,
    Closed,
}

pub struct Room {
    pub code: String,
    pub content: ContentRef,
    pub description: Option<String>,
    pub is_public: bool,
    pub password_hash: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Ordered by join time, keyed by session id.
    pub members: Vec<RoomMember>,
    pub playback: PlaybackState,
    pub messages: VecDeque<ChatMessage>,
    pub polls: Vec<Poll>,
    /// Member ids currently transmitting voice.
    pub speaking: HashSet<String>,
    pub closed: bool,
    /// Set while the host's transport is gone; cleared on reconnect.
    pub host_away_since: Option<DateTime<Utc>>,
    /// Incremented on every host disconnect so a stale grace timer from an
    /// earlier disconnect cannot close the room.
    pub host_away_epoch: u64,
    pub created_at: DateTime<Utc>,
}

impl Room {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        code: String,
        content: ContentRef,
        description: Option<String>,
        is_public: bool,
        password: Option<&str>,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            code,
            content,
            description,
            is_public,
            password_hash: password.filter(|p| !p.is_empty()).map(hash_password),
            scheduled_for,
            members: Vec::new(),
            playback: PlaybackState::initial(now),
            messages: VecDeque::new(),
            polls: Vec::new(),
            speaking: HashSet::new(),
            closed: false,
            host_away_since: None,
            host_away_epoch: 0,
            created_at: now,
        }
    }

    pub fn phase(&self, now: DateTime<Utc>) -> RoomPhase {
        if self.closed {
            RoomPhase::Closed
        } else if self.scheduled_for.is_some_and(|at| now < at) {
            RoomPhase::Scheduled
        } else {
            RoomPhase::Live
        }
    }

    pub fn host(&self) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.is_host)
    }

    pub fn member(&self, member_id: &str) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.id == member_id)
    }

    pub fn member_mut(&mut self, member_id: &str) -> Option<&mut RoomMember> {
        self.members.iter_mut().find(|m| m.id == member_id)
    }

    pub fn require_member(&self, member_id: &str) -> Result<&RoomMember, PartyError> {
        self.member(member_id)
            .ok_or_else(|| PartyError::state("You are not in this room"))
    }

    /// Host identity is enforced here, server-side, for every privileged
    /// command — the UI hiding a control is not a protection.
    pub fn require_host(&self, member_id: &str) -> Result<&RoomMember, PartyError> {
        let member = self.require_member(member_id)?;
        if !member.is_host {
            return Err(PartyError::authorization("Only the host can do that"));
        }
        Ok(member)
    }

    /// Gate for playback commands: scheduled rooms reject them until the
    /// schedule has elapsed.
    pub fn require_live(&self, now: DateTime<Utc>) -> Result<(), PartyError> {
        match self.phase(now) {
            RoomPhase::Live => Ok(()),
            RoomPhase::Scheduled => Err(PartyError::state(
                "This room has not started yet",
            )),
            RoomPhase::Closed => Err(PartyError::state("This room is closed")),
        }
    }

    pub fn verify_password(&self, supplied: Option<&str>) -> Result<(), PartyError> {
        let Some(expected) = &self.password_hash else {
            return Ok(());
        };
        match supplied {
            Some(p) if &hash_password(p) == expected => Ok(()),
            _ => Err(PartyError::authorization("Incorrect room password")),
        }
    }

    pub fn add_member(&mut self, member: RoomMember) {
        self.members.push(member);
    }

    pub fn remove_member(&mut self, member_id: &str) -> Option<RoomMember> {
        let index = self.members.iter().position(|m| m.id == member_id)?;
        self.speaking.remove(member_id);
        Some(self.members.remove(index))
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > MAX_CHAT_HISTORY {
            self.messages.pop_front();
        }
    }

    pub fn poll_mut(&mut self, poll_id: &str) -> Option<&mut Poll> {
        self.polls.iter_mut().find(|p| p.id == poll_id)
    }

    // -----------------------------------------------------------------------
    // Broadcast helpers. Senders are unbounded, so these never block while
    // the room lock is held; a closed receiver just drops the event.
    // -----------------------------------------------------------------------

    pub fn broadcast(&self, event: &ServerEvent) {
        for member in &self.members {
            if let Some(sender) = &member.sender {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Broadcast to everyone except `member_id` — how sync updates reach
    /// viewers without echoing back to the host.
    pub fn broadcast_except(&self, member_id: &str, event: &ServerEvent) {
        for member in &self.members {
            if member.id == member_id {
                continue;
            }
            if let Some(sender) = &member.sender {
                let _ = sender.send(event.clone());
            }
        }
    }

    pub fn send_to(&self, member_id: &str, event: ServerEvent) {
        if let Some(sender) = self.member(member_id).and_then(|m| m.sender.as_ref()) {
            let _ = sender.send(event);
        }
    }

    pub fn member_list(&self) -> Vec<RoomMember> {
        self.members.clone()
    }
}

pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}
