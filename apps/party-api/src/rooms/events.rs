//! Wire-format messages for the watch-room channel.
//!
//! Every frame is a versioned envelope `{v, t, d}` where `t` names the event
//! and `d` carries its payload. Unknown payload fields are ignored on the
//! way in, so the schema can grow without breaking older clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rooms::playback::PlaybackState;
use crate::rooms::polls::PollSnapshot;
use crate::rooms::room::{ChatMessage, ContentKind, ContentRef, Reaction, RoomMember};

/// Wire protocol version for the watch channel.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A frame received from a client.
#[derive(Debug, Deserialize)]
pub struct Inbound {
    #[serde(default = "default_version")]
    pub v: u8,
    #[serde(flatten)]
    pub command: ClientCommand,
}

fn default_version() -> u8 {
    PROTOCOL_VERSION
}

/// A frame sent to a client.
#[derive(Debug, Serialize)]
pub struct Outbound<'a> {
    pub v: u8,
    #[serde(flatten)]
    pub event: &'a ServerEvent,
}

impl ServerEvent {
    pub fn to_wire(&self) -> String {
        serde_json::to_string(&Outbound {
            v: PROTOCOL_VERSION,
            event: self,
        })
        .expect("server event serializes")
    }
}

// ---------------------------------------------------------------------------
// Client → server commands
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "t", content = "d")]
pub enum ClientCommand {
    #[serde(rename = "room:create")]
    CreateRoom(CreateRoomPayload),
    #[serde(rename = "room:join")]
    JoinRoom(JoinRoomPayload),
    #[serde(rename = "room:leave")]
    LeaveRoom,

    #[serde(rename = "chat:message")]
    ChatMessage { message: String },
    #[serde(rename = "reaction:send")]
    SendReaction { emoji: String },

    // Host-only playback commands; enforced server-side.
    #[serde(rename = "video:play")]
    VideoPlay { current_time: f64 },
    #[serde(rename = "video:pause")]
    VideoPause { current_time: f64 },
    #[serde(rename = "video:seek")]
    VideoSeek { current_time: f64 },
    #[serde(rename = "video:playbackRate")]
    VideoPlaybackRate { rate: f64 },
    #[serde(rename = "video:subtitle")]
    VideoSubtitle { subtitle_index: i32 },
    #[serde(rename = "video:request-state")]
    VideoRequestState,
    #[serde(rename = "video:change-content")]
    ChangeContent(ChangeContentPayload),

    #[serde(rename = "voice:host-mute")]
    HostMute {
        target_user_id: String,
        is_muted: bool,
    },
    #[serde(rename = "voice:request-unmute")]
    RequestUnmute { target_user_id: String },
    #[serde(rename = "voice:unmute-response")]
    UnmuteResponse { request_id: String, accepted: bool },
    #[serde(rename = "voice:speaking")]
    Speaking { is_speaking: bool },

    #[serde(rename = "poll:create")]
    CreatePoll {
        question: String,
        options: Vec<String>,
        #[serde(default)]
        expires_in_minutes: Option<i64>,
    },
    #[serde(rename = "poll:vote")]
    VotePoll {
        poll_id: String,
        option_index: usize,
    },
    #[serde(rename = "poll:close")]
    ClosePoll { poll_id: String },
    #[serde(rename = "poll:get")]
    GetPolls,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomPayload {
    #[serde(flatten)]
    pub content: ContentRef,
    #[serde(default)]
    pub description: Option<String>,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub auth_user_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomPayload {
    pub room_code: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_user_id: Option<String>,
}

/// All fields optional: the host may switch just the episode, or move to a
/// different title entirely.
#[derive(Debug, Deserialize)]
pub struct ChangeContentPayload {
    #[serde(default)]
    pub content_type: Option<ContentKind>,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub content_title: Option<String>,
    #[serde(default)]
    pub content_poster: Option<String>,
    #[serde(default)]
    pub episode_id: Option<String>,
    #[serde(default)]
    pub episode_title: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → client events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", content = "d")]
pub enum ServerEvent {
    #[serde(rename = "room:created")]
    RoomCreated(RoomSnapshot),
    #[serde(rename = "room:joined")]
    RoomJoined(RoomSnapshot),
    /// Carries the full member list so no observer can see a partial roster.
    #[serde(rename = "room:user-joined")]
    UserJoined {
        user: RoomMember,
        members: Vec<RoomMember>,
    },
    #[serde(rename = "room:user-left")]
    UserLeft {
        user_id: String,
        username: String,
        members: Vec<RoomMember>,
    },
    #[serde(rename = "room:user-updated")]
    UserUpdated { user: RoomMember },
    #[serde(rename = "room:user-reconnected")]
    UserReconnected {
        user: RoomMember,
        members: Vec<RoomMember>,
    },
    #[serde(rename = "room:host-disconnected")]
    HostDisconnected {
        message: String,
        grace_period_ms: u64,
    },
    #[serde(rename = "room:host-reconnected")]
    HostReconnected {
        user: RoomMember,
        members: Vec<RoomMember>,
    },
    #[serde(rename = "room:destroyed")]
    RoomDestroyed { message: String },

    #[serde(rename = "chat:receive")]
    ChatReceive { message: ChatMessage },
    #[serde(rename = "reaction:show")]
    ReactionShow { reaction: Reaction },

    #[serde(rename = "video:sync")]
    VideoSync { video_state: PlaybackState },
    #[serde(rename = "video:subtitle")]
    VideoSubtitleChanged { subtitle_index: i32 },
    #[serde(rename = "content:changed")]
    ContentChanged {
        content: ContentRef,
        video_state: PlaybackState,
    },

    /// Sent to the muted member only, so the UI shows the banner exactly once.
    #[serde(rename = "voice:muted-by-host")]
    MutedByHost { is_muted: bool },
    #[serde(rename = "voice:user-speaking")]
    UserSpeaking { user_id: String, is_speaking: bool },
    #[serde(rename = "voice:unmute-request")]
    UnmuteRequest { request_id: String },
    #[serde(rename = "voice:unmute-result")]
    UnmuteResult {
        request_id: String,
        user_id: String,
        accepted: bool,
    },

    #[serde(rename = "poll:created")]
    PollCreated { poll: PollSnapshot },
    #[serde(rename = "poll:updated")]
    PollUpdated { poll: PollSnapshot },
    #[serde(rename = "poll:closed")]
    PollClosed { poll_id: String },
    #[serde(rename = "poll:list")]
    PollList { polls: Vec<PollSnapshot> },

    /// Returned only to the originating connection, never broadcast.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &crate::error::PartyError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.message().to_string(),
        }
    }
}

/// The full room state a member receives on create/join.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_code: String,
    #[serde(flatten)]
    pub content: ContentRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub users: Vec<RoomMember>,
    pub speaking_user_ids: Vec<String>,
    pub messages: Vec<ChatMessage>,
    pub video_state: PlaybackState,
    pub polls: Vec<PollSnapshot>,
    /// The recipient's own member record.
    pub user: RoomMember,
}
