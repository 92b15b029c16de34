//! Wire-format messages for the social (presence/activity) channel.
//!
//! Same versioned `{v, t, d}` envelope as the watch channel. Identity is the
//! user the connection declared with `user:online`; payloads never carry a
//! "from" field the server would have to trust.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rooms::room::ContentKind;
use crate::social::activity::WatchActivity;
use crate::store::UserProfile;

pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Inbound {
    #[serde(default = "default_version")]
    pub v: u8,
    #[serde(flatten)]
    pub command: SocialCommand,
}

fn default_version() -> u8 {
    PROTOCOL_VERSION
}

#[derive(Debug, Serialize)]
pub struct Outbound<'a> {
    pub v: u8,
    #[serde(flatten)]
    pub event: &'a SocialEvent,
}

impl SocialEvent {
    pub fn to_wire(&self) -> String {
        serde_json::to_string(&Outbound {
            v: PROTOCOL_VERSION,
            event: self,
        })
        .expect("social event serializes")
    }

    pub fn error(err: &crate::error::PartyError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.message().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server commands
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "t", content = "d")]
pub enum SocialCommand {
    /// Declare the authenticated user behind this connection.
    #[serde(rename = "user:online")]
    UserOnline { user_id: String },
    #[serde(rename = "friends:get-online")]
    GetOnlineFriends,
    #[serde(rename = "friends:get-activities")]
    GetFriendActivities,

    #[serde(rename = "activity:start")]
    ActivityStart(ActivityStartPayload),
    #[serde(rename = "activity:stop")]
    ActivityStop,

    #[serde(rename = "typing:start")]
    TypingStart { to_user_id: String },
    #[serde(rename = "typing:stop")]
    TypingStop { to_user_id: String },

    #[serde(rename = "dm:send")]
    DmSend { to_user_id: String, message: String },

    #[serde(rename = "friend:request-sent")]
    FriendRequestSent { to_user_id: String },
    #[serde(rename = "friend:accepted")]
    FriendAccepted { to_user_id: String },
}

#[derive(Debug, Deserialize)]
pub struct ActivityStartPayload {
    pub room_code: String,
    pub content_type: ContentKind,
    pub content_id: String,
    pub content_title: String,
    #[serde(default)]
    pub content_poster: Option<String>,
    #[serde(default)]
    pub episode_title: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → client events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", content = "d")]
pub enum SocialEvent {
    #[serde(rename = "friends:online-list")]
    FriendsOnlineList { online_friends: Vec<String> },
    #[serde(rename = "friend:online")]
    FriendOnline {
        friend_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar_url: Option<String>,
    },
    #[serde(rename = "friend:offline")]
    FriendOffline { friend_id: String },
    #[serde(rename = "friend:typing")]
    FriendTyping { friend_id: String, is_typing: bool },

    #[serde(rename = "notification:new")]
    NotificationNew {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user: Option<UserProfile>,
        message: String,
    },

    /// `activity: null` signals a stop.
    #[serde(rename = "friend:activity")]
    FriendActivity {
        friend_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar_url: Option<String>,
        activity: Option<WatchActivity>,
    },
    #[serde(rename = "friends:activities")]
    FriendsActivities { activities: Vec<FriendActivityEntry> },

    #[serde(rename = "dm:received")]
    DmReceived {
        id: String,
        from_user_id: String,
        message: String,
        created_at: DateTime<Utc>,
    },
    #[serde(rename = "dm:sent")]
    DmSent {
        id: String,
        to_user_id: String,
        message: String,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendActivityEntry {
    pub friend_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub activity: WatchActivity,
}
