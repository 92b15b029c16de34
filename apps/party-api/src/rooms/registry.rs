//! Process-wide table of active rooms.
//!
//! Rooms live in a `DashMap` keyed by their share code, each behind its own
//! `parking_lot::Mutex`. Commands against the same room serialize on that
//! lock; commands against different rooms run fully concurrently. Every
//! operation validates, applies, and broadcasts while holding the lock, so
//! observers never see a transiently inconsistent room.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;
use watchtide_common::id::{prefix, prefixed_ulid};

use crate::error::PartyError;
use crate::rooms::events::{
    ChangeContentPayload, CreateRoomPayload, JoinRoomPayload, RoomSnapshot, ServerEvent,
};
use crate::rooms::polls::Poll;
use crate::rooms::room::{ChatMessage, ContentRef, EventSender, Reaction, Room, RoomMember};
use crate::rooms::voice::UnmuteRequests;

pub const ROOM_CODE_LEN: usize = 6;

/// Code alphabet without lookalike characters (no 0/O, 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Public listing entry for `GET /api/watch-rooms`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSummary {
    pub room_code: String,
    pub content: ContentRef,
    pub member_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// What the caller must do after reporting a disconnect.
#[derive(Debug, PartialEq, Eq)]
pub enum DisconnectAction {
    None,
    /// The host's transport dropped: arm a timer that calls
    /// [`RoomRegistry::close_if_host_away`] with this epoch after `grace`.
    HostClose { grace: Duration, epoch: u64 },
}

pub struct RoomRegistry {
    rooms: DashMap<String, Mutex<Room>>,
    pub unmute: UnmuteRequests,
    host_grace: Duration,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_host_grace(Duration::from_secs(60))
    }

    pub fn with_host_grace(host_grace: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            unmute: UnmuteRequests::new(),
            host_grace,
        }
    }

    pub fn host_grace(&self) -> Duration {
        self.host_grace
    }

    fn generate_code(&self) -> String {
        // Retry until unique; collisions are rare at this alphabet size but
        // codes are user-facing, so uniqueness is non-negotiable.
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    fn with_room<T>(
        &self,
        code: &str,
        f: impl FnOnce(&mut Room) -> Result<T, PartyError>,
    ) -> Result<T, PartyError> {
        let entry = self
            .rooms
            .get(code)
            .ok_or_else(|| PartyError::validation("Room not found"))?;
        let mut room = entry.lock();
        f(&mut room)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create a room with the caller as host and send them `room:created`.
    /// Returns the new room code.
    pub fn create_room(
        &self,
        payload: CreateRoomPayload,
        sender: EventSender,
        now: DateTime<Utc>,
    ) -> Result<String, PartyError> {
        let username = payload.username.trim();
        if username.is_empty() {
            return Err(PartyError::validation("Username is required"));
        }
        if payload.session_id.is_empty() {
            return Err(PartyError::validation("Session id is required"));
        }

        let code = self.generate_code();
        let mut room = Room::new(
            code.clone(),
            payload.content,
            payload.description,
            payload.is_public,
            payload.password.as_deref(),
            payload.scheduled_for,
            now,
        );

        let host = RoomMember {
            id: payload.session_id,
            username: username.to_string(),
            avatar_url: payload.avatar_url,
            auth_user_id: payload.auth_user_id,
            is_host: true,
            is_muted: false,
            joined_at: now,
            sender: Some(sender),
        };
        room.add_member(host.clone());
        room.send_to(&host.id, ServerEvent::RoomCreated(snapshot(&room, host.clone())));

        tracing::info!(room_code = %code, host = %host.id, "room created");
        self.rooms.insert(code.clone(), Mutex::new(room));
        Ok(code)
    }

    /// Join (or rejoin) a room. The joiner gets the full `room:joined`
    /// snapshot; existing members see the updated roster in one event.
    pub fn join_room(
        &self,
        payload: JoinRoomPayload,
        sender: EventSender,
        now: DateTime<Utc>,
    ) -> Result<String, PartyError> {
        let code = payload.room_code.trim().to_uppercase();
        let username = payload.username.trim().to_string();
        if username.is_empty() {
            return Err(PartyError::validation("Username is required"));
        }
        if payload.session_id.is_empty() {
            return Err(PartyError::validation("Session id is required"));
        }

        self.with_room(&code, |room| {
            if room.closed {
                return Err(PartyError::state("This room is closed"));
            }
            // Password is checked before any membership mutation: a failed
            // join must never add a member.
            room.verify_password(payload.password.as_deref())?;

            if let Some(member) = room.member_mut(&payload.session_id) {
                // Same session id — a reconnect, not a second member.
                member.sender = Some(sender);
                member.username = username;
                member.avatar_url = payload.avatar_url.clone();
                let user = member.clone();

                let was_away_host = user.is_host && room.host_away_since.is_some();
                if was_away_host {
                    room.host_away_since = None;
                    tracing::info!(room_code = %code, "host reconnected within grace window");
                }

                let event = if was_away_host {
                    ServerEvent::HostReconnected {
                        user: user.clone(),
                        members: room.member_list(),
                    }
                } else {
                    ServerEvent::UserReconnected {
                        user: user.clone(),
                        members: room.member_list(),
                    }
                };
                room.broadcast_except(&user.id, &event);
                room.send_to(&user.id.clone(), ServerEvent::RoomJoined(snapshot(room, user)));
                return Ok(code.clone());
            }

            let member = RoomMember {
                id: payload.session_id.clone(),
                username,
                avatar_url: payload.avatar_url.clone(),
                auth_user_id: payload.auth_user_id.clone(),
                is_host: false,
                is_muted: false,
                joined_at: now,
                sender: Some(sender),
            };
            room.add_member(member.clone());

            room.broadcast_except(
                &member.id,
                &ServerEvent::UserJoined {
                    user: member.clone(),
                    members: room.member_list(),
                },
            );
            room.send_to(&member.id.clone(), ServerEvent::RoomJoined(snapshot(room, member)));
            Ok(code.clone())
        })
    }

    /// Explicit leave. A departing host closes the room; see DESIGN.md.
    pub fn leave_room(&self, code: &str, member_id: &str) {
        let destroy = self
            .with_room(code, |room| {
                let Some(member) = room.remove_member(member_id) else {
                    return Ok(false);
                };

                if member.is_host {
                    room.closed = true;
                    room.broadcast(&ServerEvent::RoomDestroyed {
                        message: "The host ended the watch party".to_string(),
                    });
                    return Ok(true);
                }

                room.broadcast(&ServerEvent::UserLeft {
                    user_id: member.id.clone(),
                    username: member.username.clone(),
                    members: room.member_list(),
                });
                Ok(room.members.is_empty())
            })
            .unwrap_or(false);

        if destroy {
            self.rooms.remove(code);
            tracing::info!(room_code = %code, "room destroyed");
        }
    }

    /// Transport-level disconnect. Non-hosts just leave; a host keeps their
    /// seat for the grace window so a flaky network doesn't kill the party.
    pub fn handle_disconnect(
        &self,
        code: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> DisconnectAction {
        let grace = self.host_grace;
        let mut viewer_left = false;
        let mut action = DisconnectAction::None;

        let _ = self.with_room(code, |room| {
            let is_host = room.member(member_id).map(|m| m.is_host);
            match is_host {
                Some(true) => {
                    if let Some(member) = room.member_mut(member_id) {
                        member.sender = None;
                    }
                    room.host_away_since = Some(now);
                    room.host_away_epoch += 1;
                    room.broadcast(&ServerEvent::HostDisconnected {
                        message: "The host lost connection. Waiting for them to return…"
                            .to_string(),
                        grace_period_ms: grace.as_millis() as u64,
                    });
                    action = DisconnectAction::HostClose {
                        grace,
                        epoch: room.host_away_epoch,
                    };
                }
                Some(false) => viewer_left = true,
                None => {}
            }
            Ok(())
        });

        if viewer_left {
            self.leave_room(code, member_id);
        }
        action
    }

    /// Grace-timer callback: destroy the room if the host never returned.
    /// The epoch guards against a timer armed by an earlier disconnect.
    pub fn close_if_host_away(&self, code: &str, epoch: u64) {
        let destroy = self
            .with_room(code, |room| {
                if room.host_away_since.is_none() || room.host_away_epoch != epoch {
                    return Ok(false);
                }
                room.closed = true;
                room.broadcast(&ServerEvent::RoomDestroyed {
                    message: "The host did not return in time".to_string(),
                });
                Ok(true)
            })
            .unwrap_or(false);

        if destroy {
            self.rooms.remove(code);
            tracing::info!(room_code = %code, "room destroyed after host grace expired");
        }
    }

    // -----------------------------------------------------------------------
    // Chat & reactions
    // -----------------------------------------------------------------------

    pub fn send_chat(&self, code: &str, member_id: &str, text: &str) -> Result<(), PartyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PartyError::validation("Message must not be empty"));
        }
        self.with_room(code, |room| {
            let member = room.require_member(member_id)?;
            let message = ChatMessage {
                id: prefixed_ulid(prefix::MESSAGE),
                username: member.username.clone(),
                avatar_url: member.avatar_url.clone(),
                message: text.to_string(),
                timestamp: Utc::now(),
            };
            room.broadcast(&ServerEvent::ChatReceive {
                message: message.clone(),
            });
            room.push_message(message);
            Ok(())
        })
    }

    pub fn send_reaction(
        &self,
        code: &str,
        member_id: &str,
        emoji: &str,
    ) -> Result<(), PartyError> {
        if emoji.is_empty() {
            return Err(PartyError::validation("Reaction emoji is required"));
        }
        self.with_room(code, |room| {
            let member = room.require_member(member_id)?;
            let reaction = Reaction {
                id: prefixed_ulid(prefix::REACTION),
                username: member.username.clone(),
                emoji: emoji.to_string(),
                timestamp: Utc::now(),
            };
            // Broadcast-only: nothing retained server-side.
            room.broadcast(&ServerEvent::ReactionShow { reaction });
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Playback synchronization (host-only, broadcast to viewers)
    // -----------------------------------------------------------------------

    pub fn video_play(
        &self,
        code: &str,
        member_id: &str,
        current_time: f64,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.sync_command(code, member_id, now, |room| {
            room.playback.play(current_time, now)
        })
    }

    pub fn video_pause(
        &self,
        code: &str,
        member_id: &str,
        current_time: f64,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.sync_command(code, member_id, now, |room| {
            room.playback.pause(current_time, now)
        })
    }

    pub fn video_seek(
        &self,
        code: &str,
        member_id: &str,
        current_time: f64,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.sync_command(code, member_id, now, |room| {
            room.playback.seek(current_time, now)
        })
    }

    pub fn video_playback_rate(
        &self,
        code: &str,
        member_id: &str,
        rate: f64,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        if !(0.25..=4.0).contains(&rate) {
            return Err(PartyError::validation("Playback rate out of range"));
        }
        self.sync_command(code, member_id, now, |room| {
            room.playback.set_rate(rate, now)
        })
    }

    /// Shared shape of the playback mutations: host check, schedule gate,
    /// apply, then one idempotent full-state broadcast to viewers only.
    fn sync_command(
        &self,
        code: &str,
        member_id: &str,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut Room),
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_host(member_id)?;
            room.require_live(now)?;
            apply(room);
            room.broadcast_except(
                member_id,
                &ServerEvent::VideoSync {
                    video_state: room.playback.clone(),
                },
            );
            Ok(())
        })
    }

    pub fn video_subtitle(
        &self,
        code: &str,
        member_id: &str,
        subtitle_index: i32,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_host(member_id)?;
            room.require_live(now)?;
            room.playback.set_subtitle(subtitle_index);
            room.broadcast_except(
                member_id,
                &ServerEvent::VideoSubtitleChanged { subtitle_index },
            );
            Ok(())
        })
    }

    /// Answer only the requester with the live authoritative state.
    pub fn video_request_state(
        &self,
        code: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_member(member_id)?;
            room.send_to(
                member_id,
                ServerEvent::VideoSync {
                    video_state: room.playback.at(now),
                },
            );
            Ok(())
        })
    }

    pub fn change_content(
        &self,
        code: &str,
        member_id: &str,
        payload: ChangeContentPayload,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_host(member_id)?;

            if let Some(kind) = payload.content_type {
                room.content.content_type = kind;
            }
            if let Some(id) = payload.content_id {
                room.content.content_id = id;
            }
            if let Some(title) = payload.content_title {
                room.content.content_title = Some(title);
            }
            if let Some(poster) = payload.content_poster {
                room.content.content_poster = Some(poster);
            }
            room.content.episode_id = payload.episode_id;
            room.content.episode_title = payload.episode_title;

            room.playback.reset(now);
            room.broadcast_except(
                member_id,
                &ServerEvent::ContentChanged {
                    content: room.content.clone(),
                    video_state: room.playback.clone(),
                },
            );
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Voice coordination
    // -----------------------------------------------------------------------

    pub fn host_mute(
        &self,
        code: &str,
        member_id: &str,
        target_id: &str,
        is_muted: bool,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_host(member_id)?;
            let target = room
                .member_mut(target_id)
                .ok_or_else(|| PartyError::validation("No such member in this room"))?;
            target.is_muted = is_muted;
            let user = target.clone();

            // The target alone gets the banner notification; the roster
            // update goes to everyone.
            room.send_to(target_id, ServerEvent::MutedByHost { is_muted });
            room.broadcast(&ServerEvent::UserUpdated { user });
            Ok(())
        })
    }

    /// Host asks a member to unmute. Returns the correlation id so the
    /// caller can arm the expiry timer.
    pub fn request_unmute(
        &self,
        code: &str,
        member_id: &str,
        target_id: &str,
    ) -> Result<String, PartyError> {
        self.with_room(code, |room| {
            room.require_host(member_id)?;
            room.require_member(target_id)?;
            let request_id = self.unmute.create(code, member_id, target_id);
            room.send_to(
                target_id,
                ServerEvent::UnmuteRequest {
                    request_id: request_id.clone(),
                },
            );
            Ok(request_id)
        })
    }

    /// The target answered. Forward the outcome to the host; on accept the
    /// member is unmuted and the roster updated.
    pub fn resolve_unmute(
        &self,
        member_id: &str,
        request_id: &str,
        accepted: bool,
    ) -> Result<(), PartyError> {
        let pending = self.unmute.resolve(request_id, member_id)?;
        self.with_room(&pending.room_code, |room| {
            if accepted {
                if let Some(member) = room.member_mut(&pending.target_id) {
                    member.is_muted = false;
                    let user = member.clone();
                    room.broadcast(&ServerEvent::UserUpdated { user });
                }
            }
            room.send_to(
                &pending.host_id,
                ServerEvent::UnmuteResult {
                    request_id: request_id.to_string(),
                    user_id: pending.target_id.clone(),
                    accepted,
                },
            );
            Ok(())
        })
    }

    /// Expiry-timer callback: no answer within the bound counts as a reject.
    pub fn expire_unmute(&self, request_id: &str) {
        let Some(pending) = self.unmute.expire(request_id) else {
            return;
        };
        tracing::debug!(%request_id, room_code = %pending.room_code, "unmute request expired");
        let _ = self.with_room(&pending.room_code, |room| {
            room.send_to(
                &pending.host_id,
                ServerEvent::UnmuteResult {
                    request_id: request_id.to_string(),
                    user_id: pending.target_id.clone(),
                    accepted: false,
                },
            );
            Ok(())
        });
    }

    pub fn set_speaking(
        &self,
        code: &str,
        member_id: &str,
        is_speaking: bool,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_member(member_id)?;
            if is_speaking {
                room.speaking.insert(member_id.to_string());
            } else {
                room.speaking.remove(member_id);
            }
            room.broadcast_except(
                member_id,
                &ServerEvent::UserSpeaking {
                    user_id: member_id.to_string(),
                    is_speaking,
                },
            );
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Polls
    // -----------------------------------------------------------------------

    pub fn create_poll(
        &self,
        code: &str,
        member_id: &str,
        question: String,
        options: Vec<String>,
        expires_in_minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_host(member_id)?;
            let poll = Poll::new(question, options, expires_in_minutes, now)?;
            room.broadcast(&ServerEvent::PollCreated {
                poll: poll.snapshot(),
            });
            room.polls.push(poll);
            Ok(())
        })
    }

    pub fn vote_poll(
        &self,
        code: &str,
        member_id: &str,
        poll_id: &str,
        option_index: usize,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            let voter_key = room.require_member(member_id)?.voter_key().to_string();

            let expired = {
                let poll = room
                    .poll_mut(poll_id)
                    .ok_or_else(|| PartyError::validation("Poll not found"))?;
                poll.expire_if_due(now)
            };
            if expired {
                room.broadcast(&ServerEvent::PollClosed {
                    poll_id: poll_id.to_string(),
                });
                return Err(PartyError::state("This poll is closed"));
            }

            let updated = {
                let poll = room
                    .poll_mut(poll_id)
                    .ok_or_else(|| PartyError::validation("Poll not found"))?;
                poll.vote(&voter_key, option_index, now)?;
                poll.snapshot()
            };
            room.broadcast(&ServerEvent::PollUpdated { poll: updated });
            Ok(())
        })
    }

    pub fn close_poll(&self, code: &str, member_id: &str, poll_id: &str) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_host(member_id)?;
            let poll = room
                .poll_mut(poll_id)
                .ok_or_else(|| PartyError::validation("Poll not found"))?;
            poll.close();
            room.broadcast(&ServerEvent::PollClosed {
                poll_id: poll_id.to_string(),
            });
            Ok(())
        })
    }

    /// Send the room's polls to the requester, lazily closing any whose end
    /// time has passed.
    pub fn get_polls(
        &self,
        code: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        self.with_room(code, |room| {
            room.require_member(member_id)?;

            let mut newly_closed = Vec::new();
            for poll in &mut room.polls {
                if poll.expire_if_due(now) {
                    newly_closed.push(poll.id.clone());
                }
            }
            for poll_id in newly_closed {
                room.broadcast(&ServerEvent::PollClosed { poll_id });
            }

            let polls = room.polls.iter().map(|p| p.snapshot()).collect();
            room.send_to(member_id, ServerEvent::PollList { polls });
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// Public summaries for the REST listing: public, open rooms only.
    pub fn active_rooms(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .filter_map(|entry| {
                let room = entry.lock();
                if !room.is_public || room.closed {
                    return None;
                }
                Some(RoomSummary {
                    room_code: room.code.clone(),
                    content: room.content.clone(),
                    member_count: room.members.len(),
                    scheduled_for: room.scheduled_for,
                    created_at: room.created_at,
                })
            })
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the full join snapshot for one member, under the room lock.
fn snapshot(room: &Room, user: RoomMember) -> RoomSnapshot {
    RoomSnapshot {
        room_code: room.code.clone(),
        content: room.content.clone(),
        description: room.description.clone(),
        is_public: room.is_public,
        scheduled_for: room.scheduled_for,
        created_at: room.created_at,
        users: room.member_list(),
        speaking_user_ids: room.speaking.iter().cloned().collect(),
        messages: room.messages.iter().cloned().collect(),
        video_state: room.playback.clone(),
        polls: room.polls.iter().map(|p| p.snapshot()).collect(),
        user,
    }
}
