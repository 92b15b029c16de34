//! WebSocket upgrade handler and per-connection event loop for the social
//! channel: presence, typing, DMs, friend notifications, watch activity.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use watchtide_common::id::{prefix, prefixed_ulid};

use crate::error::PartyError;
use crate::social::activity::WatchActivity;
use crate::social::events::{FriendActivityEntry, Inbound, SocialCommand, SocialEvent};
use crate::store::NewNotification;
use crate::AppState;

/// DM preview length in the persisted notification.
const DM_PREVIEW_CHARS: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new().route("/social", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = prefixed_ulid(prefix::CONNECTION);
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SocialEvent>();
    state.social.register(&conn_id, tx.clone());

    tracing::debug!(%conn_id, "social connection opened");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let inbound: Inbound = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(err) => {
                                tracing::debug!(?err, %conn_id, "unparseable social frame");
                                let _ = tx.send(SocialEvent::error(&PartyError::validation(
                                    "Malformed message",
                                )));
                                continue;
                            }
                        };
                        if let Err(err) = apply(&state, &conn_id, inbound.command).await {
                            // Errors go only to this connection.
                            let _ = tx.send(SocialEvent::error(&err));
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(?err, %conn_id, "social ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if ws_tx.send(Message::Text(event.to_wire().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.social.unregister(&conn_id);
    if let Some(outcome) = state.social.presence.disconnect(&conn_id) {
        if outcome.went_offline {
            user_went_offline(&state, &outcome.user_id).await;
        }
    }
    tracing::debug!(%conn_id, "social connection closed");
}

async fn apply(state: &AppState, conn_id: &str, command: SocialCommand) -> Result<(), PartyError> {
    match command {
        SocialCommand::UserOnline { user_id } => {
            if user_id.is_empty() {
                return Err(PartyError::validation("User id is required"));
            }
            let outcome = state.social.presence.connect(&user_id, conn_id);
            if let Some(previous) = outcome.previous_user_offline {
                user_went_offline(state, &previous).await;
            }
            // Only a genuine 0→1 edge is fanned out; second devices are silent.
            if outcome.came_online {
                tracing::info!(user = %user_id, "user online");
                notify_status(state, &user_id, true).await;
            }
            Ok(())
        }

        SocialCommand::GetOnlineFriends => {
            let user_id = bound_user(state, conn_id)?;
            let friends = state.store.friends_of(&user_id).await?;
            let online_friends: Vec<String> = friends
                .into_iter()
                .filter(|f| state.social.presence.is_online(f))
                .collect();
            state
                .social
                .send_to_conn(conn_id, SocialEvent::FriendsOnlineList { online_friends });
            Ok(())
        }

        SocialCommand::ActivityStart(payload) => {
            let user_id = bound_user(state, conn_id)?;
            let activity = WatchActivity {
                room_code: payload.room_code,
                content_type: payload.content_type,
                content_id: payload.content_id,
                content_title: payload.content_title,
                content_poster: payload.content_poster,
                episode_title: payload.episode_title,
                started_at: Utc::now(),
            };
            state.social.activity.start(&user_id, activity.clone());
            tracing::debug!(user = %user_id, title = %activity.content_title, "activity started");
            broadcast_activity(state, &user_id, Some(activity)).await;
            Ok(())
        }

        SocialCommand::ActivityStop => {
            let user_id = bound_user(state, conn_id)?;
            if state.social.activity.stop(&user_id) {
                broadcast_activity(state, &user_id, None).await;
            }
            Ok(())
        }

        SocialCommand::TypingStart { to_user_id } => {
            let user_id = bound_user(state, conn_id)?;
            state.social.send_to_user(
                &to_user_id,
                &SocialEvent::FriendTyping {
                    friend_id: user_id,
                    is_typing: true,
                },
            );
            Ok(())
        }

        SocialCommand::TypingStop { to_user_id } => {
            let user_id = bound_user(state, conn_id)?;
            state.social.send_to_user(
                &to_user_id,
                &SocialEvent::FriendTyping {
                    friend_id: user_id,
                    is_typing: false,
                },
            );
            Ok(())
        }

        SocialCommand::DmSend {
            to_user_id,
            message,
        } => {
            let from_user_id = bound_user(state, conn_id)?;
            let message = message.trim().to_string();
            if message.is_empty() || to_user_id.is_empty() {
                return Err(PartyError::validation("Recipient and message are required"));
            }

            let id = prefixed_ulid(prefix::MESSAGE);
            let created_at = Utc::now();

            // Real-time delivery to every device of the recipient, plus an
            // echo to the sender for confirmation.
            state.social.send_to_user(
                &to_user_id,
                &SocialEvent::DmReceived {
                    id: id.clone(),
                    from_user_id: from_user_id.clone(),
                    message: message.clone(),
                    created_at,
                },
            );
            state.social.send_to_conn(
                conn_id,
                SocialEvent::DmSent {
                    id,
                    to_user_id: to_user_id.clone(),
                    message: message.clone(),
                    created_at,
                },
            );

            // The persisted notification and its push are best-effort.
            let from_user = match state.store.user_profile(&from_user_id).await {
                Ok(profile) => profile,
                Err(err) => {
                    tracing::warn!(code = err.code(), "profile lookup failed for dm");
                    None
                }
            };
            let sender_name = from_user
                .as_ref()
                .map(|p| p.username.as_str())
                .unwrap_or("Someone");
            let preview = format!("{sender_name}: {}", truncate(&message, DM_PREVIEW_CHARS));
            if let Err(err) = state
                .store
                .create_notification(NewNotification {
                    user_id: &to_user_id,
                    kind: "dm",
                    title: "New Message",
                    message: &preview,
                    data: json!({ "from_user_id": from_user_id }),
                })
                .await
            {
                tracing::warn!(code = err.code(), "failed to persist dm notification");
            }
            state.social.send_to_user(
                &to_user_id,
                &SocialEvent::NotificationNew {
                    kind: "dm".to_string(),
                    from_user,
                    message: truncate(&message, 100),
                },
            );
            Ok(())
        }

        SocialCommand::FriendRequestSent { to_user_id } => {
            let from_user_id = bound_user(state, conn_id)?;
            let from_user = state.store.user_profile(&from_user_id).await?;
            let name = from_user
                .as_ref()
                .map(|p| p.username.as_str())
                .unwrap_or("Someone");
            state.social.send_to_user(
                &to_user_id,
                &SocialEvent::NotificationNew {
                    kind: "friend_request".to_string(),
                    message: format!("{name} sent you a friend request"),
                    from_user,
                },
            );
            Ok(())
        }

        SocialCommand::FriendAccepted { to_user_id } => {
            let from_user_id = bound_user(state, conn_id)?;
            let from_user = state.store.user_profile(&from_user_id).await?;
            let name = from_user
                .as_ref()
                .map(|p| p.username.as_str())
                .unwrap_or("Someone");
            state.social.send_to_user(
                &to_user_id,
                &SocialEvent::NotificationNew {
                    kind: "friend_accepted".to_string(),
                    message: format!("{name} accepted your friend request"),
                    from_user: from_user.clone(),
                },
            );
            // The new friend edge should show up green right away.
            if state.social.presence.is_online(&from_user_id) {
                state.social.send_to_user(
                    &to_user_id,
                    &SocialEvent::FriendOnline {
                        friend_id: from_user_id,
                        username: from_user.as_ref().map(|p| p.username.clone()),
                        avatar_url: from_user.and_then(|p| p.avatar_url),
                    },
                );
            }
            Ok(())
        }

        SocialCommand::GetFriendActivities => {
            let user_id = bound_user(state, conn_id)?;
            let friends = state.store.friends_of(&user_id).await?;

            let mut activities = Vec::new();
            for friend_id in friends {
                if !state.social.presence.is_online(&friend_id) {
                    continue;
                }
                let Some(activity) = state.social.activity.get(&friend_id) else {
                    continue;
                };
                match state.store.user_profile(&friend_id).await {
                    Ok(profile) => {
                        let (username, avatar_url) = profile
                            .map(|p| (p.username, p.avatar_url))
                            .unwrap_or_else(|| ("Unknown".to_string(), None));
                        activities.push(FriendActivityEntry {
                            friend_id,
                            username,
                            avatar_url,
                            activity,
                        });
                    }
                    Err(err) => {
                        // Degrade to a partial list rather than failing the query.
                        tracing::warn!(code = err.code(), friend = %friend_id, "profile lookup failed");
                    }
                }
            }
            state
                .social
                .send_to_conn(conn_id, SocialEvent::FriendsActivities { activities });
            Ok(())
        }
    }
}

/// The user this connection declared with `user:online`.
fn bound_user(state: &AppState, conn_id: &str) -> Result<String, PartyError> {
    state
        .social
        .presence
        .user_of(conn_id)
        .ok_or_else(|| PartyError::state("Declare user:online first"))
}

/// Fan a presence transition out to online friends only; offline friends
/// catch up via `friends:get-online` when they reconnect.
async fn notify_status(state: &AppState, user_id: &str, online: bool) {
    let friends = match state.store.friends_of(user_id).await {
        Ok(friends) => friends,
        Err(err) => {
            tracing::warn!(code = err.code(), user = %user_id, "friend lookup failed");
            return;
        }
    };
    let profile = match state.store.user_profile(user_id).await {
        Ok(profile) => profile,
        Err(_) => None,
    };

    let event = if online {
        SocialEvent::FriendOnline {
            friend_id: user_id.to_string(),
            username: profile.as_ref().map(|p| p.username.clone()),
            avatar_url: profile.and_then(|p| p.avatar_url),
        }
    } else {
        SocialEvent::FriendOffline {
            friend_id: user_id.to_string(),
        }
    };

    for friend_id in friends {
        if state.social.presence.is_online(&friend_id) {
            state.social.send_to_user(&friend_id, &event);
        }
    }
}

async fn broadcast_activity(state: &AppState, user_id: &str, activity: Option<WatchActivity>) {
    let friends = match state.store.friends_of(user_id).await {
        Ok(friends) => friends,
        Err(err) => {
            tracing::warn!(code = err.code(), user = %user_id, "friend lookup failed");
            return;
        }
    };
    let profile = match state.store.user_profile(user_id).await {
        Ok(profile) => profile,
        Err(_) => None,
    };

    let event = SocialEvent::FriendActivity {
        friend_id: user_id.to_string(),
        username: profile.as_ref().map(|p| p.username.clone()),
        avatar_url: profile.and_then(|p| p.avatar_url),
        activity,
    };

    for friend_id in friends {
        if state.social.presence.is_online(&friend_id) {
            state.social.send_to_user(&friend_id, &event);
        }
    }
}

/// Last connection gone: implicit activity stop, then the offline fan-out.
async fn user_went_offline(state: &AppState, user_id: &str) {
    if state.social.activity.stop(user_id) {
        broadcast_activity(state, user_id, None).await;
    }
    notify_status(state, user_id, false).await;
    tracing::info!(user = %user_id, "user offline");
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
