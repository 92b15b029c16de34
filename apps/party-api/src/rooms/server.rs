//! WebSocket upgrade handler and per-connection event loop for the
//! watch-room channel.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::PartyError;
use crate::rooms::events::{ClientCommand, Inbound, ServerEvent};
use crate::rooms::registry::DisconnectAction;
use crate::rooms::room::EventSender;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/watch", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// The room this connection currently occupies. A connection is in at most
/// one room at a time.
#[derive(Default)]
struct RoomSession {
    room_code: Option<String>,
    member_id: Option<String>,
}

impl RoomSession {
    fn current(&self) -> Result<(&str, &str), PartyError> {
        match (&self.room_code, &self.member_id) {
            (Some(code), Some(member_id)) => Ok((code, member_id)),
            _ => Err(PartyError::state("Join a room first")),
        }
    }
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut session = RoomSession::default();

    loop {
        tokio::select! {
            // Client sends us a command.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let inbound: Inbound = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(err) => {
                                tracing::debug!(?err, "unparseable watch frame");
                                let _ = tx.send(ServerEvent::error(&PartyError::validation(
                                    "Malformed message",
                                )));
                                continue;
                            }
                        };
                        dispatch(&state, &tx, &mut session, inbound.command);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(?err, "watch ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Room event to forward to this client.
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

    // Transport gone — let the room react (grace window for hosts).
    if let (Some(code), Some(member_id)) = (session.room_code.take(), session.member_id.take()) {
        handle_disconnect(&state, &code, &member_id);
    }
}

/// Route one command to the registry. Errors go back to the originating
/// connection only, never into the room.
fn dispatch(state: &AppState, tx: &EventSender, session: &mut RoomSession, command: ClientCommand) {
    if let Err(err) = apply(state, tx, session, command) {
        tracing::debug!(code = err.code(), message = err.message(), "watch command rejected");
        let _ = tx.send(ServerEvent::error(&err));
    }
}

fn apply(
    state: &AppState,
    tx: &EventSender,
    session: &mut RoomSession,
    command: ClientCommand,
) -> Result<(), PartyError> {
    let now = Utc::now();
    match command {
        ClientCommand::CreateRoom(payload) => {
            leave_current(state, session);
            let member_id = payload.session_id.clone();
            let code = state.rooms.create_room(payload, tx.clone(), now)?;
            session.room_code = Some(code);
            session.member_id = Some(member_id);
            Ok(())
        }
        ClientCommand::JoinRoom(payload) => {
            leave_current(state, session);
            let member_id = payload.session_id.clone();
            let code = state.rooms.join_room(payload, tx.clone(), now)?;
            session.room_code = Some(code);
            session.member_id = Some(member_id);
            Ok(())
        }
        ClientCommand::LeaveRoom => {
            leave_current(state, session);
            Ok(())
        }

        ClientCommand::ChatMessage { message } => {
            let (code, member_id) = session.current()?;
            state.rooms.send_chat(code, member_id, &message)
        }
        ClientCommand::SendReaction { emoji } => {
            let (code, member_id) = session.current()?;
            state.rooms.send_reaction(code, member_id, &emoji)
        }

        ClientCommand::VideoPlay { current_time } => {
            let (code, member_id) = session.current()?;
            state.rooms.video_play(code, member_id, current_time, now)
        }
        ClientCommand::VideoPause { current_time } => {
            let (code, member_id) = session.current()?;
            state.rooms.video_pause(code, member_id, current_time, now)
        }
        ClientCommand::VideoSeek { current_time } => {
            let (code, member_id) = session.current()?;
            state.rooms.video_seek(code, member_id, current_time, now)
        }
        ClientCommand::VideoPlaybackRate { rate } => {
            let (code, member_id) = session.current()?;
            state.rooms.video_playback_rate(code, member_id, rate, now)
        }
        ClientCommand::VideoSubtitle { subtitle_index } => {
            let (code, member_id) = session.current()?;
            state.rooms.video_subtitle(code, member_id, subtitle_index, now)
        }
        ClientCommand::VideoRequestState => {
            let (code, member_id) = session.current()?;
            state.rooms.video_request_state(code, member_id, now)
        }
        ClientCommand::ChangeContent(payload) => {
            let (code, member_id) = session.current()?;
            state.rooms.change_content(code, member_id, payload, now)
        }

        ClientCommand::HostMute {
            target_user_id,
            is_muted,
        } => {
            let (code, member_id) = session.current()?;
            state.rooms.host_mute(code, member_id, &target_user_id, is_muted)
        }
        ClientCommand::RequestUnmute { target_user_id } => {
            let (code, member_id) = session.current()?;
            let request_id = state
                .rooms
                .request_unmute(code, member_id, &target_user_id)?;

            // No answer within the bound counts as a reject.
            let rooms = state.rooms.clone();
            let timeout = Duration::from_secs(state.config.unmute_timeout_secs);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                rooms.expire_unmute(&request_id);
            });
            Ok(())
        }
        ClientCommand::UnmuteResponse {
            request_id,
            accepted,
        } => {
            let (_, member_id) = session.current()?;
            state.rooms.resolve_unmute(member_id, &request_id, accepted)
        }
        ClientCommand::Speaking { is_speaking } => {
            let (code, member_id) = session.current()?;
            state.rooms.set_speaking(code, member_id, is_speaking)
        }

        ClientCommand::CreatePoll {
            question,
            options,
            expires_in_minutes,
        } => {
            let (code, member_id) = session.current()?;
            state
                .rooms
                .create_poll(code, member_id, question, options, expires_in_minutes, now)
        }
        ClientCommand::VotePoll {
            poll_id,
            option_index,
        } => {
            let (code, member_id) = session.current()?;
            state
                .rooms
                .vote_poll(code, member_id, &poll_id, option_index, now)
        }
        ClientCommand::ClosePoll { poll_id } => {
            let (code, member_id) = session.current()?;
            state.rooms.close_poll(code, member_id, &poll_id)
        }
        ClientCommand::GetPolls => {
            let (code, member_id) = session.current()?;
            state.rooms.get_polls(code, member_id, now)
        }
    }
}

/// Leave whatever room the connection is in (explicit leave semantics).
fn leave_current(state: &AppState, session: &mut RoomSession) {
    if let (Some(code), Some(member_id)) = (session.room_code.take(), session.member_id.take()) {
        state.rooms.leave_room(&code, &member_id);
    }
}

/// Transport drop: hosts get a grace window before the room closes.
fn handle_disconnect(state: &AppState, code: &str, member_id: &str) {
    match state.rooms.handle_disconnect(code, member_id, Utc::now()) {
        DisconnectAction::HostClose { grace, epoch } => {
            let rooms = state.rooms.clone();
            let code = code.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                rooms.close_if_host_away(&code, epoch);
            });
        }
        DisconnectAction::None => {}
    }
}
