//! Public watch-room listing.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::rooms::registry::RoomSummary;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/watch-rooms", get(list_watch_rooms))
}

// ---------------------------------------------------------------------------
// GET /api/watch-rooms
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/watch-rooms",
    tag = "Watch Rooms",
    responses(
        (status = 200, description = "Public rooms currently open", body = Vec<RoomSummary>),
    ),
)]
pub async fn list_watch_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.rooms.active_rooms())
}
