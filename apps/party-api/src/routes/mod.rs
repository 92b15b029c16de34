pub mod health;
pub mod watch_rooms;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(watch_rooms::router())
        .merge(crate::rooms::server::router())
        .merge(crate::social::server::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        watch_rooms::list_watch_rooms,
    ),
    components(schemas(
        crate::rooms::registry::RoomSummary,
        crate::error::ApiErrorBody,
    )),
    info(
        title = "Watchtide Party API",
        description = "REST surface of the watch-party service. Real-time traffic goes over the /watch and /social WebSocket channels."
    )
)]
pub struct ApiDoc;
