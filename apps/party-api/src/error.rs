use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured API error returned to REST clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error taxonomy shared by the socket channels and the
/// REST surface.
///
/// Socket handlers send these back to the originating connection only; they
/// are never broadcast to a room.
#[derive(Debug, Clone)]
pub enum PartyError {
    /// Malformed input: unknown room code, out-of-range poll option, missing
    /// required field.
    Validation(String),
    /// A non-host issuing a host-only command, or a wrong room password.
    Authorization(String),
    /// A command that conflicts with current state: double vote, joining a
    /// closed room, playback before a schedule has elapsed.
    State(String),
    /// A collaborator lookup failed. Callers degrade to a partial result
    /// rather than failing the whole action.
    Transient(String),
}

impl PartyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Stable machine-readable code, used in socket `error` events and REST
    /// bodies alike.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authorization(_) => "AUTHORIZATION_ERROR",
            Self::State(_) => "STATE_ERROR",
            Self::Transient(_) => "TRANSIENT_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::Authorization(m) | Self::State(m) | Self::Transient(m) => m,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::State(_) => StatusCode::CONFLICT,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for PartyError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code().to_string(),
                message: self.message().to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<reqwest::Error> for PartyError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!(?err, "collaborator request failed");
        Self::Transient("A collaborator service is unavailable".to_string())
    }
}
