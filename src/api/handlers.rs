use super::sessions::{Pick, SessionSummary};
use super::ApiState;
use crate::error::Error;
use crate::process::{CancelOutcome, LoggingOutputHandler, ManagedProcessInfo, SessionRequest, StartedSession};
use crate::record::{Record, Role};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

/// Error response body `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::IdentityTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::IdentityNotObtained { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", e);
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvents {
    pub session_id: String,
    pub events: Vec<Record>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub session_id: String,
    pub message: Record,
}

#[derive(Debug, Deserialize)]
pub struct NewSessionBody {
    pub prompt: Option<String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
    pub prompt: Option<String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
    pub session_id: String,
    pub pid: u32,
}

fn require_prompt(prompt: Option<String>) -> Result<String, ApiError> {
    prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("prompt is required"))
}

fn session_request(state: &ApiState, prompt: String, cwd: Option<PathBuf>) -> SessionRequest {
    let mut request =
        SessionRequest::new(prompt).allowed_tools(&state.send.default_allowed_tools);
    if let Some(cwd) = cwd {
        request = request.cwd(cwd);
    }
    request
}

pub async fn list_sessions(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<SessionSummary>> {
    Ok(Json(state.sessions.list().await?))
}

pub async fn session_messages(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<SessionEvents> {
    let events = state.sessions.records(&id).await?;
    Ok(Json(SessionEvents {
        session_id: id,
        events,
    }))
}

pub async fn session_message(
    State(state): State<Arc<ApiState>>,
    Path((id, role, which)): Path<(String, String, String)>,
) -> ApiResult<SessionMessage> {
    let role: Role = role.parse().map_err(ApiError::bad_request)?;
    let pick: Pick = which.parse().map_err(ApiError::bad_request)?;
    let message = state.sessions.message(&id, role, pick).await?;
    Ok(Json(SessionMessage {
        session_id: id,
        message,
    }))
}

pub async fn new_session(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<NewSessionBody>,
) -> ApiResult<StartedSession> {
    let prompt = require_prompt(body.prompt)?;
    let request = session_request(&state, prompt, body.cwd);
    let handler = Arc::new(LoggingOutputHandler::new("new-session"));

    let started = state.registry.start_new_session(request, handler).await?;
    Ok(Json(started))
}

pub async fn send_to_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<SendBody>,
) -> ApiResult<StartedSession> {
    let prompt = require_prompt(body.prompt)?;
    let request = session_request(&state, prompt, body.cwd);
    let handler = Arc::new(LoggingOutputHandler::new(format!("session {id}")));

    let started = state.registry.send_to_session(&id, request, handler).await?;
    Ok(Json(started))
}

pub async fn cancel_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<CancelResponse> {
    match state.canceller.cancel(&id).await {
        CancelOutcome::Initiated { session_id, pid } => Ok(Json(CancelResponse {
            cancelled: true,
            session_id,
            pid,
        })),
        CancelOutcome::NotFound => {
            warn!("Cancel requested for unmanaged session {}", id);
            Err(ApiError::not_found("Session not found or not managed"))
        }
    }
}

pub async fn list_managed(State(state): State<Arc<ApiState>>) -> Json<Vec<ManagedProcessInfo>> {
    Json(state.registry.list().await)
}

pub async fn get_managed(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<ManagedProcessInfo> {
    state
        .registry
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Session {id} is not managed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status_of(e: Error) -> StatusCode {
        ApiError::from(e).status
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(Error::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::IdentityTimeout {
                pid: 1,
                timeout: Duration::from_secs(1)
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(Error::IdentityNotObtained { pid: 1 }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(Error::Spawn {
                program: "claude".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_prompt_is_required() {
        assert!(require_prompt(None).is_err());
        assert!(require_prompt(Some("   ".into())).is_err());
        assert_eq!(require_prompt(Some("hi".into())).unwrap(), "hi");
    }
}
