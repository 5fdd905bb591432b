//! Request/response surface for match operations.
//!
//! A thin axum router over the match manager: create, join, quickmatch, list,
//! and leave. Identity comes from the same opaque session token as the game
//! channel (session cookie or bearer header). Success bodies include the
//! public address of the persistent channel so clients know where to attach.
//!
//! Errors carry a machine-readable `code` and a human `message`; the status
//! mapping is 400 for validation problems, 404 for unknown matches, 409 for
//! conflicts (already in a match, match full, own match), and 410 for matches
//! no longer joinable.

use crate::auth::{token_from_cookie_header, PlayerIdentity, SessionVerifier};
use crate::error::MatchError;
use crate::manager::{MatchManager, Quickmatch};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use shared::protocol::MatchDescriptor;
use shared::MatchMode;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<MatchManager>,
    pub verifier: Arc<dyn SessionVerifier>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/matches", post(create_match).get(list_matches))
        .route("/matches/quickmatch", post(quickmatch))
        .route("/matches/leave", post(leave_match))
        .route("/matches/:match_id/join", post(join_match))
        .with_state(state)
}

/// Structured error response: stable `code`, human `message`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "missing or invalid session token".to_string(),
        }
    }
}

impl From<MatchError> for ApiError {
    fn from(e: MatchError) -> Self {
        let status = match e {
            MatchError::InvalidMode => StatusCode::BAD_REQUEST,
            MatchError::NotFound => StatusCode::NOT_FOUND,
            MatchError::NotJoinable => StatusCode::GONE,
            MatchError::AlreadyInMatch
            | MatchError::MatchFull
            | MatchError::OwnMatch
            | MatchError::NotInMatch => StatusCode::CONFLICT,
        };
        Self {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "code": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreateRequest {
    mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    match_id: Uuid,
    mode: MatchMode,
    creator_alias: String,
    websocket_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponse {
    match_id: Uuid,
    mode: MatchMode,
    creator_alias: String,
    joiner_alias: String,
    websocket_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuickmatchResponse {
    match_id: Uuid,
    mode: MatchMode,
    player_alias: String,
    opponent_alias: Option<String>,
    websocket_url: String,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    matches: Vec<MatchDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    mode: Option<String>,
}

#[derive(Debug, Serialize)]
struct LeaveResponse {
    success: bool,
}

async fn create_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateRequest>>,
) -> Result<Json<CreateResponse>, ApiError> {
    let identity = authenticate(&headers, state.verifier.as_ref())?;
    let mode = body
        .and_then(|Json(req)| req.mode)
        .as_deref()
        .and_then(MatchMode::parse)
        .ok_or(MatchError::InvalidMode)?;

    let descriptor = state.manager.create(&identity, mode).await?;
    Ok(Json(CreateResponse {
        match_id: descriptor.id,
        mode: descriptor.mode,
        creator_alias: descriptor.player1.username,
        websocket_url: state.manager.config().websocket_url.clone(),
    }))
}

async fn join_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<JoinResponse>, ApiError> {
    let identity = authenticate(&headers, state.verifier.as_ref())?;
    let descriptor = state.manager.join(match_id, &identity).await?;
    Ok(Json(JoinResponse {
        match_id: descriptor.id,
        mode: descriptor.mode,
        creator_alias: descriptor.player1.username,
        joiner_alias: descriptor
            .player2
            .map(|p| p.username)
            .unwrap_or_default(),
        websocket_url: state.manager.config().websocket_url.clone(),
    }))
}

async fn quickmatch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QuickmatchResponse>, ApiError> {
    let identity = authenticate(&headers, state.verifier.as_ref())?;
    let result = state.manager.quickmatch(&identity).await?;
    let descriptor = result.descriptor();
    let opponent_alias = match &result {
        Quickmatch::Joined(d) => Some(d.player1.username.clone()),
        Quickmatch::Created(_) => None,
    };
    Ok(Json(QuickmatchResponse {
        match_id: descriptor.id,
        mode: descriptor.mode,
        player_alias: identity.username,
        opponent_alias,
        websocket_url: state.manager.config().websocket_url.clone(),
    }))
}

async fn list_matches(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    authenticate(&headers, state.verifier.as_ref())?;
    let mode = match query.mode.as_deref() {
        Some(raw) => Some(MatchMode::parse(raw).ok_or(MatchError::InvalidMode)?),
        None => None,
    };
    let matches = state.manager.list_available(mode).await;
    Ok(Json(ListResponse { matches }))
}

async fn leave_match(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LeaveResponse>, ApiError> {
    let identity = authenticate(&headers, state.verifier.as_ref())?;
    state.manager.leave(&identity.id).await;
    Ok(Json(LeaveResponse { success: true }))
}

/// Resolves the caller's identity from the session cookie or bearer header.
fn authenticate(
    headers: &HeaderMap,
    verifier: &dyn SessionVerifier,
) -> Result<PlayerIdentity, ApiError> {
    let token = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(token_from_cookie_header)
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::to_string))
        });

    token
        .and_then(|t| verifier.resolve(&t))
        .ok_or_else(ApiError::unauthorized)
}
