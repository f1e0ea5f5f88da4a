//! Admin HTTP surface for a running elector.
//!
//! Read-only views of the locally observed election state plus a
//! resignation trigger.  None of these routes touch storage directly; they
//! go through the [`Elector`](crate::Elector) query and resign operations.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::ElectionError;
use crate::metrics::metrics_handler;
use crate::record::Member;
use crate::AppState;

/// Build the admin [`Router`].
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/leader", get(get_leader))
        .route("/members", get(get_members))
        .route("/status", get(get_status))
        .route("/resign", post(resign));
    if state.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }
    router.with_state(state).layer(TraceLayer::new_for_http())
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Queries -------------------------------------------------------------------

/// `GET /leader` -- The leader with a valid lease, or 404.
async fn get_leader(State(state): State<Arc<AppState>>) -> Response {
    match state.elector.leader() {
        Some(leader) => Json(leader).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "code": "NoLeader",
                "message": "no leader with a valid lease",
            })),
        )
            .into_response(),
    }
}

/// `GET /members` -- Every member of the last observed record.
async fn get_members(State(state): State<Arc<AppState>>) -> Json<Vec<Member>> {
    Json(state.elector.members())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub id: String,
    pub is_leader: bool,
    pub leader_id: Option<String>,
    pub members: usize,
}

/// `GET /status` -- A one-line summary of this elector's view.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let elector = &state.elector;
    Json(StatusResponse {
        id: elector.id().to_string(),
        is_leader: elector.is_leader(),
        leader_id: elector.leader().map(|m| m.id),
        members: elector.members().len(),
    })
}

// -- Resignation ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResignParams {
    /// Defaults to one lease duration.
    cooldown_ms: Option<u64>,
}

/// `POST /resign?cooldown_ms=N` -- Step down and refuse leadership for the
/// cooldown.
async fn resign(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResignParams>,
) -> Result<Response, ElectionError> {
    let cooldown = params
        .cooldown_ms
        .map(Duration::from_millis)
        .unwrap_or(state.elector.config().lease_duration);
    info!(cooldown = ?cooldown, "resign requested via admin api");
    state.elector.resign_leader(cooldown).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "resigned",
            "cooldown_ms": u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
        })),
    )
        .into_response())
}
