//! Scheduler status HTTP endpoint.
//!
//! GET /api/v1/scheduler/status — returns the current state of the hourly
//! and nightly pipeline loops as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::scheduler::{SchedulerState, SharedSchedulerState};

/// Get the current scheduler status.
///
/// Returns per-city info (last hourly/nightly run and outcome) and global
/// info (next hourly cycle, cycle counters).
#[utoipa::path(
    get,
    path = "/api/v1/scheduler/status",
    tag = "Scheduler",
    responses(
        (status = 200, description = "Current scheduler status", body = SchedulerState),
    )
)]
pub async fn get_scheduler_status(
    State(state): State<SharedSchedulerState>,
) -> Json<SchedulerState> {
    let s = state.read().await;
    Json(s.clone())
}
