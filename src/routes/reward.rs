// SPDX-License-Identifier: MIT

//! Reward status endpoint (polled by the client).

use crate::error::{AppError, Result};
use crate::middleware::identity::DeviceIdentity;
use crate::models::RewardRecord;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/activities/{activity_id}/reward", get(reward_status))
}

#[derive(Serialize)]
pub struct RewardStatusResponse {
    pub eligible: bool,
    pub tier: u32,
    pub verified: bool,
    /// Absent when the upstream reward list is currently unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewards: Option<Vec<RewardRecord>>,
}

/// Read-only reward status for the polling client.
///
/// Repeated identical calls are side-effect free; issuance is triggered
/// elsewhere (on the check-in and verification transitions).
async fn reward_status(
    State(state): State<Arc<AppState>>,
    Extension(device): Extension<DeviceIdentity>,
    Path(activity_id): Path<String>,
) -> Result<Json<RewardStatusResponse>> {
    let activity = state
        .catalog
        .get(&activity_id)
        .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;

    let verified = state
        .verification
        .issuance_permitted(activity, &device.device_id);

    let view = state
        .rewards
        .status(activity, &device.device_id, verified, chrono::Utc::now())
        .await;

    Ok(Json(RewardStatusResponse {
        eligible: view.state.eligible,
        tier: view.state.tier,
        verified: view.verified,
        rewards: view.rewards,
    }))
}
