// SPDX-License-Identifier: MIT

//! Token issuance and check-in admission endpoints.

use crate::error::{AppError, Result};
use crate::middleware::identity::DeviceIdentity;
use crate::models::{CheckIn, RewardState, VerificationState};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/activities/{activity_id}/locations/{location_id}/token",
            post(issue_token),
        )
        .route("/api/activities/{activity_id}/check-in", post(check_in))
}

// ─── Token Issuance ──────────────────────────────────────────

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: String,
}

/// Issue a single-use check-in token for `(device, activity, location)`.
async fn issue_token(
    State(state): State<Arc<AppState>>,
    Extension(device): Extension<DeviceIdentity>,
    Path((activity_id, location_id)): Path<(String, String)>,
) -> Result<Json<TokenResponse>> {
    let activity = state
        .catalog
        .get(&activity_id)
        .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;

    let token = state
        .issuer
        .issue(activity, &location_id, &device.device_id, chrono::Utc::now())?;

    Ok(Json(TokenResponse {
        token: token.nonce,
        expires_at: format_utc_rfc3339(token.expires_at),
    }))
}

// ─── Check-in Admission ──────────────────────────────────────

#[derive(Deserialize)]
struct CheckInRequest {
    location_id: String,
    token: String,
    /// Free-form client metadata (e.g. NFC tag UID)
    #[serde(default)]
    meta: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct CheckInView {
    pub id: String,
    pub activity_id: String,
    pub location_id: String,
    pub checkin_time: String,
}

impl From<CheckIn> for CheckInView {
    fn from(check_in: CheckIn) -> Self {
        Self {
            id: check_in.id,
            activity_id: check_in.activity_id,
            location_id: check_in.location_id,
            checkin_time: format_utc_rfc3339(check_in.checkin_time),
        }
    }
}

#[derive(Serialize)]
pub struct CheckInResponse {
    pub check_in: CheckInView,
    /// Signals the client to branch into the contact flow
    pub contact_required: bool,
    pub reward: RewardState,
}

/// Redeem a token and record a check-in.
async fn check_in(
    State(state): State<Arc<AppState>>,
    Extension(device): Extension<DeviceIdentity>,
    Path(activity_id): Path<String>,
    Json(body): Json<CheckInRequest>,
) -> Result<Json<CheckInResponse>> {
    let activity = state
        .catalog
        .get(&activity_id)
        .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;

    let now = chrono::Utc::now();
    let check_in = state
        .admission
        .admit(
            activity,
            &body.location_id,
            &device.device_id,
            &body.token,
            body.meta,
            now,
        )
        .await?;

    // Issuance fires here, server-side, on the eligibility transition -
    // the client never has to open the reward panel for it to happen.
    let permitted = state
        .verification
        .issuance_permitted(activity, &device.device_id);
    state
        .rewards
        .trigger_issuance(activity, &device.device_id, permitted)
        .await;

    let contact_required = activity.requires_contact_info
        && state.verification.state(&device.device_id, &activity.id)
            != VerificationState::Verified;

    Ok(Json(CheckInResponse {
        check_in: check_in.into(),
        contact_required,
        reward: state.rewards.eligibility(activity, &device.device_id),
    }))
}
