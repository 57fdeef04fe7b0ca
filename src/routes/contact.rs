// SPDX-License-Identifier: MIT

//! Contact submission and verification endpoints.

use crate::error::{AppError, Result};
use crate::middleware::identity::DeviceIdentity;
use crate::models::ContactMethod;
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
        .route("/api/activities/{activity_id}/contact", post(submit_contact))
        .route(
            "/api/activities/{activity_id}/contact/verify",
            post(verify_code),
        )
        .route(
            "/api/activities/{activity_id}/contact/resend",
            post(resend_code),
        )
}

#[derive(Deserialize)]
struct ContactRequest {
    phone: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
pub struct ContactResponse {
    pub verification_required: bool,
}

/// Submit contact details for the participant.
async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Extension(device): Extension<DeviceIdentity>,
    Path(activity_id): Path<String>,
    Json(body): Json<ContactRequest>,
) -> Result<Json<ContactResponse>> {
    let activity = state
        .catalog
        .get(&activity_id)
        .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;

    let outcome = state
        .verification
        .submit_contact(
            activity,
            &device.device_id,
            body.phone,
            body.email,
            chrono::Utc::now(),
        )
        .await?;

    Ok(Json(ContactResponse {
        verification_required: outcome.verification_required,
    }))
}

#[derive(Deserialize)]
struct VerifyRequest {
    code: String,
    method: ContactMethod,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub message: String,
}

/// Present a verification code.
async fn verify_code(
    State(state): State<Arc<AppState>>,
    Extension(device): Extension<DeviceIdentity>,
    Path(activity_id): Path<String>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let activity = state
        .catalog
        .get(&activity_id)
        .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;

    state.verification.verify_code(
        activity,
        &device.device_id,
        &body.code,
        body.method,
        chrono::Utc::now(),
    )?;

    // Verification may complete after the last check-in, so this is the
    // second place an eligibility transition can happen.
    let permitted = state
        .verification
        .issuance_permitted(activity, &device.device_id);
    state
        .rewards
        .trigger_issuance(activity, &device.device_id, permitted)
        .await;

    Ok(Json(VerifyResponse {
        verified: true,
        message: "Contact verified".to_string(),
    }))
}

#[derive(Deserialize)]
struct ResendRequest {
    method: ContactMethod,
}

#[derive(Serialize)]
pub struct ResendResponse {
    pub sent: bool,
    pub message: String,
}

/// Redispatch a verification code after the cooldown.
async fn resend_code(
    State(state): State<Arc<AppState>>,
    Extension(device): Extension<DeviceIdentity>,
    Path(activity_id): Path<String>,
    Json(body): Json<ResendRequest>,
) -> Result<Json<ResendResponse>> {
    let activity = state
        .catalog
        .get(&activity_id)
        .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;

    state
        .verification
        .resend(activity, &device.device_id, body.method, chrono::Utc::now())
        .await?;

    Ok(Json(ResendResponse {
        sent: true,
        message: format!("Verification code sent via {}", body.method),
    }))
}
