// SPDX-License-Identifier: MIT

//! Contact info and the verification sub-state machine.

use crate::models::activity::ContactMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Verification state per `(device, activity)`.
///
/// `Unsubmitted` is represented by the absence of a `ContactInfo` record;
/// the other two states live on the record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Unsubmitted,
    PendingVerification,
    Verified,
}

/// Participant-supplied contact details, keyed by `(device, activity)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub temp_user_id: String,
    pub activity_id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Flips to true only via the verification gate
    pub verified: bool,
    /// Outstanding verification code (single-use)
    pub verification_code: Option<String>,
    /// Channels the outstanding code was dispatched on
    pub code_methods: Vec<ContactMethod>,
    pub code_expires_at: Option<DateTime<Utc>>,
    /// Per-method resend cooldown deadlines
    pub resend_available_at: HashMap<ContactMethod, DateTime<Utc>>,
}

impl ContactInfo {
    pub fn state(&self) -> VerificationState {
        if self.verified {
            VerificationState::Verified
        } else {
            VerificationState::PendingVerification
        }
    }

    /// Destination string for a given method, if the participant supplied it.
    pub fn destination(&self, method: ContactMethod) -> Option<&str> {
        match method {
            ContactMethod::Phone => self.phone.as_deref(),
            ContactMethod::Email => self.email.as_deref(),
        }
    }
}
