// SPDX-License-Identifier: MIT

//! Check-in admission engine.
//!
//! The one place where a race is unacceptable: two tabs redeeming
//! near-simultaneously must not both get past the check-in limit. All
//! admission attempts for a `(device, activity)` pair run under a shared
//! async mutex, so token redemption and ledger insertion form a single
//! all-or-nothing step relative to any concurrent attempt.
//!
//! A single attempt moves `TokenIssued -> Redeeming -> {Recorded | Rejected}`.
//! Terminal states are final: every rejection consumes the token and a
//! retry needs a fresh one.

use crate::db::{MemoryDb, ParticipantKey, SlotKey};
use crate::error::{AppError, Result};
use crate::models::{Activity, CheckIn};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-participant admission locks, shared across handler invocations.
type AdmissionLocks = Arc<DashMap<ParticipantKey, Arc<Mutex<()>>>>;

/// Validates token-bearing check-in requests and records check-ins.
#[derive(Clone)]
pub struct AdmissionEngine {
    db: MemoryDb,
    locks: AdmissionLocks,
}

impl AdmissionEngine {
    pub fn new(db: MemoryDb) -> Self {
        Self {
            db,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Redeem a token and record the check-in.
    ///
    /// Steps, all under the participant lock:
    /// 1. consume the live token (nonce must match, not expired)
    /// 2. re-validate the activity window and active flag
    /// 3. re-validate the limit and single-location invariants
    /// 4. append the check-in, keyed by the token nonce
    pub async fn admit(
        &self,
        activity: &Activity,
        location_id: &str,
        device_id: &str,
        presented_nonce: &str,
        meta: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<CheckIn> {
        let participant = ParticipantKey::new(device_id, &activity.id);

        let lock = self
            .locks
            .entry(participant.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let slot = SlotKey::new(device_id, &activity.id, location_id);

        // Consuming the token up front makes every rejection below terminal
        // for this token, matching the no-retry-in-place state machine.
        let token = self
            .db
            .take_token(&slot, presented_nonce)
            .ok_or(AppError::InvalidToken)?;

        if token.is_expired(now) {
            tracing::debug!(activity_id = %activity.id, "Token expired at redemption");
            return Err(AppError::InvalidToken);
        }

        // Time may have advanced since issuance; the issuer's check was
        // only the optimistic half.
        if !activity.is_open(now) {
            return Err(AppError::ActivityNotEligible(
                "activity is inactive or outside its time window".to_string(),
            ));
        }

        if activity.location(location_id).is_none() {
            return Err(AppError::LocationNotFound(format!(
                "location {} is not part of activity {}",
                location_id, activity.id
            )));
        }

        if self.db.count_for_slot(&slot) >= activity.check_in_limit {
            return Err(AppError::LimitExceeded);
        }

        if activity.single_location_only {
            let visited = self.db.distinct_locations(&participant);
            if !visited.is_empty() && !visited.contains(location_id) {
                return Err(AppError::SingleLocationViolation);
            }
        }

        let check_in = CheckIn {
            // Keyed by the token nonce: one token can never mint two rows.
            id: token.nonce.clone(),
            temp_user_id: device_id.to_string(),
            activity_id: activity.id.clone(),
            location_id: location_id.to_string(),
            checkin_time: now,
            meta,
        };
        self.db.append_checkin(check_in.clone());

        tracing::info!(
            activity_id = %activity.id,
            location_id,
            check_in_id = %check_in.id,
            "Check-in recorded"
        );

        Ok(check_in)
    }
}
