// SPDX-License-Identifier: MIT

//! Check-in token issuance.
//!
//! Issues short-lived, single-use tokens bound to
//! `(device, activity, location)`. Issuing for a slot replaces any prior
//! unredeemed token for that slot, so at most one token is live per slot
//! and a losing concurrent issuance simply fails redemption later.

use crate::db::{MemoryDb, SlotKey};
use crate::error::{AppError, Result};
use crate::models::{Activity, CheckinToken};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};

/// Token lifetime. Long enough to survive the intermediate verifying
/// page, short enough that abandoned tokens age out quickly.
pub const TOKEN_TTL_SECS: i64 = 5 * 60;

const NONCE_BYTES: usize = 16;

/// Issues check-in tokens after optimistic precondition checks.
#[derive(Clone)]
pub struct TokenIssuer {
    db: MemoryDb,
    rng: SystemRandom,
}

impl TokenIssuer {
    pub fn new(db: MemoryDb) -> Self {
        Self {
            db,
            rng: SystemRandom::new(),
        }
    }

    /// Issue a token for one intended check-in attempt.
    ///
    /// The checks here fail fast for UX; the admission engine re-runs them
    /// authoritatively at redemption time.
    pub fn issue(
        &self,
        activity: &Activity,
        location_id: &str,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CheckinToken> {
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

        let slot = SlotKey::new(device_id, &activity.id, location_id);
        if self.db.count_for_slot(&slot) >= activity.check_in_limit {
            return Err(AppError::LimitExceeded);
        }

        let token = CheckinToken {
            device_id: device_id.to_string(),
            activity_id: activity.id.clone(),
            location_id: location_id.to_string(),
            issued_at: now,
            expires_at: now + Duration::seconds(TOKEN_TTL_SECS),
            nonce: self.generate_nonce()?,
        };

        self.db.put_token(token.clone());

        tracing::debug!(
            activity_id = %activity.id,
            location_id,
            "Issued check-in token"
        );

        Ok(token)
    }

    fn generate_nonce(&self) -> Result<String> {
        let mut bytes = [0u8; NONCE_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("system RNG failure")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}
