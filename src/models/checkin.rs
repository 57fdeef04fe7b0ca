// SPDX-License-Identifier: MIT

//! Check-in tokens and the append-only check-in ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short-lived, single-use credential binding one intended check-in
/// attempt to `(device, activity, location)`.
///
/// Not a security credential: it exists to make the check-in POST
/// replay-resistant when the client bounces through the verifying page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinToken {
    pub device_id: String,
    pub activity_id: String,
    pub location_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Opaque random value; also the wire form of the token.
    pub nonce: String,
}

impl CheckinToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// One recorded check-in. Rows are append-only; nothing in this crate
/// ever mutates or deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    /// Check-in ID. Equals the redeemed token's nonce, so a retried
    /// redemption can never mint a second row for the same attempt.
    pub id: String,
    /// Device identity of the participant
    pub temp_user_id: String,
    pub activity_id: String,
    pub location_id: String,
    pub checkin_time: DateTime<Utc>,
    /// Client-supplied metadata (e.g. NFC tag UID)
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_expiry_is_inclusive_of_deadline() {
        let issued: DateTime<Utc> = "2026-03-15T12:00:00Z".parse().unwrap();
        let token = CheckinToken {
            device_id: "d".to_string(),
            activity_id: "a".to_string(),
            location_id: "l".to_string(),
            issued_at: issued,
            expires_at: issued + Duration::minutes(5),
            nonce: "n".to_string(),
        };

        assert!(!token.is_expired(issued));
        assert!(!token.is_expired(issued + Duration::minutes(5)));
        assert!(token.is_expired(issued + Duration::minutes(5) + Duration::seconds(1)));
    }
}
