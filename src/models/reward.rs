// SPDX-License-Identifier: MIT

//! Reward eligibility state and the external reward service's wire shapes.

use serde::{Deserialize, Serialize};

/// Derived reward eligibility; computed on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardState {
    pub eligible: bool,
    /// Highest tier reached; 0 when not eligible
    pub tier: u32,
}

impl RewardState {
    pub fn none() -> Self {
        Self {
            eligible: false,
            tier: 0,
        }
    }

    pub fn tier(tier: u32) -> Self {
        Self {
            eligible: tier > 0,
            tier,
        }
    }
}

/// One coupon record as returned by the external reward service.
///
/// This shape is owned by that service; the field names below are its
/// contract, not ours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRecord {
    pub id: String,
    pub code: String,
    pub status: RewardStatus,
    pub coupon: CouponInfo,
}

/// Coupon lifecycle status at the external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardStatus {
    Pending,
    Used,
    Cancelled,
}

/// Coupon display data from the external service (camelCase on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponInfo {
    pub name: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub ended_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_record_parses_external_shape() {
        let body = r#"[{
            "id": "rw-1",
            "code": "ABCD-1234",
            "status": "PENDING",
            "coupon": {
                "name": "Free coffee",
                "imageUrl": "https://cdn.example/coffee.png",
                "description": "One free americano",
                "endedDate": "2026-04-30"
            }
        }]"#;

        let records: Vec<RewardRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RewardStatus::Pending);
        assert_eq!(records[0].coupon.name, "Free coffee");
        assert_eq!(
            records[0].coupon.image_url.as_deref(),
            Some("https://cdn.example/coffee.png")
        );
    }
}
