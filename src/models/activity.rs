// SPDX-License-Identifier: MIT

//! Activity (campaign) and location configuration.
//!
//! Activities are read-only from the engine's perspective: they are
//! loaded from the catalog at startup and only the admin surface
//! (outside this crate) ever edits them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A check-in campaign with one or more locations and a reward policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Activity ID (stable slug, used in URLs)
    pub id: String,
    /// Display name
    pub name: String,
    /// Campaign window start (UTC)
    pub start_date: DateTime<Utc>,
    /// Campaign window end (UTC)
    pub end_date: DateTime<Utc>,
    /// Max check-ins per location per participant
    pub check_in_limit: u32,
    /// Restrict participation to one location
    #[serde(default)]
    pub single_location_only: bool,
    /// Participating locations (ordered, unique ids)
    pub locations: Vec<Location>,
    /// Kill switch, independent of the time window
    pub is_active: bool,
    /// Whether contact info must be collected after check-in
    #[serde(default)]
    pub requires_contact_info: bool,
    /// How accumulated check-ins translate into reward eligibility
    pub reward_mode: RewardMode,
    /// Contact verification behaviour
    #[serde(default)]
    pub verification: VerificationSettings,
    /// External reward issuance/query endpoints
    #[serde(default)]
    pub reward_api: Option<RewardApiConfig>,
}

impl Activity {
    /// Number of check-in slots a participant must fill for full completion.
    pub fn full_slot_count(&self) -> u32 {
        if self.single_location_only {
            self.check_in_limit
        } else {
            self.check_in_limit * self.locations.len() as u32
        }
    }

    /// Look up a location belonging to this activity.
    pub fn location(&self, location_id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == location_id)
    }

    /// Whether the activity accepts check-ins at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now >= self.start_date && now <= self.end_date
    }
}

/// A physical check-in location within an activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Location ID (unique within the activity)
    pub id: String,
    /// Display name
    pub name: String,
    /// Street address
    pub address: String,
    /// Custom check-in icon URL
    #[serde(default)]
    pub icon: Option<String>,
}

/// Reward policy, a closed set of modes.
///
/// Evaluation lives in `services::rewards`; keeping the dispatch here as a
/// tagged enum means no caller ever switches on a mode string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RewardMode {
    /// Eligible only when every slot is filled.
    Full,
    /// Eligible at a single threshold.
    Partial { threshold: u32 },
    /// Tier 1 at the threshold, tier 2 at full completion.
    TwoTier { threshold: u32 },
    /// Generalized tiers; `thresholds` must be strictly increasing.
    MultiTier { thresholds: Vec<u32> },
}

/// Contact verification settings for an activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSettings {
    /// Whether submitted contact info gets a code challenge
    #[serde(default)]
    pub enabled: bool,
    /// Whether reward issuance is gated on a verified contact
    #[serde(default)]
    pub required: bool,
    /// Accepted contact methods
    #[serde(default)]
    pub methods: Vec<ContactMethod>,
}

/// Contact channel for verification codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    Phone,
    Email,
}

impl std::fmt::Display for ContactMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactMethod::Phone => write!(f, "phone"),
            ContactMethod::Email => write!(f, "email"),
        }
    }
}

/// External reward service endpoints.
///
/// URL templates carry a `%{user_id}` placeholder that is substituted
/// (URL-encoded) per participant. The query endpoint is read-only and owned
/// by the external service; we treat its response shape as a fixed contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardApiConfig {
    /// Query endpoint template, e.g. `https://rewards.example/users/%{user_id}`
    pub query_url: String,
    /// Issuance endpoint template; absent means query-only
    #[serde(default)]
    pub issue_url: Option<String>,
}
