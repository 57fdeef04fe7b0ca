// SPDX-License-Identifier: MIT

//! Reward eligibility evaluation and the external reward service boundary.
//!
//! `evaluate` is a pure function of the reward mode and the participant's
//! check-in count. Everything stateful (the once-per-tier issuance trigger,
//! the poll cache, back-pressure on upstream queries) lives in
//! `RewardService`.

use crate::db::{MemoryDb, ParticipantKey};
use crate::error::{AppError, Result};
use crate::models::{Activity, RewardApiConfig, RewardMode, RewardRecord, RewardState};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How long a fetched upstream reward list stays fresh. Matched to the
/// client poll interval so back-to-back poll ticks reuse one fetch.
pub const REWARD_CACHE_TTL_SECS: i64 = 3;

/// Compute reward eligibility from the activity's policy and the
/// participant's check-in count.
pub fn evaluate(activity: &Activity, checkin_count: u32) -> RewardState {
    let full = activity.full_slot_count();

    match &activity.reward_mode {
        RewardMode::Full => {
            if checkin_count >= full {
                RewardState::tier(1)
            } else {
                RewardState::none()
            }
        }
        RewardMode::Partial { threshold } => {
            if checkin_count >= *threshold {
                RewardState::tier(1)
            } else {
                RewardState::none()
            }
        }
        RewardMode::TwoTier { threshold } => {
            if checkin_count >= full {
                RewardState::tier(2)
            } else if checkin_count >= *threshold {
                RewardState::tier(1)
            } else {
                RewardState::none()
            }
        }
        RewardMode::MultiTier { thresholds } => {
            let tier = thresholds.iter().filter(|t| **t <= checkin_count).count() as u32;
            RewardState::tier(tier)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// External reward service boundary
// ─────────────────────────────────────────────────────────────────────────────

/// The externally owned reward service: a read-only coupon query plus an
/// issuance trigger. The service owns its own idempotency; our job is to
/// call issue at most once per `(participant, tier)`.
#[async_trait::async_trait]
pub trait RewardBoundary: Send + Sync {
    async fn query(&self, api: &RewardApiConfig, user_id: &str) -> Result<Vec<RewardRecord>>;
    async fn issue(&self, api: &RewardApiConfig, user_id: &str, tier: u32) -> Result<()>;
}

/// HTTP client for the reward service.
pub struct HttpRewardBoundary {
    http: reqwest::Client,
}

impl HttpRewardBoundary {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("http client: {}", e)))?;
        Ok(Self { http })
    }

    /// Substitute the `%{user_id}` placeholder, URL-encoding the id.
    fn expand_template(template: &str, user_id: &str) -> String {
        template.replace("%{user_id}", &urlencoding::encode(user_id))
    }
}

#[async_trait::async_trait]
impl RewardBoundary for HttpRewardBoundary {
    async fn query(&self, api: &RewardApiConfig, user_id: &str) -> Result<Vec<RewardRecord>> {
        let url = Self::expand_template(&api.query_url, user_id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalServiceUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceUnavailable(format!("JSON parse error: {}", e)))
    }

    async fn issue(&self, api: &RewardApiConfig, user_id: &str, tier: u32) -> Result<()> {
        let template = api.issue_url.as_deref().ok_or_else(|| {
            AppError::ExternalServiceUnavailable("no issuance endpoint configured".to_string())
        })?;
        let url = Self::expand_template(template, user_id);

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "tier": tier }))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalServiceUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RewardService - eligibility reads, issuance triggers, poll back-pressure
// ─────────────────────────────────────────────────────────────────────────────

/// Cached upstream reward list with fetch time.
#[derive(Clone)]
struct CachedRewards {
    records: Vec<RewardRecord>,
    fetched_at: DateTime<Utc>,
}

/// Reward status as served to the polling client.
#[derive(Debug, Clone)]
pub struct RewardStatusView {
    pub state: RewardState,
    pub verified: bool,
    /// `None` means the upstream list is currently unknown (boundary not
    /// configured, unavailable, or a fetch is already in flight with no
    /// cached copy) - the poll degrades instead of failing.
    pub rewards: Option<Vec<RewardRecord>>,
}

/// Evaluates eligibility and drives the external reward boundary.
#[derive(Clone)]
pub struct RewardService {
    db: MemoryDb,
    boundary: Arc<dyn RewardBoundary>,
    /// Short-lived cache of upstream reward lists per participant.
    cache: Arc<DashMap<ParticipantKey, CachedRewards>>,
    /// Per-participant fetch locks: at most one in-flight upstream query.
    fetch_locks: Arc<DashMap<ParticipantKey, Arc<Mutex<()>>>>,
}

impl RewardService {
    pub fn new(db: MemoryDb, boundary: Arc<dyn RewardBoundary>) -> Self {
        Self {
            db,
            boundary,
            cache: Arc::new(DashMap::new()),
            fetch_locks: Arc::new(DashMap::new()),
        }
    }

    /// Current eligibility for a participant, from the local ledger only.
    pub fn eligibility(&self, activity: &Activity, device_id: &str) -> RewardState {
        let key = ParticipantKey::new(device_id, &activity.id);
        let count = self.db.checkins_for(&key).len() as u32;
        evaluate(activity, count)
    }

    /// Serve the reward-status poll.
    ///
    /// Back-pressure: if another request for the same participant is
    /// already querying upstream, this one serves the cached copy (or
    /// "unknown") instead of stacking a second in-flight request.
    pub async fn status(
        &self,
        activity: &Activity,
        device_id: &str,
        verified: bool,
        now: DateTime<Utc>,
    ) -> RewardStatusView {
        let state = self.eligibility(activity, device_id);
        let key = ParticipantKey::new(device_id, &activity.id);

        let Some(api) = activity.reward_api.as_ref() else {
            return RewardStatusView {
                state,
                verified,
                rewards: None,
            };
        };

        let rewards = self.fetch_rewards(api, &key, now).await;

        RewardStatusView {
            state,
            verified,
            rewards,
        }
    }

    async fn fetch_rewards(
        &self,
        api: &RewardApiConfig,
        key: &ParticipantKey,
        now: DateTime<Utc>,
    ) -> Option<Vec<RewardRecord>> {
        let ttl = Duration::seconds(REWARD_CACHE_TTL_SECS);

        if let Some(cached) = self.cache.get(key) {
            if now - cached.fetched_at < ttl {
                return Some(cached.records.clone());
            }
        }

        let lock = self
            .fetch_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // Skip the tick rather than queue behind an in-flight fetch.
        let Ok(_guard) = lock.try_lock() else {
            return self.cache.get(key).map(|cached| cached.records.clone());
        };

        match self.boundary.query(api, &key.device_id).await {
            Ok(records) => {
                self.cache.insert(
                    key.clone(),
                    CachedRewards {
                        records: records.clone(),
                        fetched_at: now,
                    },
                );
                Some(records)
            }
            Err(e) => {
                // Degrade to "unknown" - never fail the poll over upstream
                // trouble, and never touch local check-in state.
                tracing::warn!(error = %e, "Reward query failed; serving unknown status");
                self.cache.get(key).map(|cached| cached.records.clone())
            }
        }
    }

    /// Fire the issuance trigger for every tier newly reached.
    ///
    /// Called server-side on each eligibility transition (after a recorded
    /// check-in, and after verification completes). `issuance_permitted`
    /// carries the verification gate's verdict; when false nothing fires.
    /// Failures release the per-tier claim so a later transition retries.
    pub async fn trigger_issuance(
        &self,
        activity: &Activity,
        device_id: &str,
        issuance_permitted: bool,
    ) {
        if !issuance_permitted {
            return;
        }

        let Some(api) = activity.reward_api.as_ref() else {
            return;
        };
        if api.issue_url.is_none() {
            return;
        }

        let state = self.eligibility(activity, device_id);
        if !state.eligible {
            return;
        }

        let key = ParticipantKey::new(device_id, &activity.id);

        // Walk every tier up to the one just reached so a jump straight to
        // tier 2 still issues tier 1.
        for tier in 1..=state.tier {
            if !self.db.mark_tier_issued(&key, tier) {
                continue;
            }

            match self.boundary.issue(api, device_id, tier).await {
                Ok(()) => {
                    tracing::info!(activity_id = %activity.id, tier, "Reward issuance triggered");
                }
                Err(e) => {
                    self.db.unmark_tier_issued(&key, tier);
                    tracing::warn!(
                        activity_id = %activity.id,
                        tier,
                        error = %e,
                        "Reward issuance failed; will retry on next transition"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, VerificationSettings};

    fn activity(reward_mode: RewardMode, locations: usize, limit: u32) -> Activity {
        Activity {
            id: "act-1".to_string(),
            name: "Test".to_string(),
            start_date: "2026-03-01T00:00:00Z".parse().unwrap(),
            end_date: "2026-03-31T00:00:00Z".parse().unwrap(),
            check_in_limit: limit,
            single_location_only: false,
            locations: (0..locations)
                .map(|i| Location {
                    id: format!("loc-{}", i),
                    name: format!("Location {}", i),
                    address: "1 Main St".to_string(),
                    icon: None,
                })
                .collect(),
            is_active: true,
            requires_contact_info: false,
            reward_mode,
            verification: VerificationSettings::default(),
            reward_api: None,
        }
    }

    #[test]
    fn test_full_mode_requires_every_slot() {
        let act = activity(RewardMode::Full, 2, 1);

        assert_eq!(evaluate(&act, 1), RewardState::none());
        assert_eq!(evaluate(&act, 2), RewardState::tier(1));
    }

    #[test]
    fn test_partial_mode_threshold() {
        let act = activity(RewardMode::Partial { threshold: 3 }, 5, 1);

        assert_eq!(evaluate(&act, 2), RewardState::none());
        assert_eq!(evaluate(&act, 3), RewardState::tier(1));
        assert_eq!(evaluate(&act, 5), RewardState::tier(1));
    }

    #[test]
    fn test_two_tier_reports_highest_tier() {
        // threshold 3, full completion 5
        let act = activity(RewardMode::TwoTier { threshold: 3 }, 5, 1);

        assert_eq!(evaluate(&act, 2), RewardState::none());
        assert_eq!(evaluate(&act, 3), RewardState::tier(1));
        assert_eq!(evaluate(&act, 4), RewardState::tier(1));
        assert_eq!(evaluate(&act, 5), RewardState::tier(2));
    }

    #[test]
    fn test_multi_tier_counts_reached_thresholds() {
        let act = activity(
            RewardMode::MultiTier {
                thresholds: vec![2, 4, 6],
            },
            6,
            1,
        );

        assert_eq!(evaluate(&act, 1), RewardState::none());
        assert_eq!(evaluate(&act, 2), RewardState::tier(1));
        assert_eq!(evaluate(&act, 5), RewardState::tier(2));
        assert_eq!(evaluate(&act, 6), RewardState::tier(3));
    }

    #[test]
    fn test_full_mode_single_location_only() {
        let mut act = activity(RewardMode::Full, 3, 2);
        act.single_location_only = true;

        // Full completion is check_in_limit, not limit x locations.
        assert_eq!(evaluate(&act, 1), RewardState::none());
        assert_eq!(evaluate(&act, 2), RewardState::tier(1));
    }

    #[test]
    fn test_url_template_expansion_encodes_user_id() {
        let url = HttpRewardBoundary::expand_template(
            "https://rewards.example/users/%{user_id}",
            "dev/1 x",
        );
        assert_eq!(url, "https://rewards.example/users/dev%2F1%20x");
    }
}
