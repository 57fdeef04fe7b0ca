// SPDX-License-Identifier: MIT

//! Shared test fixtures: activity builders, recording fakes for the
//! external boundaries, and a full test app.

use stamp_rally::config::Config;
use stamp_rally::db::MemoryDb;
use stamp_rally::error::{AppError, Result};
use stamp_rally::middleware::identity::StoredIdentityProvider;
use stamp_rally::models::{
    Activity, ContactMethod, Location, RewardApiConfig, RewardMode, RewardRecord,
    VerificationSettings,
};
use stamp_rally::routes::create_router;
use stamp_rally::services::{
    ActivityCatalog, AdmissionEngine, CodeDispatcher, RewardBoundary, RewardService, TokenIssuer,
    VerificationGate,
};
use stamp_rally::AppState;
use std::sync::{Arc, Mutex};

/// A `now` inside every test activity's window.
#[allow(dead_code)]
pub fn test_now() -> chrono::DateTime<chrono::Utc> {
    "2026-03-15T12:00:00Z".parse().unwrap()
}

/// Activity builder with sensible defaults; tweak fields per test.
#[allow(dead_code)]
pub fn make_activity(
    id: &str,
    check_in_limit: u32,
    location_count: usize,
    reward_mode: RewardMode,
) -> Activity {
    Activity {
        id: id.to_string(),
        name: format!("Activity {}", id),
        start_date: "2026-03-01T00:00:00Z".parse().unwrap(),
        end_date: "2099-12-31T23:59:59Z".parse().unwrap(),
        check_in_limit,
        single_location_only: false,
        locations: (0..location_count)
            .map(|i| Location {
                id: format!("loc-{}", i),
                name: format!("Location {}", i),
                address: format!("{} Main St", i + 1),
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

#[allow(dead_code)]
pub fn reward_api() -> RewardApiConfig {
    RewardApiConfig {
        query_url: "https://rewards.test/users/%{user_id}".to_string(),
        issue_url: Some("https://rewards.test/users/%{user_id}/issue".to_string()),
    }
}

// ─── Recording fakes for the external boundaries ─────────────

/// Captures dispatched verification codes so tests can read them back.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<(ContactMethod, String, String)>>,
    pub fail: Mutex<bool>,
}

impl RecordingDispatcher {
    #[allow(dead_code)]
    pub fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, code)| code.clone())
    }

    #[allow(dead_code)]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait::async_trait]
impl CodeDispatcher for RecordingDispatcher {
    async fn dispatch(&self, method: ContactMethod, destination: &str, code: &str) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::ExternalServiceUnavailable(
                "delivery down".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap()
            .push((method, destination.to_string(), code.to_string()));
        Ok(())
    }
}

/// Records issuance triggers; serves a canned (or failing) query response.
#[derive(Default)]
pub struct RecordingRewardBoundary {
    pub issued: Mutex<Vec<(String, u32)>>,
    pub records: Mutex<Vec<RewardRecord>>,
    pub fail: Mutex<bool>,
}

impl RecordingRewardBoundary {
    #[allow(dead_code)]
    pub fn issued_tiers(&self) -> Vec<(String, u32)> {
        self.issued.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait::async_trait]
impl RewardBoundary for RecordingRewardBoundary {
    async fn query(&self, _api: &RewardApiConfig, _user_id: &str) -> Result<Vec<RewardRecord>> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::ExternalServiceUnavailable(
                "boundary down".to_string(),
            ));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn issue(&self, _api: &RewardApiConfig, user_id: &str, tier: u32) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::ExternalServiceUnavailable(
                "boundary down".to_string(),
            ));
        }
        self.issued
            .lock()
            .unwrap()
            .push((user_id.to_string(), tier));
        Ok(())
    }
}

// ─── Full test app ───────────────────────────────────────────

#[allow(dead_code)]
pub struct TestApp {
    pub app: axum::Router,
    pub state: Arc<AppState>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub boundary: Arc<RecordingRewardBoundary>,
}

/// Build a router + state over the given activities, with recording fakes
/// wired in for both external boundaries.
#[allow(dead_code)]
pub fn create_test_app(activities: Vec<Activity>) -> TestApp {
    let catalog = ActivityCatalog::from_activities(activities).expect("valid test catalog");
    let db = MemoryDb::new();
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let boundary = Arc::new(RecordingRewardBoundary::default());

    let state = Arc::new(AppState {
        config: Config::test_default(),
        db: db.clone(),
        catalog,
        identity: Arc::new(StoredIdentityProvider::new(db.clone())),
        issuer: TokenIssuer::new(db.clone()),
        admission: AdmissionEngine::new(db.clone()),
        verification: VerificationGate::new(db.clone(), dispatcher.clone()),
        rewards: RewardService::new(db, boundary.clone()),
    });

    TestApp {
        app: create_router(state.clone()),
        state,
        dispatcher,
        boundary,
    }
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
