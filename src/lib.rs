// SPDX-License-Identifier: MIT

//! Stamp-Rally: check-in admission and reward-eligibility engine
//!
//! Participants tap an NFC tag at a physical location, redeem a
//! single-use token, and accumulate check-ins toward a reward. This crate
//! is the admission/eligibility core behind that flow; page rendering,
//! admin CRUD and analytics live elsewhere.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::MemoryDb;
use middleware::identity::DeviceIdentityProvider;
use services::{ActivityCatalog, AdmissionEngine, RewardService, TokenIssuer, VerificationGate};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: MemoryDb,
    pub catalog: ActivityCatalog,
    pub identity: Arc<dyn DeviceIdentityProvider>,
    pub issuer: TokenIssuer,
    pub admission: AdmissionEngine,
    pub verification: VerificationGate,
    pub rewards: RewardService,
}
