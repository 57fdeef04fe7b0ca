// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod admission;
pub mod catalog;
pub mod rewards;
pub mod tokens;
pub mod verification;

pub use admission::AdmissionEngine;
pub use catalog::{ActivityCatalog, CatalogError};
pub use rewards::{evaluate, HttpRewardBoundary, RewardBoundary, RewardService, RewardStatusView};
pub use tokens::TokenIssuer;
pub use verification::{CodeDispatcher, LogDispatcher, VerificationGate};
