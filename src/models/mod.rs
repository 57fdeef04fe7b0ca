// SPDX-License-Identifier: MIT

//! Data models for the check-in engine.

pub mod activity;
pub mod checkin;
pub mod contact;
pub mod reward;

pub use activity::{
    Activity, ContactMethod, Location, RewardApiConfig, RewardMode, VerificationSettings,
};
pub use checkin::{CheckIn, CheckinToken};
pub use contact::{ContactInfo, VerificationState};
pub use reward::{CouponInfo, RewardRecord, RewardState, RewardStatus};
