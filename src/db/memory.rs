// SPDX-License-Identifier: MIT

//! In-memory state store backed by `DashMap`.
//!
//! Holds the mutable participant state: live tokens, the append-only
//! check-in ledger, contact info, issued reward tiers, and known device
//! ids. Each method is individually atomic; the admission engine layers
//! a per-participant lock on top for multi-step sequences.

use crate::models::{CheckIn, CheckinToken, ContactInfo};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Join key for participant-scoped state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantKey {
    pub device_id: String,
    pub activity_id: String,
}

impl ParticipantKey {
    pub fn new(device_id: &str, activity_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            activity_id: activity_id.to_string(),
        }
    }
}

/// Key for one check-in slot: `(device, activity, location)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub device_id: String,
    pub activity_id: String,
    pub location_id: String,
}

impl SlotKey {
    pub fn new(device_id: &str, activity_id: &str, location_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            activity_id: activity_id.to_string(),
            location_id: location_id.to_string(),
        }
    }

    pub fn participant(&self) -> ParticipantKey {
        ParticipantKey::new(&self.device_id, &self.activity_id)
    }
}

/// In-memory database handle; cheap to clone, shared across handlers.
#[derive(Clone, Default)]
pub struct MemoryDb {
    /// First-seen time per known device id
    devices: Arc<DashMap<String, DateTime<Utc>>>,
    /// At most one live token per slot
    tokens: Arc<DashMap<SlotKey, CheckinToken>>,
    /// Append-only check-in ledger per participant
    checkins: Arc<DashMap<ParticipantKey, Vec<CheckIn>>>,
    /// Contact info per participant
    contacts: Arc<DashMap<ParticipantKey, ContactInfo>>,
    /// Reward tiers already handed to the external issuance boundary
    issued_tiers: Arc<DashMap<ParticipantKey, HashSet<u32>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Device Operations ───────────────────────────────────────

    /// Record a device id. Returns `true` if it was previously unknown.
    pub fn register_device(&self, device_id: &str, now: DateTime<Utc>) -> bool {
        self.devices.insert(device_id.to_string(), now).is_none()
    }

    pub fn device_known(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Store a token, replacing any prior live token for the same slot
    /// ("last issued wins").
    pub fn put_token(&self, token: CheckinToken) {
        let key = SlotKey::new(&token.device_id, &token.activity_id, &token.location_id);
        self.tokens.insert(key, token);
    }

    /// Atomically consume the live token for a slot iff its nonce matches.
    ///
    /// A mismatched nonce (a token replaced by a later issuance) leaves the
    /// live token in place and returns `None`.
    pub fn take_token(&self, key: &SlotKey, nonce: &str) -> Option<CheckinToken> {
        self.tokens
            .remove_if(key, |_, token| token.nonce == nonce)
            .map(|(_, token)| token)
    }

    // ─── Check-in Ledger ─────────────────────────────────────────

    /// Append a check-in to the ledger. The ledger is never mutated or
    /// compacted; invariant enforcement happens before this call.
    pub fn append_checkin(&self, check_in: CheckIn) {
        let key = ParticipantKey::new(&check_in.temp_user_id, &check_in.activity_id);
        self.checkins.entry(key).or_default().push(check_in);
    }

    /// All check-ins for a participant within an activity.
    pub fn checkins_for(&self, key: &ParticipantKey) -> Vec<CheckIn> {
        self.checkins
            .get(key)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Check-in count for one slot.
    pub fn count_for_slot(&self, key: &SlotKey) -> u32 {
        self.checkins
            .get(&key.participant())
            .map(|entry| {
                entry
                    .iter()
                    .filter(|c| c.location_id == key.location_id)
                    .count() as u32
            })
            .unwrap_or(0)
    }

    /// Distinct locations a participant has ever checked into.
    pub fn distinct_locations(&self, key: &ParticipantKey) -> HashSet<String> {
        self.checkins
            .get(key)
            .map(|entry| entry.iter().map(|c| c.location_id.clone()).collect())
            .unwrap_or_default()
    }

    // ─── Contact Info ────────────────────────────────────────────

    pub fn get_contact(&self, key: &ParticipantKey) -> Option<ContactInfo> {
        self.contacts.get(key).map(|entry| entry.clone())
    }

    pub fn set_contact(&self, key: ParticipantKey, contact: ContactInfo) {
        self.contacts.insert(key, contact);
    }

    /// Read-modify-write on a contact record while holding its shard lock.
    pub fn modify_contact<T>(
        &self,
        key: &ParticipantKey,
        f: impl FnOnce(&mut ContactInfo) -> T,
    ) -> Option<T> {
        self.contacts.get_mut(key).map(|mut entry| f(&mut entry))
    }

    // ─── Issued Reward Tiers ─────────────────────────────────────

    /// Claim a tier for issuance. Returns `true` exactly once per
    /// `(participant, tier)`; the caller may release the claim again with
    /// [`MemoryDb::unmark_tier_issued`] if the external call fails.
    pub fn mark_tier_issued(&self, key: &ParticipantKey, tier: u32) -> bool {
        self.issued_tiers
            .entry(key.clone())
            .or_default()
            .insert(tier)
    }

    pub fn unmark_tier_issued(&self, key: &ParticipantKey, tier: u32) {
        if let Some(mut entry) = self.issued_tiers.get_mut(key) {
            entry.remove(&tier);
        }
    }
}
