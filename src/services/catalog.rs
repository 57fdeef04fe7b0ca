// SPDX-License-Identifier: MIT

//! Activity catalog loading and validation.
//!
//! Activities and their locations are configuration, edited by the admin
//! surface outside this crate. The engine loads them once at startup and
//! treats them as read-only.

use crate::models::{Activity, RewardMode};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Read-only catalog of configured activities.
#[derive(Default, Clone)]
pub struct ActivityCatalog {
    activities: HashMap<String, Activity>,
}

impl ActivityCatalog {
    /// Load the catalog from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::Io(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load the catalog from a JSON string (an array of activities).
    pub fn load_from_json(json_data: &str) -> Result<Self, CatalogError> {
        let activities: Vec<Activity> =
            serde_json::from_str(json_data).map_err(|e| CatalogError::Parse(e.to_string()))?;
        let catalog = Self::from_activities(activities)?;

        tracing::info!(count = catalog.activities.len(), "Loaded activity catalog");
        Ok(catalog)
    }

    /// Build a catalog from already-deserialized activities, validating each.
    pub fn from_activities(activities: Vec<Activity>) -> Result<Self, CatalogError> {
        let mut map = HashMap::new();
        for activity in activities {
            validate_activity(&activity)?;
            if map.insert(activity.id.clone(), activity).is_some() {
                return Err(CatalogError::Invalid(
                    "duplicate activity id in catalog".to_string(),
                ));
            }
        }
        Ok(Self { activities: map })
    }

    pub fn get(&self, activity_id: &str) -> Option<&Activity> {
        self.activities.get(activity_id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }
}

/// Reject configurations the engine cannot honor.
fn validate_activity(activity: &Activity) -> Result<(), CatalogError> {
    let invalid = |msg: String| Err(CatalogError::Invalid(format!("{}: {}", activity.id, msg)));

    if activity.check_in_limit == 0 {
        return invalid("check_in_limit must be positive".to_string());
    }
    if activity.locations.is_empty() {
        return invalid("activity has no locations".to_string());
    }
    if activity.end_date < activity.start_date {
        return invalid("end_date precedes start_date".to_string());
    }

    let mut seen = std::collections::HashSet::new();
    for location in &activity.locations {
        if !seen.insert(location.id.as_str()) {
            return invalid(format!("duplicate location id {}", location.id));
        }
    }

    let full = activity.full_slot_count();
    match &activity.reward_mode {
        RewardMode::Full => {}
        RewardMode::Partial { threshold } | RewardMode::TwoTier { threshold } => {
            if *threshold == 0 || *threshold > full {
                return invalid(format!(
                    "reward threshold {} outside 1..={}",
                    threshold, full
                ));
            }
        }
        RewardMode::MultiTier { thresholds } => {
            if thresholds.is_empty() {
                return invalid("multi_tier requires at least one threshold".to_string());
            }
            if !thresholds.windows(2).all(|w| w[0] < w[1]) {
                return invalid("multi_tier thresholds must be strictly increasing".to_string());
            }
            let last = *thresholds.last().unwrap();
            if thresholds[0] == 0 || last > full {
                return invalid(format!(
                    "multi_tier thresholds outside 1..={}",
                    full
                ));
            }
        }
    }

    Ok(())
}

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(String),

    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    #[error("Invalid activity configuration: {0}")]
    Invalid(String),
}
