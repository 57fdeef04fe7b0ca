// SPDX-License-Identifier: MIT

//! Contact verification gate.
//!
//! Per `(device, activity)` the flow is
//! `Unsubmitted -> PendingVerification -> Verified`, shortcutting straight
//! to `Verified` when the activity has code challenges disabled. Reward
//! issuance for activities that require verification is gated on the
//! `Verified` state; see `services::rewards`.

use crate::db::{MemoryDb, ParticipantKey};
use crate::error::{AppError, Result};
use crate::models::{Activity, ContactInfo, ContactMethod, VerificationState};
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use validator::ValidateEmail;

/// Verification codes live this long once dispatched.
pub const CODE_TTL_SECS: i64 = 10 * 60;
/// Minimum wait between code dispatches per `(device, activity, method)`.
pub const RESEND_COOLDOWN_SECS: i64 = 60;

const CODE_DIGITS: u32 = 6;

/// External delivery channel for verification codes (SMS/email).
/// Delivery itself is out of scope; implementations only hand the code off.
#[async_trait::async_trait]
pub trait CodeDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        method: ContactMethod,
        destination: &str,
        code: &str,
    ) -> Result<()>;
}

/// Development dispatcher: logs instead of sending.
pub struct LogDispatcher;

#[async_trait::async_trait]
impl CodeDispatcher for LogDispatcher {
    async fn dispatch(
        &self,
        method: ContactMethod,
        destination: &str,
        code: &str,
    ) -> Result<()> {
        tracing::info!(%method, destination, code, "Dispatching verification code (log only)");
        Ok(())
    }
}

/// Outcome of a contact submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOutcome {
    /// Whether a code challenge follows
    pub verification_required: bool,
}

/// Collects contact info and runs the code challenge.
#[derive(Clone)]
pub struct VerificationGate {
    db: MemoryDb,
    dispatcher: Arc<dyn CodeDispatcher>,
    rng: SystemRandom,
}

impl VerificationGate {
    pub fn new(db: MemoryDb, dispatcher: Arc<dyn CodeDispatcher>) -> Self {
        Self {
            db,
            dispatcher,
            rng: SystemRandom::new(),
        }
    }

    /// Current verification state for a participant.
    pub fn state(&self, device_id: &str, activity_id: &str) -> VerificationState {
        let key = ParticipantKey::new(device_id, activity_id);
        self.db
            .get_contact(&key)
            .map(|c| c.state())
            .unwrap_or(VerificationState::Unsubmitted)
    }

    /// Whether reward issuance is permitted for this participant.
    ///
    /// Activities that require verification never authorize issuance
    /// outside the `Verified` state.
    pub fn issuance_permitted(&self, activity: &Activity, device_id: &str) -> bool {
        if !activity.verification.required {
            return true;
        }
        self.state(device_id, &activity.id) == VerificationState::Verified
    }

    /// Accept contact details; start a code challenge when enabled.
    pub async fn submit_contact(
        &self,
        activity: &Activity,
        device_id: &str,
        phone: Option<String>,
        email: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        let settings = &activity.verification;
        let key = ParticipantKey::new(device_id, &activity.id);

        // Verified is terminal; resubmission is a no-op.
        let existing = self.db.get_contact(&key);
        if existing.as_ref().is_some_and(|c| c.verified) {
            return Ok(SubmitOutcome {
                verification_required: false,
            });
        }

        let phone = match phone.filter(|_| settings.methods.contains(&ContactMethod::Phone)) {
            Some(raw) => Some(normalize_phone(&raw)?),
            None => None,
        };
        let email = match email.filter(|_| settings.methods.contains(&ContactMethod::Email)) {
            Some(raw) => {
                if !raw.validate_email() {
                    return Err(AppError::InvalidFormat("email"));
                }
                Some(raw)
            }
            None => None,
        };

        if phone.is_none() && email.is_none() {
            return Err(AppError::MissingContactMethod);
        }

        let mut contact = ContactInfo {
            temp_user_id: device_id.to_string(),
            activity_id: activity.id.clone(),
            phone,
            email,
            verified: !settings.enabled,
            verification_code: None,
            code_methods: Vec::new(),
            code_expires_at: None,
            // A resubmission carries the prior cooldowns forward so it
            // cannot be used to pump out extra codes.
            resend_available_at: existing
                .map(|c| c.resend_available_at)
                .unwrap_or_default(),
        };

        let verification_required = settings.enabled;
        if settings.enabled {
            let targets: Vec<(ContactMethod, String)> = [ContactMethod::Phone, ContactMethod::Email]
                .into_iter()
                .filter_map(|m| contact.destination(m).map(|d| (m, d.to_string())))
                .collect();

            let mut wait = 0;
            for (method, _) in &targets {
                if let Some(available_at) = contact.resend_available_at.get(method) {
                    if now < *available_at {
                        wait = wait.max((*available_at - now).num_seconds().max(1));
                    }
                }
            }
            if wait > 0 {
                return Err(AppError::ResendTooSoon {
                    retry_after_secs: wait,
                });
            }

            let code = self.generate_code()?;
            let mut dispatched = Vec::new();

            for (method, destination) in &targets {
                self.dispatcher.dispatch(*method, destination, &code).await?;
                dispatched.push(*method);
                contact
                    .resend_available_at
                    .insert(*method, now + Duration::seconds(RESEND_COOLDOWN_SECS));
            }

            contact.verification_code = Some(code);
            contact.code_methods = dispatched;
            contact.code_expires_at = Some(now + Duration::seconds(CODE_TTL_SECS));
        }

        self.db.set_contact(key, contact);

        tracing::info!(
            activity_id = %activity.id,
            verification_required,
            "Contact info submitted"
        );

        Ok(SubmitOutcome {
            verification_required,
        })
    }

    /// Check a presented code; transition to `Verified` on match.
    ///
    /// The stored code is single-use: a successful match invalidates it.
    /// Mismatches reveal nothing about the expected value.
    pub fn verify_code(
        &self,
        activity: &Activity,
        device_id: &str,
        code: &str,
        method: ContactMethod,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = ParticipantKey::new(device_id, &activity.id);

        let verified = self
            .db
            .modify_contact(&key, |contact| {
                if contact.verified {
                    return Ok(());
                }

                let stored = contact
                    .verification_code
                    .as_deref()
                    .ok_or(AppError::InvalidCode)?;

                if !contact.code_methods.contains(&method) {
                    return Err(AppError::InvalidCode);
                }

                let expired = contact
                    .code_expires_at
                    .map(|deadline| now > deadline)
                    .unwrap_or(true);
                if expired {
                    return Err(AppError::InvalidCode);
                }

                if !constant_time_eq(code, stored) {
                    return Err(AppError::InvalidCode);
                }

                contact.verified = true;
                contact.verification_code = None;
                contact.code_methods.clear();
                contact.code_expires_at = None;
                Ok(())
            })
            .ok_or_else(|| AppError::BadRequest("no contact info submitted".to_string()))?;

        if verified.is_ok() {
            tracing::info!(activity_id = %activity.id, "Contact verified");
        }
        verified
    }

    /// Regenerate and redispatch a code after the per-method cooldown.
    pub async fn resend(
        &self,
        activity: &Activity,
        device_id: &str,
        method: ContactMethod,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !activity.verification.enabled {
            return Err(AppError::BadRequest(
                "verification is not enabled for this activity".to_string(),
            ));
        }

        let key = ParticipantKey::new(device_id, &activity.id);
        let code = self.generate_code()?;

        // Cooldown check and claim happen in one closure under the record's
        // shard lock, so two racing resends cannot both pass the check.
        let claimed = self
            .db
            .modify_contact(&key, |contact| {
                if contact.verified {
                    return Err(AppError::BadRequest("contact already verified".to_string()));
                }

                let destination = contact
                    .destination(method)
                    .ok_or(AppError::MissingContactMethod)?
                    .to_string();

                if let Some(available_at) = contact.resend_available_at.get(&method) {
                    if now < *available_at {
                        return Err(AppError::ResendTooSoon {
                            retry_after_secs: (*available_at - now).num_seconds().max(1),
                        });
                    }
                }

                let previous = contact
                    .resend_available_at
                    .insert(method, now + Duration::seconds(RESEND_COOLDOWN_SECS));
                contact.verification_code = Some(code.clone());
                contact.code_methods = vec![method];
                contact.code_expires_at = Some(now + Duration::seconds(CODE_TTL_SECS));
                Ok((destination, previous))
            })
            .ok_or_else(|| AppError::BadRequest("no contact info submitted".to_string()))?;
        let (destination, previous_deadline) = claimed?;

        if let Err(e) = self.dispatcher.dispatch(method, &destination, &code).await {
            // Release the claim so a delivery failure does not lock the
            // participant out for a full cooldown.
            self.db.modify_contact(&key, |contact| match previous_deadline {
                Some(deadline) => {
                    contact.resend_available_at.insert(method, deadline);
                }
                None => {
                    contact.resend_available_at.remove(&method);
                }
            });
            return Err(e);
        }

        tracing::info!(activity_id = %activity.id, %method, "Verification code resent");
        Ok(())
    }

    fn generate_code(&self) -> Result<String> {
        let mut bytes = [0u8; 4];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("system RNG failure")))?;
        let value = u32::from_be_bytes(bytes) % 10u32.pow(CODE_DIGITS);
        Ok(format!("{:06}", value))
    }
}

/// Strip separators and enforce the local mobile numbering pattern
/// (`010` followed by eight digits).
fn normalize_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| !matches!(c, '-' | ' ')).collect();
    let valid = digits.len() == 11
        && digits.starts_with("010")
        && digits.chars().all(|c| c.is_ascii_digit());
    if valid {
        Ok(digits)
    } else {
        Err(AppError::InvalidFormat("phone"))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone("010-1234-5678").unwrap(), "01012345678");
        assert_eq!(normalize_phone("01012345678").unwrap(), "01012345678");

        assert!(normalize_phone("011-1234-5678").is_err());
        assert!(normalize_phone("010-1234-567").is_err());
        assert!(normalize_phone("010-1234-56789").is_err());
        assert!(normalize_phone("010-abcd-efgh").is_err());
    }

    #[test]
    fn test_constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq("123456", "123456"));
        assert!(!constant_time_eq("123456", "123457"));
        assert!(!constant_time_eq("123456", "12345"));
    }
}
