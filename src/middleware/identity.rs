// SPDX-License-Identifier: MIT

//! Device identity middleware.
//!
//! Every participant-facing request carries an opaque device credential,
//! read from the `stamp_device` cookie or the `X-Temp-User-Token` header.
//! The credential is best-effort anti-duplicate identity, NOT
//! authentication: it is never parsed or verified, only echoed back as the
//! join key for participant-scoped state.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Cookie under which the device id is persisted client-side.
pub const DEVICE_COOKIE: &str = "stamp_device";
/// Header fallback for clients without cookie storage.
pub const DEVICE_HEADER: &str = "x-temp-user-token";

const DEVICE_ID_BYTES: usize = 16;

/// Device identity attached to the request.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_id: String,
    /// True when this request minted the id (client had none to present)
    pub fresh: bool,
}

/// Source of device identities.
///
/// The engine depends only on this trait; how ids survive between requests
/// (client-durable cookie, fingerprint, nothing at all) is the
/// implementation's business.
pub trait DeviceIdentityProvider: Send + Sync {
    /// Return a stable id for this client: echo a presented credential, or
    /// mint one. Must not fail; identity degrades, it never errors.
    fn get_or_create(&self, presented: Option<&str>, fingerprint: Option<&str>) -> DeviceIdentity;
}

/// Provider that records minted ids in the store so returning devices are
/// recognized. Falls back to a fingerprint hash when the client supplies
/// stable hints but no stored credential.
pub struct StoredIdentityProvider {
    db: crate::db::MemoryDb,
    rng: SystemRandom,
}

impl StoredIdentityProvider {
    pub fn new(db: crate::db::MemoryDb) -> Self {
        Self {
            db,
            rng: SystemRandom::new(),
        }
    }

    fn mint(&self, fingerprint: Option<&str>) -> String {
        if let Some(hints) = fingerprint {
            return fingerprint_id(hints);
        }

        let mut bytes = [0u8; DEVICE_ID_BYTES];
        // RNG failure is effectively impossible; degrade to a fingerprint of
        // nothing rather than refusing the request.
        if self.rng.fill(&mut bytes).is_err() {
            return fingerprint_id("");
        }
        hex::encode(bytes)
    }
}

impl DeviceIdentityProvider for StoredIdentityProvider {
    fn get_or_create(&self, presented: Option<&str>, fingerprint: Option<&str>) -> DeviceIdentity {
        let now = chrono::Utc::now();

        if let Some(id) = presented.filter(|s| !s.is_empty()) {
            self.db.register_device(id, now);
            return DeviceIdentity {
                device_id: id.to_string(),
                fresh: false,
            };
        }

        let device_id = self.mint(fingerprint);
        let fresh = self.db.register_device(&device_id, now);
        DeviceIdentity { device_id, fresh }
    }
}

/// Fallback provider for when durable storage is unavailable: every call
/// without a presented credential gets a throwaway per-session id.
pub struct EphemeralIdentityProvider {
    rng: SystemRandom,
}

impl EphemeralIdentityProvider {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for EphemeralIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceIdentityProvider for EphemeralIdentityProvider {
    fn get_or_create(&self, presented: Option<&str>, _fingerprint: Option<&str>) -> DeviceIdentity {
        if let Some(id) = presented.filter(|s| !s.is_empty()) {
            return DeviceIdentity {
                device_id: id.to_string(),
                fresh: false,
            };
        }

        let mut bytes = [0u8; DEVICE_ID_BYTES];
        if self.rng.fill(&mut bytes).is_err() {
            return DeviceIdentity {
                device_id: fingerprint_id(""),
                fresh: true,
            };
        }
        DeviceIdentity {
            device_id: hex::encode(bytes),
            fresh: true,
        }
    }
}

/// Derive a stable id from client hints (User-Agent etc).
fn fingerprint_id(hints: &str) -> String {
    let digest = Sha256::digest(hints.as_bytes());
    hex::encode(&digest[..DEVICE_ID_BYTES])
}

/// Middleware that attaches a `DeviceIdentity` to every request and sets
/// the device cookie on first contact.
pub async fn provide_identity(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    // Cookie first, then header - same order the client persists them.
    let presented = jar
        .get(DEVICE_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            request
                .headers()
                .get(DEVICE_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        });

    let fingerprint = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let identity = state
        .identity
        .get_or_create(presented.as_deref(), fingerprint.as_deref());

    let set_cookie = identity.fresh.then(|| {
        Cookie::build((DEVICE_COOKIE, identity.device_id.clone()))
            .path("/")
            .http_only(true)
            .max_age(time::Duration::days(365))
            .build()
            .to_string()
    });

    request.extensions_mut().insert(identity);
    let mut response = next.run(request).await;

    if let Some(cookie) = set_cookie {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}
