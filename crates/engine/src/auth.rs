// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token signing and the child environment contract.
//!
//! Tokens are compact HS256: `b64url(header).b64url(claims).b64url(sig)`.
//! The signing key starts from the configured secret and is replaced by 32
//! random bytes on every rotation, which invalidates all outstanding
//! tokens at once. Every sign/verify reads the current key under the lock;
//! the key is never cached by value across a rotation boundary.

use crate::sanitize::SecretRedactor;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use thiserror::Error;
use warden_core::AgentId;

type HmacSha256 = Hmac<Sha256>;

/// User tokens live a day.
pub const USER_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Agent-service tokens live four hours.
pub const AGENT_TOKEN_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Variables copied from the parent environment into spawned children.
const ALLOWED_CHILD_ENV: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_BASE_URL",
    "CLAUDE_CONFIG_DIR",
    "GIT_AUTHOR_NAME",
    "GIT_AUTHOR_EMAIL",
    "GIT_COMMITTER_NAME",
    "GIT_COMMITTER_EMAIL",
    "HOME",
    "USER",
    "LOGNAME",
    "PATH",
    "LANG",
    "LC_ALL",
    "TERM",
    "TZ",
    "TMPDIR",
    "WARDEN_CONTEXT_DIR",
];

/// Variables that must never reach a child, even if somehow allowed.
const DENIED_CHILD_ENV: &[&str] = &[
    "WARDEN_JWT_SECRET",
    "WARDEN_API_KEY",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "DATABASE_URL",
    "OPENAI_API_KEY",
    "GITHUB_TOKEN",
];

/// Errors from token service construction.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("signing secret is not configured (WARDEN_JWT_SECRET)")]
    MissingSecret,
}

/// Audience of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    User,
    Agent,
}

/// Claims carried by a signed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Serialize, Deserialize)]
struct Header<'a> {
    alg: &'a str,
    typ: &'a str,
}

/// Signs and verifies short-lived tokens; builds child environments.
pub struct TokenService {
    key: RwLock<Vec<u8>>,
    api_key: Option<String>,
    redactor: Arc<SecretRedactor>,
}

impl TokenService {
    /// Fails fast when the signing secret is unset or empty.
    pub fn new(
        secret: Option<&str>,
        api_key: Option<String>,
        redactor: Arc<SecretRedactor>,
    ) -> Result<Self, AuthError> {
        let secret = secret.filter(|s| !s.is_empty()).ok_or(AuthError::MissingSecret)?;
        Ok(Self {
            key: RwLock::new(secret.as_bytes().to_vec()),
            api_key: api_key.filter(|k| !k.is_empty()),
            redactor,
        })
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn hmac(&self, signing_input: &str) -> Vec<u8> {
        let key = self.key.read();
        // HMAC accepts keys of any length; new_from_slice cannot fail here
        let mut mac = match HmacSha256::new_from_slice(&key) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(signing_input.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Sign a token with an explicit TTL.
    pub fn sign_with_ttl(&self, sub: &str, kind: TokenKind, ttl: Duration) -> String {
        let now = Self::now_secs();
        let claims = Claims {
            sub: sub.to_string(),
            kind,
            iat: now,
            exp: now + ttl.as_secs(),
        };
        let header = Header {
            alg: "HS256",
            typ: "JWT",
        };
        let header_b64 =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap_or_default());
        let claims_b64 =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
        let signing_input = format!("{header_b64}.{claims_b64}");
        let sig_b64 = URL_SAFE_NO_PAD.encode(self.hmac(&signing_input));
        format!("{signing_input}.{sig_b64}")
    }

    pub fn sign_user_token(&self, sub: &str) -> String {
        self.sign_with_ttl(sub, TokenKind::User, USER_TOKEN_TTL)
    }

    pub fn sign_agent_token(&self, sub: &str) -> String {
        self.sign_with_ttl(sub, TokenKind::Agent, AGENT_TOKEN_TTL)
    }

    /// Verify a token; any failure (shape, signature, expiry) yields None.
    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        let mut parts = token.split('.');
        let header_b64 = parts.next()?;
        let claims_b64 = parts.next()?;
        let sig_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let header_bytes = URL_SAFE_NO_PAD.decode(header_b64).ok()?;
        let header: Header = serde_json::from_slice(&header_bytes).ok()?;
        if header.alg != "HS256" {
            return None;
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let expected = self.hmac(&signing_input);
        let provided = URL_SAFE_NO_PAD.decode(sig_b64).ok()?;
        if provided.len() != expected.len() {
            return None;
        }
        if !bool::from(provided.ct_eq(&expected)) {
            return None;
        }

        let claims_bytes = URL_SAFE_NO_PAD.decode(claims_b64).ok()?;
        let claims: Claims = serde_json::from_slice(&claims_bytes).ok()?;
        if Self::now_secs() >= claims.exp {
            return None;
        }
        Some(claims)
    }

    /// Exchange the configured API key for a user token.
    ///
    /// Length is compared first so the constant-time comparison never sees
    /// mismatched buffer sizes.
    pub fn exchange_api_key(&self, key: &str) -> Option<String> {
        let configured = self.api_key.as_deref()?;
        if key.len() != configured.len() {
            return None;
        }
        if !bool::from(key.as_bytes().ct_eq(configured.as_bytes())) {
            return None;
        }
        Some(self.sign_user_token("api-key"))
    }

    /// Replace the signing key with fresh random bytes.
    ///
    /// Every outstanding token becomes unverifiable, and the sanitizer
    /// cache is reset so redaction reflects the current environment.
    pub fn rotate_signing_key(&self) {
        let fresh: [u8; 32] = rand::rng().random();
        *self.key.write() = fresh.to_vec();
        self.redactor.invalidate();
        tracing::info!("signing key rotated, outstanding tokens invalidated");
    }

    /// Build the environment for a spawned child.
    ///
    /// Copies the allow-list from the parent env, strips the deny-list, and
    /// injects a shell, the CLI traffic-disable flag, and a fresh
    /// agent-service token.
    pub fn build_child_env(&self, agent_id: &AgentId) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for var in ALLOWED_CHILD_ENV {
            if let Ok(value) = std::env::var(var) {
                env.insert((*var).to_string(), value);
            }
        }
        for var in DENIED_CHILD_ENV {
            env.remove(*var);
        }
        env.insert("SHELL".to_string(), "/bin/sh".to_string());
        env.insert(
            "CLAUDE_CODE_DISABLE_NONESSENTIAL_TRAFFIC".to_string(),
            "1".to_string(),
        );
        env.insert(
            "AGENT_AUTH_TOKEN".to_string(),
            self.sign_agent_token(agent_id.as_str()),
        );
        env
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
