// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret redaction for events before persistence and fan-out.
//!
//! Secrets are the values of a fixed set of environment variables, read
//! once on first use and cached until [`SecretRedactor::invalidate`] is
//! called (after a signing-key rotation). Redaction replaces every exact
//! occurrence of each secret inside every string of a JSON-shaped value
//! with `[REDACTED]`, leaving structure untouched.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use warden_core::StreamEvent;

/// Replacement text for redacted secrets.
pub const REDACTED: &str = "[REDACTED]";

/// Secrets shorter than this are ignored (too likely to shred ordinary text).
const MIN_SECRET_LEN: usize = 8;

/// Environment variables whose values are treated as secrets.
const SECRET_ENV_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "WARDEN_JWT_SECRET",
    "WARDEN_API_KEY",
    "GITHUB_TOKEN",
    "DATABASE_URL",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "LINEAR_API_KEY",
];

/// Caching secret redactor.
#[derive(Default)]
pub struct SecretRedactor {
    cache: Mutex<Option<Arc<Vec<String>>>>,
}

impl SecretRedactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached secret list; the next sanitize call re-reads the
    /// environment. Called after signing-key rotation.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    fn secrets(&self) -> Arc<Vec<String>> {
        let mut cache = self.cache.lock();
        if let Some(secrets) = cache.as_ref() {
            return Arc::clone(secrets);
        }

        let mut secrets: Vec<String> = SECRET_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .filter(|value| value.len() >= MIN_SECRET_LEN)
            .collect();
        // Longest first: a secret that contains another must be replaced
        // whole, not left as a partial value around "[REDACTED]".
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();

        let secrets = Arc::new(secrets);
        *cache = Some(Arc::clone(&secrets));
        secrets
    }

    /// Redact all secrets in a string.
    pub fn sanitize_str(&self, input: &str) -> String {
        let secrets = self.secrets();
        let mut out = input.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        out
    }

    /// Redact all secrets in every string of a JSON value, recursively.
    /// Structural types are never altered.
    pub fn sanitize_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.sanitize_str(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.sanitize_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.sanitize_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Redact a stream event's payload.
    pub fn sanitize_event(&self, event: &StreamEvent) -> StreamEvent {
        let sanitized = event
            .fields()
            .iter()
            .map(|(k, v)| (k.clone(), self.sanitize_value(v)))
            .collect();
        event.with_fields(sanitized)
    }
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
