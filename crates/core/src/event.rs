// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream events produced by a child CLI process.
//!
//! The child speaks JSONL on stdout, one object per line, with an open
//! schema: a `type` tag plus arbitrary payload. Known types drive the
//! supervisor's state machine; everything else passes through untouched.
//! Unknown keys on known types are preserved so subscribers see exactly
//! what the child produced.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Tag of a stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    System,
    UserPrompt,
    Assistant,
    Result,
    Done,
    Destroyed,
    Stalled,
    /// Pass-through for types the supervisor does not interpret
    Other(String),
}

impl StreamEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            StreamEventKind::System => "system",
            StreamEventKind::UserPrompt => "user_prompt",
            StreamEventKind::Assistant => "assistant",
            StreamEventKind::Result => "result",
            StreamEventKind::Done => "done",
            StreamEventKind::Destroyed => "destroyed",
            StreamEventKind::Stalled => "stalled",
            StreamEventKind::Other(s) => s,
        }
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "system" => StreamEventKind::System,
            "user_prompt" => StreamEventKind::UserPrompt,
            "assistant" => StreamEventKind::Assistant,
            "result" => StreamEventKind::Result,
            "done" => StreamEventKind::Done,
            "destroyed" => StreamEventKind::Destroyed,
            "stalled" => StreamEventKind::Stalled,
            other => StreamEventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Usage figures carried by a `result` event.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResultUsage {
    pub num_turns: u64,
    pub duration_ms: u64,
    pub total_cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One event from a child's stdout stream (or synthesized by the
/// supervisor: `done`, `destroyed`, `stalled`).
///
/// Holds the `type` tag plus every other key of the original object, so
/// serialization reproduces the child's payload byte-for-byte modulo key
/// order and sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    kind: StreamEventKind,
    fields: Map<String, Value>,
}

impl StreamEvent {
    pub fn new(kind: StreamEventKind, fields: Map<String, Value>) -> Self {
        Self { kind, fields }
    }

    /// Parse a JSON object value into an event.
    ///
    /// Fails if the value is not an object or lacks a string `type` tag;
    /// callers log and drop such lines.
    pub fn from_value(value: Value) -> Result<Self, ParseEventError> {
        let Value::Object(mut fields) = value else {
            return Err(ParseEventError::NotAnObject);
        };
        let kind = match fields.remove("type") {
            Some(Value::String(t)) => StreamEventKind::from_wire(&t),
            _ => return Err(ParseEventError::MissingType),
        };
        Ok(Self { kind, fields })
    }

    /// Rebuild the wire object, `type` tag included.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert(
            "type".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        Value::Object(map)
    }

    pub fn kind(&self) -> &StreamEventKind {
        &self.kind
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Replace the payload (used by sanitization).
    pub fn with_fields(&self, fields: Map<String, Value>) -> Self {
        Self {
            kind: self.kind.clone(),
            fields,
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    fn u64_field(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(|v| v.as_u64())
    }

    /// `subtype` field, carried by `system` events.
    pub fn subtype(&self) -> Option<&str> {
        self.str_field("subtype")
    }

    /// `session_id` field, carried by `system:init`.
    pub fn session_id(&self) -> Option<&str> {
        self.str_field("session_id")
    }

    /// True for the child's `system{subtype:"init"}` handshake.
    pub fn is_system_init(&self) -> bool {
        self.kind == StreamEventKind::System && self.subtype() == Some("init")
    }

    /// The nested `message.id`, used for delivery deduplication.
    pub fn message_id(&self) -> Option<&str> {
        self.fields
            .get("message")
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
    }

    /// Exit code of a `done` event.
    pub fn exit_code(&self) -> Option<i64> {
        self.fields.get("exit_code").and_then(|v| v.as_i64())
    }

    /// Usage figures of a `result` event; absent fields default to zero.
    pub fn result_usage(&self) -> Option<ResultUsage> {
        if self.kind != StreamEventKind::Result {
            return None;
        }
        let usage = self.fields.get("usage");
        Some(ResultUsage {
            num_turns: self.u64_field("num_turns").unwrap_or(0),
            duration_ms: self.u64_field("duration_ms").unwrap_or(0),
            total_cost_usd: self
                .fields
                .get("total_cost_usd")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            input_tokens: usage
                .and_then(|u| u.get("input_tokens"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            output_tokens: usage
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        })
    }

    /// Synthesized process-exit event.
    pub fn done(exit_code: i64) -> Self {
        let mut fields = Map::new();
        fields.insert("exit_code".to_string(), Value::from(exit_code));
        Self {
            kind: StreamEventKind::Done,
            fields,
        }
    }

    /// Synthesized terminal event emitted after destruction.
    pub fn destroyed() -> Self {
        Self {
            kind: StreamEventKind::Destroyed,
            fields: Map::new(),
        }
    }

    /// Synthesized event emitted when the stall detector trips.
    pub fn stalled() -> Self {
        Self {
            kind: StreamEventKind::Stalled,
            fields: Map::new(),
        }
    }
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StreamEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        StreamEvent::from_value(value).map_err(D::Error::custom)
    }
}

/// Reasons a stdout line fails to parse as an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseEventError {
    #[error("event is not a JSON object")]
    NotAnObject,
    #[error("event has no string `type` tag")]
    MissingType,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
