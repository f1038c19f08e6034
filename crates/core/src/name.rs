// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent display-name sanitation.

/// Maximum length of a sanitized agent name.
pub const MAX_NAME_LEN: usize = 50;

/// Sanitize a caller-supplied agent name.
///
/// Replaces anything outside `[A-Za-z0-9_-]` with hyphens, collapses runs
/// of hyphens, and truncates to [`MAX_NAME_LEN`] without a trailing hyphen.
/// An empty result falls back to `"agent"`.
pub fn sanitize_agent_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect();

    let collapsed = mapped
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let truncated = if collapsed.len() <= MAX_NAME_LEN {
        collapsed
    } else {
        collapsed[..MAX_NAME_LEN].trim_end_matches('-').to_string()
    };

    if truncated.is_empty() {
        "agent".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod tests;
