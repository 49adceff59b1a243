//! Extract JSON objects from model replies
//!
//! Models asked to "respond with ONLY a JSON object" still wrap it in markdown
//! fences or prose now and then. This module peels that off before parsing.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::{ConstructError, Result};

/// Parse the first JSON object in `reply`
pub fn parse_json_object(reply: &str) -> Result<Value> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(ConstructError::Parse("empty reply".to_string()));
    }

    let unfenced = strip_code_fences(trimmed);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    extract_object(unfenced)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .filter(Value::is_object)
        .ok_or_else(|| {
            ConstructError::Parse(format!("no JSON object in reply: {}", preview(trimmed)))
        })
}

/// Parse the first JSON object in `reply` into `T`
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let value = parse_json_object(reply)?;
    serde_json::from_value(value)
        .map_err(|e| ConstructError::Parse(format!("unexpected reply shape: {}", e)))
}

fn strip_code_fences(input: &str) -> &str {
    static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)\n?```").expect("valid fence regex")
    });

    CODE_FENCE_RE
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(input)
}

/// Balanced `{...}` span starting at the first brace, respecting strings
fn extract_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let substring = &input[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in substring.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&substring[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 80;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
