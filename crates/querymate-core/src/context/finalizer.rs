use serde_json::{Map, Value};

use crate::error::SessionError;
use crate::session::ContextSession;

/// Known field keys in their fixed rendering order. Block keys render the
/// value on its own lines under the label.
const KNOWN_FIELDS: &[(&str, &str, bool)] = &[
    ("business_name", "Business Name", false),
    ("description", "Description", true),
    ("target_audience", "Target Audience", false),
    ("features", "Features", true),
    ("pricing", "Pricing", false),
    ("support", "Support", false),
    ("contact", "Contact", false),
];

/// Convert a completed session's field mapping into the context blob.
/// A caller-supplied final text wins verbatim.
pub fn finalize(
    session: &ContextSession,
    final_text: Option<String>,
) -> Result<String, SessionError> {
    if !session.is_complete() {
        return Err(SessionError::NotComplete);
    }

    if let Some(text) = final_text {
        return Ok(text);
    }

    Ok(render_context(&session.collected_data))
}

/// Deterministic rendering: known keys first in fixed order, then any
/// dynamically discovered keys in insertion order. An entirely empty
/// mapping falls back to a raw serialized dump rather than an empty blob.
pub fn render_context(data: &Map<String, Value>) -> String {
    let mut out = String::new();

    for (key, label, block) in KNOWN_FIELDS {
        if let Some(value) = non_empty(data.get(*key)) {
            if *block {
                out.push_str(&format!("{label}:\n{value}\n\n"));
            } else {
                out.push_str(&format!("{label}: {value}\n\n"));
            }
        }
    }

    for (key, value) in data {
        if KNOWN_FIELDS.iter().any(|(k, _, _)| k == key) {
            continue;
        }
        if let Some(value) = non_empty(Some(value)) {
            out.push_str(&format!("{key}: {value}\n\n"));
        }
    }

    let trimmed = out.trim_end();
    if trimmed.is_empty() {
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    } else {
        trimmed.to_string()
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    let value = value?;
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => return None,
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
