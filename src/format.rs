use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Extracts the first choice's text and applies [`strip_blank_lead`].
///
/// Full responses carry `choices[0].message.content`; streamed chunks carry
/// `choices[0].delta.content`. A missing field yields an empty string.
pub fn format_completion(value: &Value) -> String {
    let choice = value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first());
    let content = choice
        .and_then(|c| c.get("message").or_else(|| c.get("delta")))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    strip_blank_lead(content).to_string()
}

/// Removes one leading `"\n\n"` the upstream tends to open with.
pub fn strip_blank_lead(text: &str) -> &str {
    text.strip_prefix("\n\n").unwrap_or(text)
}

/// Drops pure-newline fragments until `window` fragments have been emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadingNewlinePolicy {
    pub window: usize,
}

impl Default for LeadingNewlinePolicy {
    fn default() -> Self {
        Self { window: 2 }
    }
}

impl LeadingNewlinePolicy {
    pub fn disabled() -> Self {
        Self { window: 0 }
    }

    pub fn should_suppress(&self, fragment: &str, emitted: usize) -> bool {
        emitted < self.window && is_pure_newline(fragment)
    }
}

fn is_pure_newline(fragment: &str) -> bool {
    static NEWLINES: OnceLock<Regex> = OnceLock::new();
    NEWLINES
        .get_or_init(|| Regex::new(r"^\n+$").expect("newline pattern"))
        .is_match(fragment)
}
