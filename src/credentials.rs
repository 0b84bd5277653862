use rand_core::{OsRng, RngCore};
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Syntactic check applied to a caller-supplied credential string before its
/// entries are admitted into the pool.
pub trait CredentialValidator: Send + Sync {
    fn is_valid(&self, raw: &str) -> bool;
}

/// Accepts strings whose every comma-separated entry looks like an OpenAI secret key.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiKeyFormat;

impl CredentialValidator for OpenAiKeyFormat {
    fn is_valid(&self, raw: &str) -> bool {
        static KEY_RE: OnceLock<Regex> = OnceLock::new();
        let re =
            KEY_RE.get_or_init(|| Regex::new(r"^sk-[A-Za-z0-9_-]{20,}$").expect("key pattern"));
        let entries = split_pool(raw);
        !entries.is_empty() && entries.iter().all(|entry| re.is_match(entry))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CredentialValidator for AcceptAll {
    fn is_valid(&self, _raw: &str) -> bool {
        true
    }
}

/// Picks one credential per request from the caller's pool or the operator's.
/// Holds no mutable state; pools are rebuilt on every call.
#[derive(Clone)]
pub struct CredentialSelector {
    validator: Arc<dyn CredentialValidator>,
}

impl Default for CredentialSelector {
    fn default() -> Self {
        Self::new(OpenAiKeyFormat)
    }
}

impl CredentialSelector {
    pub fn new(validator: impl CredentialValidator + 'static) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }

    pub fn select(&self, caller: Option<&str>, fallback: Option<&str>) -> String {
        if let Some(raw) = caller.filter(|raw| self.validator.is_valid(raw)) {
            if let Some(key) = sample(&split_pool(raw)) {
                return key.to_string();
            }
        }
        if caller.is_some_and(|raw| !raw.trim().is_empty()) {
            tracing::debug!("caller credential rejected, using operator pool");
        }
        match fallback.and_then(|raw| sample(&split_pool(raw))) {
            Some(key) => key.to_string(),
            None => {
                // Proceeds unauthenticated; the upstream answers with 401.
                tracing::warn!("no usable credential in caller or operator pool");
                String::new()
            }
        }
    }
}

/// Splits a comma-delimited pool, dropping blank entries.
pub fn split_pool(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn sample<'a>(pool: &[&'a str]) -> Option<&'a str> {
    match pool.len() {
        0 => None,
        1 => Some(pool[0]),
        len => {
            let idx = (OsRng.next_u64() % len as u64) as usize;
            Some(pool[idx])
        }
    }
}
