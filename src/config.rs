use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Upstream client settings. The operator credential pool lives here rather
/// than being read from the process environment by the client itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Comma-delimited operator credential pool.
    #[serde(default)]
    pub api_keys: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_keys: None,
            user_agent: default_user_agent(),
            request_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn with_api_keys(mut self, api_keys: impl Into<String>) -> Self {
        self.api_keys = Some(api_keys.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn chat_completions_url(&self) -> String {
        join_url(&self.base_url, CHAT_COMPLETIONS_PATH)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub client: ClientConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let listen = read("GISTREAM_LISTEN").unwrap_or_else(default_listen);
        let base_url = read("OPENAI_BASE_URL").unwrap_or_else(default_base_url);
        let request_timeout_ms = read("GISTREAM_UPSTREAM_TIMEOUT_MS").and_then(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|err| {
                    tracing::warn!("ignoring GISTREAM_UPSTREAM_TIMEOUT_MS={}: {}", v, err);
                })
                .ok()
        });
        Self {
            listen,
            client: ClientConfig {
                base_url,
                api_keys: read("OPENAI_API_KEY"),
                user_agent: default_user_agent(),
                request_timeout_ms,
            },
        }
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut path = path.trim_start_matches('/');
    if base.ends_with("/v1") {
        if path == "v1" {
            path = "";
        } else if let Some(stripped) = path.strip_prefix("v1/") {
            path = stripped;
        }
    }
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    concat!("gistream/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
