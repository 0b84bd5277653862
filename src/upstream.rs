use crate::config::ClientConfig;
use crate::credentials::CredentialSelector;
use crate::error::CompletionError;
use crate::format::{LeadingNewlinePolicy, format_completion};
use crate::payload::CompletionPayload;
use crate::stream::{CompletionStream, TextStream, collect_text, text_stream};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Result of one upstream call, shaped by the payload's `stream` flag.
pub enum Completion {
    Text(String),
    Stream(TextStream),
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Completion::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: ClientConfig,
    selector: CredentialSelector,
    policy: LeadingNewlinePolicy,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Result<Self, CompletionError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http = builder
            .build()
            .map_err(|err| CompletionError::ClientInit(err.to_string()))?;
        Ok(Self {
            http,
            config,
            selector: CredentialSelector::default(),
            policy: LeadingNewlinePolicy::default(),
        })
    }

    pub fn with_selector(mut self, selector: CredentialSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_newline_policy(mut self, policy: LeadingNewlinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Issues exactly one chat-completions request.
    ///
    /// Non-streaming payloads resolve to the formatted text of the full
    /// response. Streaming payloads resolve as soon as headers arrive; the
    /// returned stream yields fragments as the body is read.
    pub async fn complete(
        &self,
        payload: &CompletionPayload,
        api_key: Option<&str>,
    ) -> Result<Completion, CompletionError> {
        let credential = self
            .selector
            .select(api_key, self.config.api_keys.as_deref());
        let url = self.config.chat_completions_url();
        tracing::debug!(
            model = %payload.model,
            stream = payload.stream,
            caller_key = api_key.is_some(),
            "dispatching chat completion"
        );
        let resp = self
            .http
            .post(url)
            .bearer_auth(&credential)
            .json(payload)
            .send()
            .await?;
        let status = resp.status();
        if status != StatusCode::OK {
            tracing::warn!(%status, "upstream rejected chat completion");
            return Err(CompletionError::upstream_status(status));
        }

        if !payload.stream {
            let text = resp.text().await?;
            let value: Value = serde_json::from_str(&text)
                .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;
            return Ok(Completion::Text(format_completion(&value)));
        }

        let machine = CompletionStream::with_policy(self.policy);
        Ok(Completion::Stream(text_stream(resp.bytes_stream(), machine)))
    }

    /// Like [`complete`](Self::complete), draining a streamed response into one string.
    pub async fn complete_text(
        &self,
        payload: &CompletionPayload,
        api_key: Option<&str>,
    ) -> Result<String, CompletionError> {
        match self.complete(payload, api_key).await? {
            Completion::Text(text) => Ok(text),
            Completion::Stream(stream) => collect_text(stream).await,
        }
    }
}
