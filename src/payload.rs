use serde::{Deserialize, Serialize};

pub const SUMMARY_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Body of one chat-completions request. Built once by the caller and only
/// borrowed by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_n")]
    pub n: u32,
}

impl CompletionPayload {
    /// Summary request for a single user prompt. Callers bringing their own key
    /// get a larger output budget.
    pub fn summary(prompt: impl Into<String>, user_supplied_key: bool) -> Self {
        Self {
            model: SUMMARY_MODEL.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: 0.5,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: if user_supplied_key { 400 } else { 300 },
            stream: false,
            n: default_n(),
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

fn default_n() -> u32 {
    1
}
