//! Audit log of model exchanges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token accounting reported by the model API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Who produced a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    User,
    Assistant,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::User => "user",
            MessageSource::Assistant => "assistant",
        }
    }
}

/// What a logged message was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Prompt,
    Response,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Prompt => "prompt",
            MessageKind::Response => "response",
        }
    }
}

/// One row of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub source: MessageSource,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn prompt(content: impl Into<String>) -> Self {
        Self {
            source: MessageSource::User,
            content: content.into(),
            kind: MessageKind::Prompt,
            prompt_tokens: None,
            completion_tokens: None,
            timestamp: Utc::now(),
        }
    }

    pub fn response(content: impl Into<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            source: MessageSource::Assistant,
            content: content.into(),
            kind: MessageKind::Response,
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
            timestamp: Utc::now(),
        }
    }
}
