//! Chat model abstraction used for answer synthesis.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A hosted chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Complete the conversation and return the full assistant reply.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}
