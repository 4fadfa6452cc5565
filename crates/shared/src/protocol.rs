use serde::{Deserialize, Serialize};

/// Message body as it travels in both directions. Fields are raw strings;
/// receivers validate them before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub content: String,
    pub sender: String,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    Join { name: String },
    Message(MessagePayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Message(MessagePayload),
    UpdateUsers(Vec<String>),
}

impl ClientRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Message(_) => "message",
        }
    }
}
