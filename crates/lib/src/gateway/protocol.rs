//! Relay WebSocket protocol types (joinChat, sendMessage, newMessage).

use crate::records::DataRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed degraded-service reply sent when any part of the pipeline fails.
pub const DEGRADED_REPLY: &str = "Sorry, I couldn't process your request.";

/// Client frame: `{ "event": "joinChat" | "sendMessage", "payload": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientEvent {
    /// Subscribe the connection to a chat channel. Payload is the channel id.
    #[serde(rename = "joinChat")]
    JoinChat(String),

    /// Submit a query on a channel.
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub chat_id: String,
    pub message: String,
}

/// Server frame: `{ "event": "newMessage", "payload": OutboundMessage }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "newMessage")]
    NewMessage(OutboundMessage),
}

impl ServerEvent {
    /// Serialized wire frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// Reply path tag on assistant messages. Absent on user echoes and on the
/// degraded reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "DATA_QUERY")]
    DataQuery,
    #[serde(rename = "KNOWLEDGE_QUERY")]
    KnowledgeQuery,
}

/// Message content: free text (knowledge path, echoes, degraded reply) or a
/// parsed record sequence (data path).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Records(Vec<DataRecord>),
}

/// The unit broadcast to channel subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub sender: Sender,
    pub content: MessageContent,
    pub chat_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

impl OutboundMessage {
    /// Echo of the user's own message, emitted before classification begins.
    pub fn user_echo(chat_id: &str, text: &str) -> Self {
        Self {
            sender: Sender::User,
            content: MessageContent::Text(text.to_string()),
            chat_id: chat_id.to_string(),
            timestamp: Utc::now(),
            message_type: None,
        }
    }

    /// Final knowledge-path reply.
    pub fn knowledge_reply(chat_id: &str, answer: String) -> Self {
        Self {
            sender: Sender::Assistant,
            content: MessageContent::Text(answer),
            chat_id: chat_id.to_string(),
            timestamp: Utc::now(),
            message_type: Some(MessageType::KnowledgeQuery),
        }
    }

    /// Final data-path reply carrying the parsed record sequence.
    pub fn data_reply(chat_id: &str, records: Vec<DataRecord>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: MessageContent::Records(records),
            chat_id: chat_id.to_string(),
            timestamp: Utc::now(),
            message_type: Some(MessageType::DataQuery),
        }
    }

    /// Fixed degraded-service reply (no path tag).
    pub fn degraded(chat_id: &str) -> Self {
        Self {
            sender: Sender::Assistant,
            content: MessageContent::Text(DEGRADED_REPLY.to_string()),
            chat_id: chat_id.to_string(),
            timestamp: Utc::now(),
            message_type: None,
        }
    }
}
