//! # Event Context
//!
//! Inbound events arrive as an [`InboundEvent`] tagged variant. The runtime
//! builds one uniform [`EventContext`] from it, so no other component needs
//! to inspect the event shape.

use chrono::Local;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::value::Value;

/// Names bound from the context in templates and scripts.
pub const CONTEXT_FIELDS: &[&str] = &[
    "user_id",
    "chat_id",
    "first_name",
    "username",
    "text",
    "data",
];

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

/// Reference to a message that can be edited later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ContentType {
    Photo,
    Document,
    Voice,
    Sticker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundEvent {
    Message {
        sender: Sender,
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    Callback {
        sender: Sender,
        chat_id: i64,
        callback_id: String,
        data: String,
        message: Option<MessageRef>,
    },
    Media {
        sender: Sender,
        chat_id: i64,
        message_id: i64,
        content: ContentType,
        caption: Option<String>,
    },
}

impl InboundEvent {
    pub fn sender(&self) -> &Sender {
        match self {
            InboundEvent::Message { sender, .. }
            | InboundEvent::Callback { sender, .. }
            | InboundEvent::Media { sender, .. } => sender,
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            InboundEvent::Message { chat_id, .. }
            | InboundEvent::Callback { chat_id, .. }
            | InboundEvent::Media { chat_id, .. } => *chat_id,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            InboundEvent::Message { .. } => "message",
            InboundEvent::Callback { .. } => "callback",
            InboundEvent::Media { .. } => "media",
        }
    }
}

/// Per-event bindings. Created for one invocation and dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub event_id: Uuid,
    pub user_id: i64,
    pub chat_id: i64,
    pub first_name: String,
    /// `@handle`, or empty when the sender has none.
    pub username: String,
    pub text: String,
    pub data: String,
    /// Inbound message, used by `reply`.
    pub message_id: Option<i64>,
    /// Message that an `edit` effect may replace.
    pub editable: Option<MessageRef>,
    pub callback_id: Option<String>,
}

impl EventContext {
    pub fn from_event(event: &InboundEvent) -> Self {
        let sender = event.sender();
        let mut context = Self {
            event_id: Uuid::new_v4(),
            user_id: sender.user_id,
            chat_id: event.chat_id(),
            first_name: sender.first_name.clone(),
            username: sender
                .username
                .as_ref()
                .filter(|u| !u.is_empty())
                .map(|u| format!("@{}", u))
                .unwrap_or_default(),
            text: String::new(),
            data: String::new(),
            message_id: None,
            editable: None,
            callback_id: None,
        };

        match event {
            InboundEvent::Message {
                message_id, text, ..
            } => {
                context.message_id = Some(*message_id);
                context.text = text.clone();
            }
            InboundEvent::Callback {
                callback_id,
                data,
                message,
                ..
            } => {
                // ボタン押下ではtextにもデータを入れる
                context.text = data.clone();
                context.data = data.clone();
                context.editable = *message;
                context.message_id = message.map(|m| m.message_id);
                context.callback_id = Some(callback_id.clone());
            }
            InboundEvent::Media {
                message_id,
                caption,
                ..
            } => {
                context.message_id = Some(*message_id);
                context.text = caption.clone().unwrap_or_default();
            }
        }
        context
    }

    /// Fixed system bindings. Date and time come from the wall clock at the
    /// moment of the call, not from the event.
    pub fn system_binding(&self, name: &str) -> Option<Value> {
        match name {
            "date" => Some(Value::String(Local::now().format(DATE_FORMAT).to_string())),
            "time" => Some(Value::String(Local::now().format(TIME_FORMAT).to_string())),
            "datetime" => Some(Value::String(
                Local::now().format(DATETIME_FORMAT).to_string(),
            )),
            _ => self.field(name),
        }
    }

    /// One of [`CONTEXT_FIELDS`].
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "user_id" => Some(Value::Integer(self.user_id)),
            "chat_id" => Some(Value::Integer(self.chat_id)),
            "first_name" => Some(Value::String(self.first_name.clone())),
            "username" => Some(Value::String(self.username.clone())),
            "text" => Some(Value::String(self.text.clone())),
            "data" => Some(Value::String(self.data.clone())),
            _ => None,
        }
    }

    /// A context for tests and tooling, not tied to any real event.
    pub fn synthetic(chat_id: i64) -> Self {
        Self::from_event(&InboundEvent::Message {
            sender: Sender {
                user_id: chat_id,
                first_name: String::new(),
                username: None,
            },
            chat_id,
            message_id: 0,
            text: String::new(),
        })
    }
}
