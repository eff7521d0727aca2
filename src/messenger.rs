//! # Outbound Messaging
//!
//! The runtime never talks to a chat platform directly. Every outbound call
//! goes through the [`Messenger`] trait, implemented by the Telegram
//! transport in the CLI crate and by [`RecordingMessenger`] for tests and the
//! console simulator.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::context::MessageRef;
use crate::keyboard::KeyboardMarkup;

#[derive(Error, Debug, Clone, PartialEq, IntoStaticStr)]
pub enum MessengerError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Request rejected ({status}): {description}")]
    Rejected { status: u16, description: String },
}

impl MessengerError {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

pub type MessengerResult<T> = Result<T, MessengerError>;

/// Text plus presentation, already substituted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub markup: Option<KeyboardMarkup>,
    pub parse_mode: Option<String>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Returns the id of the new message.
    async fn send_message(&self, chat_id: i64, message: OutboundMessage) -> MessengerResult<i64>;

    async fn reply_message(
        &self,
        chat_id: i64,
        reply_to: i64,
        message: OutboundMessage,
    ) -> MessengerResult<i64>;

    async fn edit_message(&self, target: MessageRef, message: OutboundMessage)
    -> MessengerResult<()>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<String>,
        alert: bool,
    ) -> MessengerResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundCall {
    Send {
        chat_id: i64,
        message: OutboundMessage,
    },
    Reply {
        chat_id: i64,
        reply_to: i64,
        message: OutboundMessage,
    },
    Edit {
        target: MessageRef,
        message: OutboundMessage,
    },
    Answer {
        callback_id: String,
        text: Option<String>,
        alert: bool,
    },
}

impl OutboundCall {
    /// Message text, or the acknowledgement text for answers.
    pub fn text(&self) -> Option<&str> {
        match self {
            OutboundCall::Send { message, .. }
            | OutboundCall::Reply { message, .. }
            | OutboundCall::Edit { message, .. } => Some(&message.text),
            OutboundCall::Answer { text, .. } => text.as_deref(),
        }
    }
}

/// Keeps every call in memory. Message ids are allocated sequentially from 1.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    calls: Mutex<Vec<OutboundCall>>,
    next_id: AtomicI64,
    failing: AtomicBool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call is recorded and then rejected.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().await.clone()
    }

    pub async fn take(&self) -> Vec<OutboundCall> {
        std::mem::take(&mut *self.calls.lock().await)
    }

    async fn record(&self, call: OutboundCall) -> MessengerResult<()> {
        self.calls.lock().await.push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MessengerError::Rejected {
                status: 400,
                description: "recording messenger set to fail".to_string(),
            });
        }
        Ok(())
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(&self, chat_id: i64, message: OutboundMessage) -> MessengerResult<i64> {
        self.record(OutboundCall::Send { chat_id, message }).await?;
        Ok(self.allocate_id())
    }

    async fn reply_message(
        &self,
        chat_id: i64,
        reply_to: i64,
        message: OutboundMessage,
    ) -> MessengerResult<i64> {
        self.record(OutboundCall::Reply {
            chat_id,
            reply_to,
            message,
        })
        .await?;
        Ok(self.allocate_id())
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        message: OutboundMessage,
    ) -> MessengerResult<()> {
        self.record(OutboundCall::Edit { target, message }).await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<String>,
        alert: bool,
    ) -> MessengerResult<()> {
        self.record(OutboundCall::Answer {
            callback_id: callback_id.to_string(),
            text,
            alert,
        })
        .await
    }
}
