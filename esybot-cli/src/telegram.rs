//! Telegram Bot API transport: long polling in, [`Messenger`] out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use esybot::config::TransportConfig;
use esybot::messenger::{MessengerError, MessengerResult};
use esybot::{ContentType, InboundEvent, MessageRef, Messenger, OutboundMessage, Runtime, Sender};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },
}

impl From<TelegramError> for MessengerError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::Http(e) => MessengerError::Request(e.to_string()),
            TelegramError::Api { code, description } => MessengerError::Rejected {
                status: u16::try_from(code).unwrap_or(0),
                description,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<JsonValue>,
    pub document: Option<JsonValue>,
    pub voice: Option<JsonValue>,
    pub sticker: Option<JsonValue>,
}

impl Message {
    fn content(&self) -> Option<ContentType> {
        if self.photo.is_some() {
            Some(ContentType::Photo)
        } else if self.document.is_some() {
            Some(ContentType::Document)
        } else if self.voice.is_some() {
            Some(ContentType::Voice)
        } else if self.sticker.is_some() {
            Some(ContentType::Sticker)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

fn sender(user: Option<&User>) -> Sender {
    user.map(|u| Sender {
        user_id: u.id,
        first_name: u.first_name.clone(),
        username: u.username.clone(),
    })
    .unwrap_or_default()
}

impl Update {
    /// `None` for update kinds the runtime does not handle.
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            let chat_id = query
                .message
                .as_ref()
                .map(|m| m.chat.id)
                .unwrap_or(query.from.id);
            return Some(InboundEvent::Callback {
                sender: sender(Some(&query.from)),
                chat_id,
                callback_id: query.id,
                data: query.data.unwrap_or_default(),
                message: query.message.map(|m| MessageRef {
                    chat_id: m.chat.id,
                    message_id: m.message_id,
                }),
            });
        }

        let message = self.message?;
        let sender = sender(message.from.as_ref());
        let content = message.content();
        if let Some(text) = message.text {
            return Some(InboundEvent::Message {
                sender,
                chat_id: message.chat.id,
                message_id: message.message_id,
                text,
            });
        }
        Some(InboundEvent::Media {
            sender,
            chat_id: message.chat.id,
            message_id: message.message_id,
            content: content?,
            caption: message.caption,
        })
    }
}

pub struct TelegramClient {
    client: Client,
    api_url: String,
    token: SecretString,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: SecretString, config: &TransportConfig) -> Result<Self, TelegramError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            poll_timeout: config.poll_timeout,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: JsonValue,
    ) -> Result<T, TelegramError> {
        let url = format!(
            "{}/bot{}/{}",
            self.api_url,
            self.token.expose_secret(),
            method
        );
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await?;
        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(TelegramError::Api {
                code: error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: description.unwrap_or_else(|| "no result".to_string()),
            }),
        }
    }

    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", json!({})).await
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": self.poll_timeout.as_secs(),
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    fn message_body(chat_id: i64, message: &OutboundMessage) -> JsonValue {
        let mut body = json!({ "chat_id": chat_id, "text": message.text });
        if let Some(markup) = &message.markup {
            body["reply_markup"] = json!(markup);
        }
        if let Some(mode) = &message.parse_mode {
            body["parse_mode"] = json!(mode);
        }
        body
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, chat_id: i64, message: OutboundMessage) -> MessengerResult<i64> {
        let sent: Message = self
            .call("sendMessage", Self::message_body(chat_id, &message))
            .await?;
        Ok(sent.message_id)
    }

    async fn reply_message(
        &self,
        chat_id: i64,
        reply_to: i64,
        message: OutboundMessage,
    ) -> MessengerResult<i64> {
        let mut body = Self::message_body(chat_id, &message);
        body["reply_to_message_id"] = json!(reply_to);
        let sent: Message = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        message: OutboundMessage,
    ) -> MessengerResult<()> {
        let mut body = Self::message_body(target.chat_id, &message);
        body["message_id"] = json!(target.message_id);
        // 編集結果はMessageかtrueのどちらか
        let _: JsonValue = self.call("editMessageText", body).await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<String>,
        alert: bool,
    ) -> MessengerResult<()> {
        let mut body = json!({ "callback_query_id": callback_id, "show_alert": alert });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", body).await?;
        Ok(())
    }
}

/// Long-polls until `shutdown` resolves. Each update is handled on its own
/// task; transport errors back off exponentially and never stop the loop.
#[instrument(level = "debug", skip_all)]
pub async fn run_polling<F>(
    runtime: Arc<Runtime>,
    client: Arc<TelegramClient>,
    shutdown: F,
) -> Result<(), TelegramError>
where
    F: std::future::Future<Output = ()>,
{
    let me = client.get_me().await?;
    info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        "polling for updates"
    );

    tokio::pin!(shutdown);
    let mut offset = 0;
    let mut backoff = Duration::from_secs(1);

    loop {
        let updates = tokio::select! {
            _ = &mut shutdown => break,
            result = client.get_updates(offset) => result,
        };
        let updates = match updates {
            Ok(updates) => {
                backoff = Duration::from_secs(1);
                updates
            }
            Err(e) => {
                error!(error = %e, retry_in = ?backoff, "getUpdates failed");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let update_id = update.update_id;
            let Some(event) = update.into_event() else {
                debug!(update_id, "ignoring unsupported update");
                continue;
            };
            let runtime = runtime.clone();
            tokio::spawn(async move {
                if runtime.handle_event(&event).await.is_none() {
                    debug!(update_id, "update not handled");
                }
            });
        }
    }

    warn!("shutdown requested, polling stopped");
    Ok(())
}
