//! Telegram wire types and the outbound message client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Inbound webhook payload. Only the fields the bot consumes are modelled.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: i64,
    pub language_code: Option<String>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(u16),
    #[error("api: {0}")]
    Api(String),
}

/// Outbound text delivery. Behind a trait so webhook tests can record instead of
/// calling Telegram.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// `sendMessage` response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

/// Client for the Bot API `sendMessage` method.
pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
}

impl TelegramClient {
    /// `api_url` is the bot-specific base, e.g. `https://api.telegram.org/bot<token>/`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        let url = format!("{}sendMessage", self.api_url);
        let response = self
            .http
            .post(url)
            .form(&[("chat_id", chat_id.to_string()), ("text", text.to_string())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status(status.as_u16()));
        }
        let body: ApiResponse = response.json().await?;
        if !body.ok {
            return Err(SendError::Api(
                body.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(())
    }
}
