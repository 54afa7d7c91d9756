use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ChannelClient, ChannelError};
use crate::config::ChannelConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteMessageRequest<'a> {
    chat_id: &'a str,
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Telegram Bot API client.
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &ChannelConfig) -> Result<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Config("channel.bot_token is not set".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> std::result::Result<T, ChannelError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Transient(e.to_string()))?;

        let status = response.status();
        let payload: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::Transient(format!("HTTP {status}: {e}")))?;

        if status.is_success() && payload.ok {
            return payload
                .result
                .ok_or_else(|| ChannelError::Transient("empty result".to_string()));
        }

        let description = payload
            .description
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(classify(status, description, payload.parameters))
    }
}

fn classify(
    status: StatusCode,
    description: String,
    parameters: Option<ResponseParameters>,
) -> ChannelError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ChannelError::RateLimited {
            retry_after_secs: parameters.and_then(|p| p.retry_after).unwrap_or(1),
        },
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ChannelError::Forbidden(description),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => ChannelError::NotFound(description),
        _ => ChannelError::Transient(description),
    }
}

#[async_trait]
impl ChannelClient for TelegramClient {
    async fn send_post(
        &self,
        channel_id: &str,
        text: &str,
    ) -> std::result::Result<String, ChannelError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &SendMessageRequest {
                    chat_id: channel_id,
                    text,
                },
            )
            .await?;
        Ok(sent.message_id.to_string())
    }

    async fn send_test_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> std::result::Result<(), ChannelError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &SendMessageRequest {
                    chat_id: channel_id,
                    text,
                },
            )
            .await?;

        let deleted: std::result::Result<bool, ChannelError> = self
            .call(
                "deleteMessage",
                &DeleteMessageRequest {
                    chat_id: channel_id,
                    message_id: sent.message_id,
                },
            )
            .await;
        if let Err(e) = deleted {
            tracing::debug!(channel_id, "Could not delete test message: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bot_api_failures() {
        let limited = classify(
            StatusCode::TOO_MANY_REQUESTS,
            "Too Many Requests".into(),
            Some(ResponseParameters {
                retry_after: Some(7),
            }),
        );
        assert_eq!(limited, ChannelError::RateLimited { retry_after_secs: 7 });

        assert!(matches!(
            classify(StatusCode::FORBIDDEN, "bot was kicked".into(), None),
            ChannelError::Forbidden(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "Bad Request: chat not found".into(), None),
            ChannelError::NotFound(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "Bad Gateway".into(), None),
            ChannelError::Transient(_)
        ));
    }

    #[test]
    fn requires_a_token() {
        let config = ChannelConfig::default();
        assert!(TelegramClient::new(&config).is_err());
    }
}
