//! Messaging-channel delivery backends.

#[cfg(test)]
pub(crate) mod fake;
mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ChannelConfig;

pub use telegram::TelegramClient;

/// Delivery failures, split by how the caller should react.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel not found: {0}")]
    NotFound(String),

    #[error("posting to channel forbidden: {0}")]
    Forbidden(String),

    #[error("transient channel error: {0}")]
    Transient(String),

    #[error("channel rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl ChannelError {
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::NotFound(_) => "channel_not_found",
            ChannelError::Forbidden(_) => "channel_forbidden",
            ChannelError::Transient(_) => "network",
            ChannelError::RateLimited { .. } => "rate_limited",
        }
    }

    /// Transient and rate-limited errors may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::Transient(_) | ChannelError::RateLimited { .. }
        )
    }
}

#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Deliver `text` and return the channel's message id.
    async fn send_post(&self, channel_id: &str, text: &str) -> Result<String, ChannelError>;

    /// Prove the bot can post to the channel. Implementations may remove the message afterwards.
    async fn send_test_message(&self, channel_id: &str, text: &str) -> Result<(), ChannelError>;
}

/// Stand-in used when no bot token is configured. Every delivery is refused.
pub struct UnconfiguredChannel;

#[async_trait]
impl ChannelClient for UnconfiguredChannel {
    async fn send_post(&self, _channel_id: &str, _text: &str) -> Result<String, ChannelError> {
        Err(ChannelError::Forbidden("no bot token configured".to_string()))
    }

    async fn send_test_message(&self, _channel_id: &str, _text: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Forbidden("no bot token configured".to_string()))
    }
}

pub fn build_channel(config: &ChannelConfig) -> crate::error::Result<Arc<dyn ChannelClient>> {
    if config.bot_token.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("No bot token configured, publishing is disabled");
        return Ok(Arc::new(UnconfiguredChannel));
    }
    Ok(Arc::new(TelegramClient::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(ChannelError::Transient("timeout".into()).is_retryable());
        assert!(ChannelError::RateLimited { retry_after_secs: 3 }.is_retryable());
        assert!(!ChannelError::Forbidden("no rights".into()).is_retryable());
        assert!(!ChannelError::NotFound("gone".into()).is_retryable());
    }

    #[tokio::test]
    async fn missing_token_refuses_delivery() {
        let channel = build_channel(&ChannelConfig::default()).unwrap();
        let err = channel.send_post("@x", "hi").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn codes_are_distinct() {
        let codes = [
            ChannelError::NotFound(String::new()).code(),
            ChannelError::Forbidden(String::new()).code(),
            ChannelError::Transient(String::new()).code(),
            ChannelError::RateLimited { retry_after_secs: 1 }.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
