use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::channel::{ChannelClient, ChannelError};
use crate::config::PublishingConfig;
use crate::db::Repository;
use crate::error::{AppError, PublicationError, Result};
use crate::limits::{IdempotencyStore, QuotaKind, QuotaService, RateLimiter};
use crate::models::{
    DraftStatus, Inserted, NewPublicationLog, PostDraft, PublicationLog, PublicationStatus,
    UsageDelta,
};
use crate::services::UsageService;

/// Backoff between delivery attempts. Swapped out in tests to record delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub enum PublishOutcome {
    /// Delivered by this call.
    Published(PublicationLog),
    /// An earlier call already handled this draft and slot.
    Existing(PublicationLog),
    /// Delivery failed permanently or ran out of retries.
    Failed(PublicationLog),
}

impl PublishOutcome {
    pub fn log(&self) -> &PublicationLog {
        match self {
            PublishOutcome::Published(log)
            | PublishOutcome::Existing(log)
            | PublishOutcome::Failed(log) => log,
        }
    }

    pub fn into_log(self) -> PublicationLog {
        match self {
            PublishOutcome::Published(log)
            | PublishOutcome::Existing(log)
            | PublishOutcome::Failed(log) => log,
        }
    }
}

#[derive(Clone)]
pub struct PublicationService {
    repo: Repository,
    channel: Arc<dyn ChannelClient>,
    quota: QuotaService,
    rate_limiter: RateLimiter,
    idempotency: IdempotencyStore,
    usage: UsageService,
    sleeper: Arc<dyn Sleeper>,
    config: PublishingConfig,
}

impl PublicationService {
    pub fn new(
        repo: Repository,
        channel: Arc<dyn ChannelClient>,
        quota: QuotaService,
        rate_limiter: RateLimiter,
        idempotency: IdempotencyStore,
        usage: UsageService,
        config: PublishingConfig,
    ) -> Self {
        Self {
            repo,
            channel,
            quota,
            rate_limiter,
            idempotency,
            usage,
            sleeper: Arc::new(TokioSleeper),
            config,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Publish a draft right away (no schedule slot).
    pub async fn publish_draft(&self, draft_id: i64) -> Result<PublishOutcome> {
        self.publish(draft_id, None, Utc::now()).await
    }

    /// Publish a draft for a schedule slot. At most one delivery per (draft, slot).
    pub async fn publish_scheduled(
        &self,
        draft_id: i64,
        slot: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome> {
        self.publish(draft_id, Some(slot), now).await
    }

    pub async fn publish(
        &self,
        draft_id: i64,
        slot: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome> {
        let draft = self
            .repo
            .get_draft(draft_id)
            .await?
            .ok_or(PublicationError::DraftNotFound(draft_id))?;

        if let Some(log) = self.repo.get_publication_log(draft_id, slot).await? {
            if log.status == PublicationStatus::Published {
                return Ok(PublishOutcome::Existing(log));
            }
        }

        if draft.status == DraftStatus::Rejected {
            return Err(AppError::Validation(format!("draft {draft_id} was rejected")));
        }

        let key = match slot {
            Some(slot) => format!("publish:{draft_id}:{}", slot.timestamp()),
            None => format!("publish:{draft_id}"),
        };
        let ttl = Duration::from_secs(self.config.idempotency_ttl_secs);
        if !self.idempotency.acquire(&key, ttl).await? {
            return match self.repo.get_publication_log(draft_id, slot).await? {
                Some(log) => Ok(PublishOutcome::Existing(log)),
                None => Err(PublicationError::InProgress(draft_id).into()),
            };
        }

        let channel_id = match self.admit(&draft, slot, now).await {
            Ok(channel_id) => channel_id,
            Err(e) => {
                // nothing was sent, so a later attempt may claim the key again
                self.idempotency.release(&key).await?;
                return Err(e);
            }
        };

        self.deliver(&draft, &channel_id, slot, now).await
    }

    /// Checks that must pass before delivery: a connected channel, then the
    /// hourly rate limit, then the daily publish quota. Returns the channel id.
    async fn admit(
        &self,
        draft: &PostDraft,
        slot: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let binding = self
            .repo
            .get_channel_binding(draft.project_id)
            .await?
            .filter(|b| b.is_connected())
            .ok_or(PublicationError::ChannelNotConnected(draft.project_id))?;

        self.rate_limiter.ensure(draft.project_id).await?;

        if let Err(e) = self
            .quota
            .ensure_at(draft.project_id, QuotaKind::Publishes, now)
            .await
        {
            if matches!(e, AppError::QuotaExceeded { .. }) {
                self.fail(draft, slot, "quota", &e.to_string(), now).await?;
            }
            return Err(e);
        }

        Ok(binding.channel_id)
    }

    async fn deliver(
        &self,
        draft: &PostDraft,
        channel_id: &str,
        slot: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome> {
        let attempts = self.config.max_retries + 1;
        let mut last_error: Option<ChannelError> = None;

        for attempt in 1..=attempts {
            match self.channel.send_post(channel_id, &draft.text).await {
                Ok(message_id) => {
                    tracing::info!(
                        project_id = draft.project_id,
                        draft_id = draft.id,
                        attempt,
                        message_id = %message_id,
                        "Draft published"
                    );
                    return self.succeed(draft, slot, message_id, now).await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        project_id = draft.project_id,
                        draft_id = draft.id,
                        attempt,
                        error = %e,
                        "Delivery failed"
                    );
                    if attempt < attempts {
                        let delay = match &e {
                            ChannelError::RateLimited { retry_after_secs } => Duration::from_secs(
                                (*retry_after_secs).min(self.config.max_retry_after_secs),
                            ),
                            _ => Duration::from_millis(
                                self.config.retry_base_ms * u64::from(attempt),
                            ),
                        };
                        self.sleeper.sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::warn!(
                        project_id = draft.project_id,
                        draft_id = draft.id,
                        error = %e,
                        "Delivery rejected by channel"
                    );
                    let log = self.fail(draft, slot, e.code(), &e.to_string(), now).await?;
                    return Ok(PublishOutcome::Failed(log));
                }
            }
        }

        let (code, text) = match &last_error {
            Some(e) => (e.code(), e.to_string()),
            None => ("unknown", "delivery failed".to_string()),
        };
        let log = self.fail(draft, slot, code, &text, now).await?;
        Ok(PublishOutcome::Failed(log))
    }

    async fn succeed(
        &self,
        draft: &PostDraft,
        slot: Option<DateTime<Utc>>,
        message_id: String,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome> {
        self.repo
            .update_draft_status(draft.id, DraftStatus::Published)
            .await?;
        let inserted = self
            .repo
            .record_publication(NewPublicationLog::published(draft.id, slot, message_id, now), now)
            .await?;
        match inserted {
            Inserted::Created(log) => {
                self.usage
                    .record(draft.project_id, now, UsageDelta::publish())
                    .await?;
                Ok(PublishOutcome::Published(log))
            }
            Inserted::Existing(log) => Ok(PublishOutcome::Existing(log)),
        }
    }

    async fn fail(
        &self,
        draft: &PostDraft,
        slot: Option<DateTime<Utc>>,
        code: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<PublicationLog> {
        let log = self
            .repo
            .record_publication(NewPublicationLog::failed(draft.id, slot, code, text), now)
            .await?
            .into_inner();
        // a published row for this key wins over a late failure
        if log.status == PublicationStatus::Failed {
            self.repo
                .update_draft_status(draft.id, DraftStatus::Failed)
                .await?;
        }
        tracing::info!(draft_id = draft.id, code, "Publication failed");
        Ok(log)
    }
}
