use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Utc};

use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::store::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Drafts,
    Publishes,
    LlmCalls,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::Drafts => "drafts",
            QuotaKind::Publishes => "publishes",
            QuotaKind::LlmCalls => "llm_calls",
        }
    }
}

/// Daily per-project counters. Keys carry the UTC date, so a new day always
/// starts from zero even if an old key has not expired yet.
#[derive(Clone)]
pub struct QuotaService {
    store: Arc<dyn KvStore>,
    limits: LimitsConfig,
}

impl QuotaService {
    pub fn new(store: Arc<dyn KvStore>, limits: LimitsConfig) -> Self {
        Self { store, limits }
    }

    pub fn limit(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Drafts => self.limits.drafts_per_day,
            QuotaKind::Publishes => self.limits.publishes_per_day,
            QuotaKind::LlmCalls => self.limits.llm_calls_per_day,
        }
    }

    pub async fn ensure(&self, project_id: i64, kind: QuotaKind) -> Result<()> {
        self.ensure_at(project_id, kind, Utc::now()).await
    }

    /// Consume one unit of `kind` for the day containing `now`.
    pub async fn ensure_at(&self, project_id: i64, kind: QuotaKind, now: DateTime<Utc>) -> Result<()> {
        let key = format!(
            "quota:{}:{}:{}",
            kind.as_str(),
            project_id,
            now.format("%Y%m%d")
        );
        let used = self.store.incr(&key, until_end_of_day(now)).await?;
        let limit = self.limit(kind);
        if used > i64::from(limit) {
            tracing::info!(project_id, kind = kind.as_str(), limit, "Quota exceeded");
            return Err(AppError::QuotaExceeded {
                kind: kind.as_str(),
                limit,
            });
        }
        Ok(())
    }

    /// Sources are bounded by how many exist, not by a daily counter.
    pub fn ensure_source_capacity(&self, current: u32) -> Result<()> {
        if current >= self.limits.sources_limit {
            return Err(AppError::QuotaExceeded {
                kind: "sources",
                limit: self.limits.sources_limit,
            });
        }
        Ok(())
    }
}

fn until_end_of_day(now: DateTime<Utc>) -> Duration {
    let end = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    match end {
        Some(end) => (end - now).to_std().unwrap_or(Duration::from_secs(1)),
        None => Duration::from_secs(24 * 60 * 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn service(drafts_per_day: u32) -> QuotaService {
        let limits = LimitsConfig {
            drafts_per_day,
            sources_limit: 2,
            ..LimitsConfig::default()
        };
        QuotaService::new(Arc::new(MemoryStore::new()), limits)
    }

    #[tokio::test]
    async fn second_draft_same_day_is_rejected() {
        let quota = service(1);
        let morning = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        quota.ensure_at(1, QuotaKind::Drafts, morning).await.unwrap();
        let err = quota
            .ensure_at(1, QuotaKind::Drafts, morning + chrono::Duration::hours(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { kind: "drafts", limit: 1 }));

        // other projects and kinds are independent
        quota.ensure_at(2, QuotaKind::Drafts, morning).await.unwrap();
        quota.ensure_at(1, QuotaKind::Publishes, morning).await.unwrap();

        let next_day = morning + chrono::Duration::days(1);
        quota.ensure_at(1, QuotaKind::Drafts, next_day).await.unwrap();
    }

    #[test]
    fn source_capacity_compares_current_count() {
        let quota = service(1);
        assert!(quota.ensure_source_capacity(1).is_ok());
        assert!(matches!(
            quota.ensure_source_capacity(2),
            Err(AppError::QuotaExceeded { kind: "sources", .. })
        ));
    }

    #[test]
    fn expiry_lands_on_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 23, 59, 0).unwrap();
        assert_eq!(until_end_of_day(now), Duration::from_secs(60));
    }
}
