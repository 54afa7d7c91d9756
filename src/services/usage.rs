use chrono::{DateTime, NaiveDate, Utc};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{UsageCounter, UsageDelta};

/// Daily usage ledger. Counters are keyed by the UTC day of the event.
#[derive(Clone)]
pub struct UsageService {
    repo: Repository,
}

impl UsageService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn record(
        &self,
        project_id: i64,
        at: DateTime<Utc>,
        delta: UsageDelta,
    ) -> Result<UsageCounter> {
        self.repo.add_usage(project_id, at.date_naive(), delta).await
    }

    /// Counters for `day`, zeroed when nothing was recorded.
    pub async fn usage_for_day(&self, project_id: i64, day: NaiveDate) -> Result<UsageCounter> {
        Ok(self
            .repo
            .get_usage(project_id, day)
            .await?
            .unwrap_or(UsageCounter {
                project_id,
                day,
                ..Default::default()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn records_accumulate_per_day() {
        let repo = Repository::open_in_memory().await.unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        repo.create_project("owner", "Tech", "UTC", at).await.unwrap();
        let usage = UsageService::new(repo);

        usage.record(1, at, UsageDelta::llm_call(30)).await.unwrap();
        let counter = usage.record(1, at, UsageDelta::llm_call(12)).await.unwrap();
        assert_eq!(counter.llm_calls, 2);
        assert_eq!(counter.tokens_est, 42);

        let empty = usage
            .usage_for_day(1, at.date_naive().succ_opt().unwrap())
            .await
            .unwrap();
        assert_eq!(empty.llm_calls, 0);
        assert_eq!(empty.project_id, 1);
    }
}
