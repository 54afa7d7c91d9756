use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub project_id: i64,
    pub day: NaiveDate,
    pub drafts_generated: i64,
    pub posts_published: i64,
    pub llm_calls: i64,
    pub tokens_est: i64,
}

/// Additive increments applied to a day's counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageDelta {
    pub drafts_generated: i64,
    pub posts_published: i64,
    pub llm_calls: i64,
    pub tokens_est: i64,
}

impl UsageDelta {
    pub fn draft() -> Self {
        Self {
            drafts_generated: 1,
            ..Default::default()
        }
    }

    pub fn publish() -> Self {
        Self {
            posts_published: 1,
            ..Default::default()
        }
    }

    pub fn llm_call(tokens: i64) -> Self {
        Self {
            llm_calls: 1,
            tokens_est: tokens,
            ..Default::default()
        }
    }
}
