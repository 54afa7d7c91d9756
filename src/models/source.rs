use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

super::string_enum!(
    SourceType {
        Rss => "rss",
        Url => "url",
    }
);

super::string_enum!(
    SourceStatus {
        Pending => "pending",
        Ok => "ok",
        Error => "error",
        Broken => "broken",
    }
);

super::string_enum!(
    SourceItemStatus {
        New => "new",
        Processed => "processed",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub project_id: i64,
    pub source_type: SourceType,
    pub url: String,
    pub status: SourceStatus,
    pub fetch_interval_min: u32,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: i64,
    pub source_id: i64,
    pub external_id: String,
    pub link: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_text: Option<String>,
    pub facts_cache: Option<String>,
    pub content_hash: String,
    pub status: SourceItemStatus,
}

/// A candidate item produced by a fetch, before it is persisted.
#[derive(Debug, Clone)]
pub struct NewSourceItem {
    pub source_id: i64,
    pub external_id: String,
    pub link: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_text: String,
    pub content_hash: String,
}
