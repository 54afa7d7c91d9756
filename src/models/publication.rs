use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

super::string_enum!(
    PublicationStatus {
        New => "new",
        Published => "published",
        Failed => "failed",
    }
);

/// Append-only record of one publish outcome. `scheduled_at = None` marks a manual publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationLog {
    pub id: i64,
    pub draft_id: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub external_message_id: Option<String>,
    pub status: PublicationStatus,
    pub error_code: Option<String>,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPublicationLog {
    pub draft_id: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub external_message_id: Option<String>,
    pub status: PublicationStatus,
    pub error_code: Option<String>,
    pub error_text: Option<String>,
}

impl NewPublicationLog {
    pub fn published(
        draft_id: i64,
        scheduled_at: Option<DateTime<Utc>>,
        message_id: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            draft_id,
            scheduled_at,
            published_at: Some(at),
            external_message_id: Some(message_id),
            status: PublicationStatus::Published,
            error_code: None,
            error_text: None,
        }
    }

    pub fn failed(
        draft_id: i64,
        scheduled_at: Option<DateTime<Utc>>,
        code: &str,
        text: impl Into<String>,
    ) -> Self {
        Self {
            draft_id,
            scheduled_at,
            published_at: None,
            external_message_id: None,
            status: PublicationStatus::Failed,
            error_code: Some(code.to_string()),
            error_text: Some(text.into()),
        }
    }
}
