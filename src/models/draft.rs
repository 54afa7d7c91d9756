use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

super::string_enum!(
    /// Lifecycle of a generated post. `Ready` drafts are the only ones autopost picks up.
    DraftStatus {
        New => "new",
        NeedsApproval => "needs_approval",
        Ready => "ready",
        Rejected => "rejected",
        Published => "published",
        Failed => "failed",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDraft {
    pub id: i64,
    pub project_id: i64,
    pub source_item_id: i64,
    pub template_id: Option<String>,
    pub text: String,
    pub draft_hash: String,
    pub status: DraftStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDraft {
    pub project_id: i64,
    pub source_item_id: i64,
    pub template_id: Option<String>,
    pub text: String,
    pub draft_hash: String,
    pub status: DraftStatus,
}
