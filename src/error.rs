use thiserror::Error;

use crate::channel::ChannelError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Source already exists for this project: {0}")]
    DuplicateSource(String),

    #[error("Quota exceeded for {kind} (limit {limit})")]
    QuotaExceeded { kind: &'static str, limit: u32 },

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Cooldown active, retry after {retry_after_secs}s")]
    Cooldown { retry_after_secs: u64 },

    #[error(transparent)]
    DraftGeneration(#[from] DraftGenerationError),

    #[error(transparent)]
    Publication(#[from] PublicationError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Generation backend error: {0}")]
    Generation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DraftGenerationError {
    #[error("Source item {0} not found")]
    ItemNotFound(i64),

    #[error("Source {0} not found")]
    SourceNotFound(i64),

    #[error("A draft with the same hash was created within the last {window_days} days")]
    DuplicateDraft { window_days: i64 },

    #[error("Content of item {item_id} was already drafted within the last {window_days} days")]
    DuplicateContent { item_id: i64, window_days: i64 },

    #[error("Generation backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[derive(Debug, Error)]
pub enum PublicationError {
    #[error("Publish of draft {0} is already in progress")]
    InProgress(i64),

    #[error("Draft {0} not found")]
    DraftNotFound(i64),

    #[error("Channel for project {0} is not connected")]
    ChannelNotConnected(i64),
}

impl AppError {
    /// Short stable code written to publication logs and surfaced by the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::QuotaExceeded { .. } => "quota",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Cooldown { .. } => "cooldown",
            AppError::NotFound(_) => "not_found",
            AppError::DuplicateSource(_) => "duplicate_source",
            AppError::Validation(_) => "invalid_input",
            AppError::DraftGeneration(_) => "draft_generation",
            AppError::Publication(_) => "publication",
            AppError::Channel(e) => e.code(),
            AppError::Generation(_) => "generation_backend",
            _ => "internal",
        }
    }

    /// Message for a human operator. Every error kind gets its own wording.
    pub fn user_message(&self) -> String {
        match self {
            AppError::QuotaExceeded { kind, limit } => {
                format!("Daily limit reached for {kind} ({limit}). Try again tomorrow.")
            }
            AppError::RateLimited { retry_after_secs } => {
                format!("Too many publications this hour. Try again in {retry_after_secs} seconds.")
            }
            AppError::Cooldown { retry_after_secs } => {
                format!("This action was triggered recently. Wait {retry_after_secs} seconds.")
            }
            AppError::NotFound(what) => format!("{what} does not exist."),
            AppError::DuplicateSource(url) => format!("Source {url} already exists."),
            AppError::Validation(msg) => format!("Invalid input: {msg}"),
            AppError::DraftGeneration(e) => match e {
                DraftGenerationError::ItemNotFound(_) => {
                    "The content item for this draft no longer exists.".to_string()
                }
                DraftGenerationError::SourceNotFound(_) => {
                    "The source for this content item no longer exists.".to_string()
                }
                DraftGenerationError::DuplicateDraft { .. } => {
                    "This draft was already generated recently.".to_string()
                }
                DraftGenerationError::DuplicateContent { .. } => {
                    "The same content was already drafted from another source recently."
                        .to_string()
                }
                DraftGenerationError::BackendUnavailable(_) => {
                    "Text generation is temporarily unavailable. Try again later.".to_string()
                }
            },
            AppError::Publication(e) => match e {
                PublicationError::InProgress(_) => {
                    "This draft is already being published.".to_string()
                }
                PublicationError::DraftNotFound(_) => "Draft not found.".to_string(),
                PublicationError::ChannelNotConnected(_) => {
                    "Connect and verify the channel before publishing.".to_string()
                }
            },
            AppError::Channel(e) => match e {
                ChannelError::NotFound(_) => {
                    "Channel not found or the bot is not an administrator.".to_string()
                }
                ChannelError::Forbidden(_) => "The bot may not post to this channel.".to_string(),
                ChannelError::Transient(_) => {
                    "The messaging service is unreachable. Try again later.".to_string()
                }
                ChannelError::RateLimited { retry_after_secs } => format!(
                    "The messaging service asked to slow down. Retry in {retry_after_secs} seconds."
                ),
            },
            AppError::Generation(_) => {
                "Text generation failed. Try again later.".to_string()
            }
            AppError::Config(msg) => format!("Configuration problem: {msg}"),
            _ => format!("Internal error: {self}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
