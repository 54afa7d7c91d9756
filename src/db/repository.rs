use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use std::str::FromStr;
use std::time::Duration;
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    BindingStatus, ChannelBinding, DraftStatus, Inserted, NewDraft, NewPublicationLog,
    NewSourceItem, PostDraft, Project, ProjectSettings, PublicationLog, Schedule, Source,
    SourceItem, SourceType, UsageCounter, UsageDelta,
};

use super::schema::SCHEMA;
use super::{format_day, format_ts, parse_datetime};

const PROJECT_COLUMNS: &str = "id, owner, title, tz, status, created_at";
const SETTINGS_COLUMNS: &str =
    "project_id, language, niche, tone, template_id, max_post_len, safe_mode, autopost_enabled";
const BINDING_COLUMNS: &str =
    "project_id, channel_id, channel_name, status, last_check_at, last_error";
const SOURCE_COLUMNS: &str = "id, project_id, type, url, status, fetch_interval_min, last_fetch_at, last_error, consecutive_failures";
const ITEM_COLUMNS: &str = "id, source_id, external_id, link, title, published_at, raw_text, facts_cache, content_hash, status";
const DRAFT_COLUMNS: &str =
    "id, project_id, source_item_id, template_id, text, draft_hash, status, approved_at, created_at";
const SCHEDULE_COLUMNS: &str = "project_id, tz, slots_json, per_day_limit, enabled";
const LOG_COLUMNS: &str = "id, draft_id, scheduled_at, published_at, external_message_id, status, error_code, error_text, created_at";
const USAGE_COLUMNS: &str =
    "project_id, day, drafts_generated, posts_published, llm_calls, tokens_est";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Project operations

    /// Create a project together with its default settings row.
    pub async fn create_project(
        &self,
        owner: &str,
        title: &str,
        tz: &str,
        now: DateTime<Utc>,
    ) -> Result<Project> {
        let (owner, title, tz) = (owner.to_string(), title.to_string(), tz.to_string());
        let project = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO projects (owner, title, tz, status, created_at) VALUES (?1, ?2, ?3, 'active', ?4)",
                    params![owner, title, tz, format_ts(&now)],
                )?;
                let id = tx.last_insert_rowid();
                write_settings(&tx, &ProjectSettings::defaults(id))?;
                let project = tx.query_row(
                    &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                    params![id],
                    project_from_row,
                )?;
                tx.commit()?;
                Ok(project)
            })
            .await?;
        Ok(project)
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let project = self
            .conn
            .call(move |conn| {
                let project = conn
                    .query_row(
                        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                        params![id],
                        project_from_row,
                    )
                    .optional()?;
                Ok(project)
            })
            .await?;
        Ok(project)
    }

    pub async fn get_settings(&self, project_id: i64) -> Result<Option<ProjectSettings>> {
        let settings = self
            .conn
            .call(move |conn| {
                let settings = conn
                    .query_row(
                        &format!("SELECT {SETTINGS_COLUMNS} FROM project_settings WHERE project_id = ?1"),
                        params![project_id],
                        settings_from_row,
                    )
                    .optional()?;
                Ok(settings)
            })
            .await?;
        Ok(settings)
    }

    pub async fn upsert_settings(&self, settings: ProjectSettings) -> Result<ProjectSettings> {
        let stored = self
            .conn
            .call(move |conn| {
                write_settings(conn, &settings)?;
                Ok(settings)
            })
            .await?;
        Ok(stored)
    }

    // Channel binding operations

    /// Bind (or rebind) the project's channel. The status goes back to `pending`.
    pub async fn upsert_channel_binding(
        &self,
        project_id: i64,
        channel_id: &str,
        channel_name: Option<String>,
    ) -> Result<ChannelBinding> {
        let channel_id = channel_id.to_string();
        let binding = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO channel_bindings (project_id, channel_id, channel_name, status)
                       VALUES (?1, ?2, ?3, 'pending')
                       ON CONFLICT(project_id) DO UPDATE SET
                           channel_id = excluded.channel_id,
                           channel_name = excluded.channel_name,
                           status = 'pending',
                           last_error = NULL"#,
                    params![project_id, channel_id, channel_name],
                )?;
                let binding = conn.query_row(
                    &format!("SELECT {BINDING_COLUMNS} FROM channel_bindings WHERE project_id = ?1"),
                    params![project_id],
                    binding_from_row,
                )?;
                Ok(binding)
            })
            .await?;
        Ok(binding)
    }

    pub async fn get_channel_binding(&self, project_id: i64) -> Result<Option<ChannelBinding>> {
        let binding = self
            .conn
            .call(move |conn| {
                let binding = conn
                    .query_row(
                        &format!("SELECT {BINDING_COLUMNS} FROM channel_bindings WHERE project_id = ?1"),
                        params![project_id],
                        binding_from_row,
                    )
                    .optional()?;
                Ok(binding)
            })
            .await?;
        Ok(binding)
    }

    pub async fn update_channel_status(
        &self,
        project_id: i64,
        status: BindingStatus,
        last_error: Option<String>,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE channel_bindings SET status = ?1, last_error = ?2, last_check_at = ?3 WHERE project_id = ?4",
                    params![status.as_str(), last_error, format_ts(&checked_at), project_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Source operations

    /// Insert a source, or return the existing row for the same (project, url).
    pub async fn insert_source(
        &self,
        project_id: i64,
        source_type: SourceType,
        url: &str,
        fetch_interval_min: u32,
    ) -> Result<Inserted<Source>> {
        let url = url.to_string();
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO sources (project_id, type, url, status, fetch_interval_min)
                       VALUES (?1, ?2, ?3, 'pending', ?4)
                       ON CONFLICT(project_id, url) DO NOTHING"#,
                    params![project_id, source_type.as_str(), url, fetch_interval_min],
                )?;
                let source = conn.query_row(
                    &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE project_id = ?1 AND url = ?2"),
                    params![project_id, url],
                    source_from_row,
                )?;
                Ok(if changed > 0 {
                    Inserted::Created(source)
                } else {
                    Inserted::Existing(source)
                })
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let source = self
            .conn
            .call(move |conn| Ok(source_by_id(conn, id)?))
            .await?;
        Ok(source)
    }

    pub async fn count_sources(&self, project_id: i64) -> Result<u32> {
        let count = self
            .conn
            .call(move |conn| {
                let count: u32 = conn.query_row(
                    "SELECT COUNT(*) FROM sources WHERE project_id = ?1",
                    params![project_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    pub async fn list_sources(&self, project_id: Option<i64>) -> Result<Vec<Source>> {
        let sources = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SOURCE_COLUMNS} FROM sources WHERE ?1 IS NULL OR project_id = ?1 ORDER BY id"
                ))?;
                let sources = stmt
                    .query_map(params![project_id], source_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await?;
        Ok(sources)
    }

    pub async fn record_fetch_success(&self, id: i64, at: DateTime<Utc>) -> Result<Source> {
        let source = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE sources SET status = 'ok', consecutive_failures = 0,
                           last_error = NULL, last_fetch_at = ?1
                       WHERE id = ?2"#,
                    params![format_ts(&at), id],
                )?;
                Ok(source_by_id(conn, id)?)
            })
            .await?;
        source.ok_or_else(|| AppError::NotFound(format!("Source {id}")))
    }

    /// Bump the failure counter in one statement so concurrent fetches never lose a count.
    pub async fn record_fetch_failure(
        &self,
        id: i64,
        error: &str,
        fail_threshold: u32,
        at: DateTime<Utc>,
    ) -> Result<Source> {
        let error = error.to_string();
        let source = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE sources SET
                           consecutive_failures = consecutive_failures + 1,
                           status = CASE WHEN consecutive_failures + 1 >= ?1 THEN 'broken' ELSE 'error' END,
                           last_error = ?2,
                           last_fetch_at = ?3
                       WHERE id = ?4"#,
                    params![fail_threshold, error, format_ts(&at), id],
                )?;
                Ok(source_by_id(conn, id)?)
            })
            .await?;
        source.ok_or_else(|| AppError::NotFound(format!("Source {id}")))
    }

    // Source item operations

    /// Insert a fetched item. Returns `None` when the (source, external id) or
    /// (source, link) pair was already stored.
    pub async fn insert_source_item(
        &self,
        item: NewSourceItem,
        now: DateTime<Utc>,
    ) -> Result<Option<SourceItem>> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO source_items
                           (source_id, external_id, link, title, published_at, raw_text, content_hash, status, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'new', ?8)
                       ON CONFLICT DO NOTHING"#,
                    params![
                        item.source_id,
                        item.external_id,
                        item.link,
                        item.title,
                        item.published_at.map(|dt| format_ts(&dt)),
                        item.raw_text,
                        item.content_hash,
                        format_ts(&now),
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let id = conn.last_insert_rowid();
                Ok(item_by_id(conn, id)?)
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_source_item(&self, id: i64) -> Result<Option<SourceItem>> {
        let item = self.conn.call(move |conn| Ok(item_by_id(conn, id)?)).await?;
        Ok(item)
    }

    /// Unprocessed items of a project, newest first.
    pub async fn list_new_items(&self, project_id: i64, limit: usize) -> Result<Vec<SourceItem>> {
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT si.id, si.source_id, si.external_id, si.link, si.title, si.published_at,
                              si.raw_text, si.facts_cache, si.content_hash, si.status
                       FROM source_items si
                       JOIN sources s ON s.id = si.source_id
                       WHERE s.project_id = ?1 AND si.status = 'new'
                       ORDER BY si.published_at DESC NULLS LAST, si.id DESC
                       LIMIT ?2"#,
                )?;
                let items = stmt
                    .query_map(params![project_id, limit], item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    pub async fn save_facts_cache(&self, item_id: i64, facts: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE source_items SET facts_cache = ?1 WHERE id = ?2",
                    params![facts, item_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_item_processed(&self, item_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE source_items SET status = 'processed' WHERE id = ?1",
                    params![item_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Draft operations

    /// Insert a draft, or return the row that already holds its hash.
    pub async fn insert_draft(
        &self,
        draft: NewDraft,
        now: DateTime<Utc>,
    ) -> Result<Inserted<PostDraft>> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO post_drafts
                           (project_id, source_item_id, template_id, text, draft_hash, status, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(draft_hash) DO NOTHING"#,
                    params![
                        draft.project_id,
                        draft.source_item_id,
                        draft.template_id,
                        draft.text,
                        draft.draft_hash,
                        draft.status.as_str(),
                        format_ts(&now),
                    ],
                )?;
                let row = conn.query_row(
                    &format!("SELECT {DRAFT_COLUMNS} FROM post_drafts WHERE draft_hash = ?1"),
                    params![draft.draft_hash],
                    draft_from_row,
                )?;
                Ok(if changed > 0 {
                    Inserted::Created(row)
                } else {
                    Inserted::Existing(row)
                })
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_draft(&self, id: i64) -> Result<Option<PostDraft>> {
        let draft = self.conn.call(move |conn| Ok(draft_by_id(conn, id)?)).await?;
        Ok(draft)
    }

    pub async fn has_recent_draft_hash(&self, hash: &str, since: DateTime<Utc>) -> Result<bool> {
        let hash = hash.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM post_drafts WHERE draft_hash = ?1 AND created_at >= ?2 LIMIT 1",
                        params![hash, format_ts(&since)],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(found)
    }

    /// Id of another item in the project with the same content hash that already
    /// produced a draft since `since`.
    pub async fn find_recent_content_duplicate(
        &self,
        project_id: i64,
        content_hash: &str,
        exclude_item_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let content_hash = content_hash.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        r#"SELECT si.id FROM post_drafts d
                           JOIN source_items si ON si.id = d.source_item_id
                           WHERE d.project_id = ?1 AND si.content_hash = ?2
                             AND si.id != ?3 AND d.created_at >= ?4
                           ORDER BY d.created_at DESC
                           LIMIT 1"#,
                        params![project_id, content_hash, exclude_item_id, format_ts(&since)],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found)
            })
            .await?;
        Ok(found)
    }

    pub async fn update_draft_status(&self, id: i64, status: DraftStatus) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE post_drafts SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Move a `new`/`needs_approval` draft to `ready`, or stamp the approval on a
    /// draft that became `ready` without one. Returns false in any other state.
    pub async fn approve_draft(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE post_drafts SET status = 'ready', approved_at = ?1
                       WHERE id = ?2
                         AND (status IN ('new', 'needs_approval')
                              OR (status = 'ready' AND approved_at IS NULL))"#,
                    params![format_ts(&at), id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    /// Reject any draft that has not been published yet.
    pub async fn reject_draft(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE post_drafts SET status = 'rejected' WHERE id = ?1 AND status != 'published'",
                    params![id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    pub async fn list_drafts(
        &self,
        project_id: i64,
        status: Option<DraftStatus>,
        limit: usize,
    ) -> Result<Vec<PostDraft>> {
        let drafts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {DRAFT_COLUMNS} FROM post_drafts
                       WHERE project_id = ?1 AND (?2 IS NULL OR status = ?2)
                       ORDER BY created_at DESC, id DESC
                       LIMIT ?3"#
                ))?;
                let drafts = stmt
                    .query_map(
                        params![project_id, status.map(|s| s.as_str()), limit],
                        draft_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(drafts)
            })
            .await?;
        Ok(drafts)
    }

    /// Oldest `ready` draft of the project.
    pub async fn next_ready_draft(&self, project_id: i64) -> Result<Option<PostDraft>> {
        let draft = self
            .conn
            .call(move |conn| {
                let draft = conn
                    .query_row(
                        &format!(
                            r#"SELECT {DRAFT_COLUMNS} FROM post_drafts
                               WHERE project_id = ?1 AND status = 'ready'
                               ORDER BY created_at ASC, id ASC
                               LIMIT 1"#
                        ),
                        params![project_id],
                        draft_from_row,
                    )
                    .optional()?;
                Ok(draft)
            })
            .await?;
        Ok(draft)
    }

    /// Send `ready` drafts that no human approved back to `needs_approval`.
    pub async fn demote_unapproved_ready(&self, project_id: i64) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE post_drafts SET status = 'needs_approval'
                       WHERE project_id = ?1 AND status = 'ready' AND approved_at IS NULL"#,
                    params![project_id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    // Schedule operations

    pub async fn upsert_schedule(&self, schedule: &Schedule) -> Result<()> {
        let slots_json = serde_json::to_string(&schedule.slots)?;
        let schedule = schedule.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO schedules (project_id, tz, slots_json, per_day_limit, enabled)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(project_id) DO UPDATE SET
                           tz = excluded.tz,
                           slots_json = excluded.slots_json,
                           per_day_limit = excluded.per_day_limit,
                           enabled = excluded.enabled"#,
                    params![
                        schedule.project_id,
                        schedule.tz,
                        slots_json,
                        schedule.per_day_limit,
                        schedule.enabled,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_schedule(&self, project_id: i64) -> Result<Option<Schedule>> {
        let schedule = self
            .conn
            .call(move |conn| {
                let schedule = conn
                    .query_row(
                        &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE project_id = ?1"),
                        params![project_id],
                        schedule_from_row,
                    )
                    .optional()?;
                Ok(schedule)
            })
            .await?;
        Ok(schedule)
    }

    pub async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        let schedules = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE enabled = 1 ORDER BY project_id"
                ))?;
                let schedules = stmt
                    .query_map([], schedule_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(schedules)
            })
            .await?;
        Ok(schedules)
    }

    // Publication log operations

    /// Write the outcome of a publish attempt for (draft, slot).
    ///
    /// A row that is already `published` is never overwritten; it comes back as
    /// `Existing`. An earlier `failed` row for the same key is replaced so a later
    /// retry can record its own outcome.
    pub async fn record_publication(
        &self,
        log: NewPublicationLog,
        now: DateTime<Utc>,
    ) -> Result<Inserted<PublicationLog>> {
        let inserted = self
            .conn
            .call(move |conn| {
                let scheduled_at = log.scheduled_at.map(|dt| format_ts(&dt));
                let changed = conn.execute(
                    r#"INSERT INTO publication_logs
                           (draft_id, scheduled_at, published_at, external_message_id, status, error_code, error_text, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                       ON CONFLICT(draft_id, scheduled_at) DO UPDATE SET
                           published_at = excluded.published_at,
                           external_message_id = excluded.external_message_id,
                           status = excluded.status,
                           error_code = excluded.error_code,
                           error_text = excluded.error_text
                       WHERE publication_logs.status != 'published'
                       ON CONFLICT(draft_id) WHERE scheduled_at IS NULL DO UPDATE SET
                           published_at = excluded.published_at,
                           external_message_id = excluded.external_message_id,
                           status = excluded.status,
                           error_code = excluded.error_code,
                           error_text = excluded.error_text
                       WHERE publication_logs.status != 'published'"#,
                    params![
                        log.draft_id,
                        scheduled_at,
                        log.published_at.map(|dt| format_ts(&dt)),
                        log.external_message_id,
                        log.status.as_str(),
                        log.error_code,
                        log.error_text,
                        format_ts(&now),
                    ],
                )?;
                let row = log_for_slot(conn, log.draft_id, scheduled_at.as_deref())?.ok_or(
                    rusqlite::Error::QueryReturnedNoRows,
                )?;
                Ok(if changed > 0 {
                    Inserted::Created(row)
                } else {
                    Inserted::Existing(row)
                })
            })
            .await?;
        Ok(inserted)
    }

    /// Log for the exact (draft, slot) key; `None` slot means the manual publish.
    pub async fn get_publication_log(
        &self,
        draft_id: i64,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PublicationLog>> {
        let log = self
            .conn
            .call(move |conn| {
                let scheduled_at = scheduled_at.map(|dt| format_ts(&dt));
                Ok(log_for_slot(conn, draft_id, scheduled_at.as_deref())?)
            })
            .await?;
        Ok(log)
    }

    pub async fn latest_publication_log(&self, draft_id: i64) -> Result<Option<PublicationLog>> {
        let log = self
            .conn
            .call(move |conn| {
                let log = conn
                    .query_row(
                        &format!(
                            "SELECT {LOG_COLUMNS} FROM publication_logs WHERE draft_id = ?1 ORDER BY id DESC LIMIT 1"
                        ),
                        params![draft_id],
                        log_from_row,
                    )
                    .optional()?;
                Ok(log)
            })
            .await?;
        Ok(log)
    }

    /// A `published` log of any draft of the project for the given slot.
    pub async fn find_published_for_slot(
        &self,
        project_id: i64,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<PublicationLog>> {
        let log = self
            .conn
            .call(move |conn| {
                let log = conn
                    .query_row(
                        r#"SELECT l.id, l.draft_id, l.scheduled_at, l.published_at, l.external_message_id,
                                  l.status, l.error_code, l.error_text, l.created_at
                           FROM publication_logs l
                           JOIN post_drafts d ON d.id = l.draft_id
                           WHERE d.project_id = ?1 AND l.scheduled_at = ?2 AND l.status = 'published'
                           ORDER BY l.id
                           LIMIT 1"#,
                        params![project_id, format_ts(&scheduled_at)],
                        log_from_row,
                    )
                    .optional()?;
                Ok(log)
            })
            .await?;
        Ok(log)
    }

    /// Count `published` scheduled logs of the project with `start <= scheduled_at < end`.
    pub async fn count_published_between(
        &self,
        project_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32> {
        let count = self
            .conn
            .call(move |conn| {
                let count: u32 = conn.query_row(
                    r#"SELECT COUNT(*) FROM publication_logs l
                       JOIN post_drafts d ON d.id = l.draft_id
                       WHERE d.project_id = ?1 AND l.status = 'published'
                         AND l.scheduled_at >= ?2 AND l.scheduled_at < ?3"#,
                    params![project_id, format_ts(&start), format_ts(&end)],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    // Usage operations

    pub async fn add_usage(
        &self,
        project_id: i64,
        day: NaiveDate,
        delta: UsageDelta,
    ) -> Result<UsageCounter> {
        let counter = self
            .conn
            .call(move |conn| {
                let day = format_day(day);
                conn.execute(
                    r#"INSERT INTO usage_counters
                           (project_id, day, drafts_generated, posts_published, llm_calls, tokens_est)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(project_id, day) DO UPDATE SET
                           drafts_generated = drafts_generated + excluded.drafts_generated,
                           posts_published = posts_published + excluded.posts_published,
                           llm_calls = llm_calls + excluded.llm_calls,
                           tokens_est = tokens_est + excluded.tokens_est"#,
                    params![
                        project_id,
                        day,
                        delta.drafts_generated,
                        delta.posts_published,
                        delta.llm_calls,
                        delta.tokens_est,
                    ],
                )?;
                let counter = conn.query_row(
                    &format!("SELECT {USAGE_COLUMNS} FROM usage_counters WHERE project_id = ?1 AND day = ?2"),
                    params![project_id, day],
                    usage_from_row,
                )?;
                Ok(counter)
            })
            .await?;
        Ok(counter)
    }

    pub async fn get_usage(&self, project_id: i64, day: NaiveDate) -> Result<Option<UsageCounter>> {
        let counter = self
            .conn
            .call(move |conn| {
                let counter = conn
                    .query_row(
                        &format!("SELECT {USAGE_COLUMNS} FROM usage_counters WHERE project_id = ?1 AND day = ?2"),
                        params![project_id, format_day(day)],
                        usage_from_row,
                    )
                    .optional()?;
                Ok(counter)
            })
            .await?;
        Ok(counter)
    }
}

fn write_settings(conn: &SqliteConnection, settings: &ProjectSettings) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO project_settings
               (project_id, language, niche, tone, template_id, max_post_len, safe_mode, autopost_enabled)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(project_id) DO UPDATE SET
               language = excluded.language,
               niche = excluded.niche,
               tone = excluded.tone,
               template_id = excluded.template_id,
               max_post_len = excluded.max_post_len,
               safe_mode = excluded.safe_mode,
               autopost_enabled = excluded.autopost_enabled"#,
        params![
            settings.project_id,
            settings.language,
            settings.niche,
            settings.tone,
            settings.template_id,
            settings.max_post_len,
            settings.safe_mode,
            settings.autopost_enabled,
        ],
    )?;
    Ok(())
}

fn source_by_id(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<Source>> {
    conn.query_row(
        &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1"),
        params![id],
        source_from_row,
    )
    .optional()
}

fn item_by_id(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<SourceItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM source_items WHERE id = ?1"),
        params![id],
        item_from_row,
    )
    .optional()
}

fn draft_by_id(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<PostDraft>> {
    conn.query_row(
        &format!("SELECT {DRAFT_COLUMNS} FROM post_drafts WHERE id = ?1"),
        params![id],
        draft_from_row,
    )
    .optional()
}

fn log_for_slot(
    conn: &SqliteConnection,
    draft_id: i64,
    scheduled_at: Option<&str>,
) -> rusqlite::Result<Option<PublicationLog>> {
    conn.query_row(
        &format!(
            "SELECT {LOG_COLUMNS} FROM publication_logs WHERE draft_id = ?1 AND scheduled_at IS ?2"
        ),
        params![draft_id, scheduled_at],
        log_from_row,
    )
    .optional()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn text_enum<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| conversion_error(idx, format!("invalid timestamp '{raw}'")))
}

fn opt_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("invalid timestamp '{raw}'"))),
        None => Ok(None),
    }
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        tz: row.get(3)?,
        status: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

fn settings_from_row(row: &Row) -> rusqlite::Result<ProjectSettings> {
    Ok(ProjectSettings {
        project_id: row.get(0)?,
        language: row.get(1)?,
        niche: row.get(2)?,
        tone: row.get(3)?,
        template_id: row.get(4)?,
        max_post_len: row.get(5)?,
        safe_mode: row.get(6)?,
        autopost_enabled: row.get(7)?,
    })
}

fn binding_from_row(row: &Row) -> rusqlite::Result<ChannelBinding> {
    Ok(ChannelBinding {
        project_id: row.get(0)?,
        channel_id: row.get(1)?,
        channel_name: row.get(2)?,
        status: text_enum(row, 3)?,
        last_check_at: opt_timestamp(row, 4)?,
        last_error: row.get(5)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        project_id: row.get(1)?,
        source_type: text_enum(row, 2)?,
        url: row.get(3)?,
        status: text_enum(row, 4)?,
        fetch_interval_min: row.get(5)?,
        last_fetch_at: opt_timestamp(row, 6)?,
        last_error: row.get(7)?,
        consecutive_failures: row.get(8)?,
    })
}

fn item_from_row(row: &Row) -> rusqlite::Result<SourceItem> {
    Ok(SourceItem {
        id: row.get(0)?,
        source_id: row.get(1)?,
        external_id: row.get(2)?,
        link: row.get(3)?,
        title: row.get(4)?,
        published_at: opt_timestamp(row, 5)?,
        raw_text: row.get(6)?,
        facts_cache: row.get(7)?,
        content_hash: row.get(8)?,
        status: text_enum(row, 9)?,
    })
}

fn draft_from_row(row: &Row) -> rusqlite::Result<PostDraft> {
    Ok(PostDraft {
        id: row.get(0)?,
        project_id: row.get(1)?,
        source_item_id: row.get(2)?,
        template_id: row.get(3)?,
        text: row.get(4)?,
        draft_hash: row.get(5)?,
        status: text_enum(row, 6)?,
        approved_at: opt_timestamp(row, 7)?,
        created_at: timestamp(row, 8)?,
    })
}

fn schedule_from_row(row: &Row) -> rusqlite::Result<Schedule> {
    let slots_json: String = row.get(2)?;
    let slots: Vec<String> = serde_json::from_str(&slots_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Schedule {
        project_id: row.get(0)?,
        tz: row.get(1)?,
        slots,
        per_day_limit: row.get(3)?,
        enabled: row.get(4)?,
    })
}

fn log_from_row(row: &Row) -> rusqlite::Result<PublicationLog> {
    Ok(PublicationLog {
        id: row.get(0)?,
        draft_id: row.get(1)?,
        scheduled_at: opt_timestamp(row, 2)?,
        published_at: opt_timestamp(row, 3)?,
        external_message_id: row.get(4)?,
        status: text_enum(row, 5)?,
        error_code: row.get(6)?,
        error_text: row.get(7)?,
        created_at: timestamp(row, 8)?,
    })
}

fn usage_from_row(row: &Row) -> rusqlite::Result<UsageCounter> {
    let day: String = row.get(1)?;
    let day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(UsageCounter {
        project_id: row.get(0)?,
        day,
        drafts_generated: row.get(2)?,
        posts_published: row.get(3)?,
        llm_calls: row.get(4)?,
        tokens_est: row.get(5)?,
    })
}
