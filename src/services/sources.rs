use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use url::Url;

use crate::config::FetchConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{extract_page, page_item, parse_feed, FeedRetriever};
use crate::limits::{CooldownStore, LockStore, QuotaService};
use crate::models::{Inserted, NewSourceItem, Source, SourceItem, SourceStatus, SourceType};
use crate::queue::WorkQueue;

/// Result of one fetch run. Failures are recorded on `source` and show up as `saved == 0`.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source: Source,
    pub saved: usize,
}

#[derive(Clone)]
pub struct SourceService {
    repo: Repository,
    retriever: Arc<dyn FeedRetriever>,
    quota: QuotaService,
    locks: LockStore,
    cooldowns: CooldownStore,
    queue: Option<Arc<dyn WorkQueue>>,
    config: FetchConfig,
}

impl SourceService {
    pub fn new(
        repo: Repository,
        retriever: Arc<dyn FeedRetriever>,
        quota: QuotaService,
        locks: LockStore,
        cooldowns: CooldownStore,
        config: FetchConfig,
    ) -> Self {
        Self {
            repo,
            retriever,
            quota,
            locks,
            cooldowns,
            queue: None,
            config,
        }
    }

    /// Hand new items to the draft generator through `queue` after each fetch.
    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub async fn add_source(
        &self,
        project_id: i64,
        source_type: SourceType,
        url: &str,
    ) -> Result<Source> {
        let url = url.trim();
        let parsed =
            Url::parse(url).map_err(|e| AppError::Validation(format!("invalid url '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }
        if self.repo.get_project(project_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Project {project_id}")));
        }

        let current = self.repo.count_sources(project_id).await?;
        self.quota.ensure_source_capacity(current)?;

        match self
            .repo
            .insert_source(project_id, source_type, url, self.config.fetch_interval_min)
            .await?
        {
            Inserted::Created(source) => {
                tracing::info!(project_id, source_id = source.id, url, "Source added");
                Ok(source)
            }
            Inserted::Existing(_) => Err(AppError::DuplicateSource(url.to_string())),
        }
    }

    pub async fn list_sources(&self, project_id: i64) -> Result<Vec<Source>> {
        self.repo.list_sources(Some(project_id)).await
    }

    pub async fn fetch_source(&self, source_id: i64) -> Result<FetchOutcome> {
        self.fetch_source_at(source_id, Utc::now()).await
    }

    /// Fetch one source and store its new items. Retrieval and parse errors are
    /// recorded on the source rather than returned; only a missing source or a
    /// storage failure comes back as `Err`.
    pub async fn fetch_source_at(&self, source_id: i64, now: DateTime<Utc>) -> Result<FetchOutcome> {
        let source = self
            .repo
            .get_source(source_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Source {source_id}")))?;

        let candidates = match self.retrieve(&source).await {
            Ok(items) => items,
            Err(e) => {
                let source = self
                    .repo
                    .record_fetch_failure(
                        source.id,
                        &e.to_string(),
                        self.config.source_fail_threshold,
                        now,
                    )
                    .await?;
                tracing::warn!(
                    source_id = source.id,
                    failures = source.consecutive_failures,
                    status = %source.status,
                    error = %e,
                    "Source fetch failed"
                );
                return Ok(FetchOutcome { source, saved: 0 });
            }
        };

        let mut saved = Vec::new();
        for candidate in candidates {
            let link = candidate.link.clone();
            match self.repo.insert_source_item(candidate, now).await {
                Ok(Some(item)) => saved.push(item),
                Ok(None) => {}
                Err(e) => tracing::warn!(source_id, link, error = %e, "Failed to store item"),
            }
        }

        let source = self.repo.record_fetch_success(source.id, now).await?;
        tracing::info!(source_id, saved = saved.len(), "Source fetched");

        let count = saved.len();
        if !saved.is_empty() {
            self.enqueue_generation(source.project_id, saved).await;
        }

        Ok(FetchOutcome {
            source,
            saved: count,
        })
    }

    async fn retrieve(&self, source: &Source) -> Result<Vec<NewSourceItem>> {
        match source.source_type {
            SourceType::Rss => {
                let bytes = self.retriever.fetch_rss(&source.url).await?;
                parse_feed(source.id, &bytes)
            }
            SourceType::Url => {
                let html = self.retriever.fetch_page(&source.url).await?;
                let page = extract_page(&html, self.config.page_max_chars);
                Ok(vec![page_item(source.id, &source.url, page)])
            }
        }
    }

    /// Queue generation for the newest items of this run. A concurrent fetch of
    /// the same project that already holds the lock does the queuing instead.
    async fn enqueue_generation(&self, project_id: i64, mut items: Vec<SourceItem>) {
        let Some(queue) = &self.queue else {
            return;
        };

        let lock_key = format!("generate:{project_id}");
        let ttl = Duration::from_secs(self.config.generate_lock_ttl_secs);
        match self.locks.acquire(&lock_key, ttl).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(project_id, "Generation already triggered");
                return;
            }
            Err(e) => {
                tracing::warn!(project_id, error = %e, "Generation lock unavailable");
                return;
            }
        }

        items.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        for item in items.into_iter().take(self.config.max_generate_per_fetch) {
            if let Err(e) = queue.enqueue_generate_draft(item.id).await {
                tracing::warn!(project_id, source_item_id = item.id, error = %e, "Failed to queue generation");
            }
        }
    }

    /// Whether `source` should be polled at `now`. Broken sources wait an
    /// exponentially growing multiple of their interval.
    pub fn is_due(&self, source: &Source, now: DateTime<Utc>) -> bool {
        let Some(last) = source.last_fetch_at else {
            return true;
        };
        let interval_min = i64::from(source.fetch_interval_min.max(1));
        let wait_min = if source.status == SourceStatus::Broken {
            let over = source
                .consecutive_failures
                .saturating_sub(self.config.source_fail_threshold)
                .saturating_add(1)
                .min(16);
            let cap_min = i64::from(self.config.max_backoff_hours) * 60;
            (interval_min * (1_i64 << over)).min(cap_min.max(interval_min))
        } else {
            interval_min
        };
        now - last >= chrono::Duration::minutes(wait_min)
    }

    /// Poll every source whose interval has elapsed, a few at a time.
    pub async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<FetchOutcome>> {
        let due: Vec<Source> = self
            .repo
            .list_sources(None)
            .await?
            .into_iter()
            .filter(|s| {
                let due = self.is_due(s, now);
                if !due && s.status == SourceStatus::Broken {
                    tracing::debug!(source_id = s.id, "Broken source still in backoff");
                }
                due
            })
            .collect();

        Ok(self.fetch_many(due, now).await)
    }

    /// Manual "fetch now" for a project, refused while the cooldown runs.
    pub async fn trigger_fetch(&self, project_id: i64, now: DateTime<Utc>) -> Result<Vec<FetchOutcome>> {
        self.cooldowns
            .ensure(
                &format!("fetch:{project_id}"),
                Duration::from_secs(self.config.manual_fetch_cooldown_secs),
            )
            .await?;
        let sources = self.repo.list_sources(Some(project_id)).await?;
        Ok(self.fetch_many(sources, now).await)
    }

    async fn fetch_many(&self, sources: Vec<Source>, now: DateTime<Utc>) -> Vec<FetchOutcome> {
        stream::iter(sources)
            .map(|source| async move {
                match self.fetch_source_at(source.id, now).await {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        tracing::warn!(source_id = source.id, error = %e, "Fetch run failed");
                        None
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .filter_map(|r| async { r })
            .collect()
            .await
    }
}
