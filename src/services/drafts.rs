use chrono::{DateTime, Utc};

use crate::ai::templates::{facts_prompt, get_template, render_prompt, PromptInput};
use crate::ai::LlmGateway;
use crate::config::GenerationConfig;
use crate::db::Repository;
use crate::error::{AppError, DraftGenerationError, Result};
use crate::limits::{QuotaKind, QuotaService};
use crate::models::{
    DraftStatus, Inserted, NewDraft, PostDraft, ResolvedSettings, SourceItem, UsageDelta,
};
use crate::services::UsageService;
use crate::text::{
    char_len, compute_draft_hash, normalize_text, sanitize_raw_text, truncate_chars,
};

/// Output bound for the fact-extraction call.
const FACTS_MAX_CHARS: usize = 512;
const RENDER_SEED: u64 = 1;

#[derive(Clone)]
pub struct DraftService {
    repo: Repository,
    gateway: LlmGateway,
    quota: QuotaService,
    usage: UsageService,
    config: GenerationConfig,
}

impl DraftService {
    pub fn new(
        repo: Repository,
        gateway: LlmGateway,
        quota: QuotaService,
        usage: UsageService,
        config: GenerationConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            quota,
            usage,
            config,
        }
    }

    pub async fn generate(
        &self,
        source_item_id: i64,
        template_id: Option<&str>,
    ) -> Result<Inserted<PostDraft>> {
        self.generate_at(source_item_id, template_id, Utc::now()).await
    }

    /// Turn a source item into a post draft.
    ///
    /// Duplicates are rejected before any quota is consumed. Two concurrent calls
    /// for the same content converge on one row; the later one gets `Existing`.
    pub async fn generate_at(
        &self,
        source_item_id: i64,
        template_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Inserted<PostDraft>> {
        let item = self
            .repo
            .get_source_item(source_item_id)
            .await?
            .ok_or(DraftGenerationError::ItemNotFound(source_item_id))?;
        let source = self
            .repo
            .get_source(item.source_id)
            .await?
            .ok_or(DraftGenerationError::SourceNotFound(item.source_id))?;
        let project_id = source.project_id;

        let stored = self.repo.get_settings(project_id).await?;
        let settings = ResolvedSettings::resolve(stored.as_ref(), &self.config);
        let template = get_template(Some(template_id.unwrap_or(settings.template_id.as_str())));

        let raw_text = item.raw_text.clone().unwrap_or_default();
        let draft_hash = compute_draft_hash(project_id, item.id, Some(template.id), &raw_text);

        let window_days = self.config.duplicate_window_days;
        let since = now - chrono::Duration::days(window_days);
        if self.repo.has_recent_draft_hash(&draft_hash, since).await? {
            tracing::info!(project_id, source_item_id, "Duplicate draft rejected");
            return Err(DraftGenerationError::DuplicateDraft { window_days }.into());
        }
        if let Some(other) = self
            .repo
            .find_recent_content_duplicate(project_id, &item.content_hash, item.id, since)
            .await?
        {
            tracing::info!(project_id, source_item_id, duplicate_of = other, "Duplicate content rejected");
            return Err(DraftGenerationError::DuplicateContent {
                item_id: other,
                window_days,
            }
            .into());
        }

        self.quota
            .ensure_at(project_id, QuotaKind::Drafts, now)
            .await?;

        tracing::info!(project_id, source_item_id, template = template.id, "Generating draft");
        let facts = self.facts_for(project_id, &item, now).await?;

        let prompt = render_prompt(&PromptInput {
            template_id: template.id,
            facts: &facts,
            link: &item.link,
            language: &settings.language,
            tone: &settings.tone,
            niche: &settings.niche,
            max_post_len: settings.max_post_len,
        });
        let response = self
            .gateway
            .generate(
                project_id,
                prompt,
                Some(settings.max_post_len),
                Some(RENDER_SEED),
                now,
            )
            .await?;
        let text = finalize_post(&response.text, &item.link, settings.max_post_len);

        let status = if settings.safe_mode {
            DraftStatus::NeedsApproval
        } else {
            DraftStatus::Ready
        };
        let inserted = self
            .repo
            .insert_draft(
                NewDraft {
                    project_id,
                    source_item_id: item.id,
                    template_id: Some(template.id.to_string()),
                    text,
                    draft_hash,
                    status,
                },
                now,
            )
            .await?;

        match &inserted {
            Inserted::Created(draft) => {
                self.usage.record(project_id, now, UsageDelta::draft()).await?;
                self.repo.mark_item_processed(item.id).await?;
                tracing::info!(project_id, draft_id = draft.id, status = %draft.status, "Draft created");
            }
            Inserted::Existing(draft) => {
                tracing::info!(project_id, draft_id = draft.id, "Draft already existed");
            }
        }
        Ok(inserted)
    }

    async fn facts_for(
        &self,
        project_id: i64,
        item: &SourceItem,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if let Some(facts) = item.facts_cache.as_ref().filter(|f| !f.is_empty()) {
            return Ok(facts.clone());
        }
        let raw = sanitize_raw_text(
            item.raw_text.as_deref().unwrap_or_default(),
            self.config.facts_budget_chars,
        );
        let response = self
            .gateway
            .generate(project_id, facts_prompt(&raw), Some(FACTS_MAX_CHARS), None, now)
            .await?;
        let facts = normalize_text(&response.text);
        self.repo.save_facts_cache(item.id, facts.clone()).await?;
        Ok(facts)
    }

    pub async fn get_draft(&self, draft_id: i64) -> Result<PostDraft> {
        self.repo
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Draft {draft_id}")))
    }

    pub async fn list_drafts(
        &self,
        project_id: i64,
        status: Option<DraftStatus>,
        limit: usize,
    ) -> Result<Vec<PostDraft>> {
        self.repo.list_drafts(project_id, status, limit).await
    }

    /// Human approval: the draft becomes eligible for publishing.
    pub async fn approve(&self, draft_id: i64, now: DateTime<Utc>) -> Result<PostDraft> {
        if !self.repo.approve_draft(draft_id, now).await? {
            let draft = self.get_draft(draft_id).await?;
            if draft.status == DraftStatus::Ready && draft.approved_at.is_some() {
                return Ok(draft);
            }
            return Err(AppError::Validation(format!(
                "draft {draft_id} is {} and cannot be approved",
                draft.status
            )));
        }
        tracing::info!(draft_id, "Draft approved");
        self.get_draft(draft_id).await
    }

    pub async fn reject(&self, draft_id: i64) -> Result<PostDraft> {
        if !self.repo.reject_draft(draft_id).await? {
            let draft = self.get_draft(draft_id).await?;
            return Err(AppError::Validation(format!(
                "draft {draft_id} is {} and cannot be rejected",
                draft.status
            )));
        }
        tracing::info!(draft_id, "Draft rejected");
        self.get_draft(draft_id).await
    }

    /// While safe mode is on, only human-approved drafts may stay `ready`.
    /// Returns how many drafts were sent back for approval.
    pub async fn enforce_safe_mode(&self, project_id: i64) -> Result<usize> {
        let demoted = self.repo.demote_unapproved_ready(project_id).await?;
        if demoted > 0 {
            tracing::info!(project_id, demoted, "Unapproved drafts sent back for approval");
        }
        Ok(demoted)
    }
}

/// Collapse whitespace and make sure the post carries `link`, trimming the body
/// so the result never exceeds `max_len` characters.
pub fn finalize_post(text: &str, link: &str, max_len: usize) -> String {
    let body = normalize_text(text);
    if link.is_empty() || body.contains(link) {
        return truncate_chars(&body, max_len).to_string();
    }

    let link_len = char_len(link);
    if link_len + 1 >= max_len {
        return truncate_chars(link, max_len).to_string();
    }
    let room = max_len - link_len - 1;
    let trimmed = truncate_chars(&body, room).trim_end();
    if trimmed.is_empty() {
        link.to_string()
    } else {
        format!("{trimmed} {link}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_appended_within_bound() {
        let link = "https://example.com/a";
        let out = finalize_post(&"word ".repeat(50), link, 60);
        assert!(out.ends_with(link));
        assert!(char_len(&out) <= 60);
    }

    #[test]
    fn existing_link_is_kept() {
        let out = finalize_post("Read  more at https://x.io/1 now", "https://x.io/1", 100);
        assert_eq!(out, "Read more at https://x.io/1 now");
    }

    #[test]
    fn tiny_bound_keeps_what_fits() {
        let out = finalize_post("body", "https://example.com/long", 10);
        assert_eq!(char_len(&out), 10);
    }
}
