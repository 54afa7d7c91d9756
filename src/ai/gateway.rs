use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::client::{GenerationRequest, GenerationResponse, TextGenerator};
use crate::error::{AppError, DraftGenerationError, Result};
use crate::limits::{QuotaKind, QuotaService};
use crate::models::UsageDelta;
use crate::services::UsageService;
use crate::text::truncate_chars;

/// Quota-gated front door to the generation backend. Every call consumes one
/// `llm_calls` unit and is recorded in the usage ledger.
#[derive(Clone)]
pub struct LlmGateway {
    backend: Arc<dyn TextGenerator>,
    quota: QuotaService,
    usage: UsageService,
    max_tokens: u32,
}

impl LlmGateway {
    pub fn new(
        backend: Arc<dyn TextGenerator>,
        quota: QuotaService,
        usage: UsageService,
        max_tokens: u32,
    ) -> Self {
        Self {
            backend,
            quota,
            usage,
            max_tokens,
        }
    }

    pub async fn generate(
        &self,
        project_id: i64,
        prompt: String,
        max_output_chars: Option<usize>,
        seed: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<GenerationResponse> {
        self.quota
            .ensure_at(project_id, QuotaKind::LlmCalls, now)
            .await?;

        let mut max_tokens = self.max_tokens;
        if let Some(chars) = max_output_chars {
            max_tokens = max_tokens.min(u32::try_from(chars).unwrap_or(u32::MAX));
        }
        let request = GenerationRequest {
            prompt,
            max_tokens: max_tokens.max(1),
            max_output_chars,
            seed,
        };

        let started = Instant::now();
        let mut response = self.backend.generate(&request).await.map_err(|e| match e {
            AppError::Generation(msg) => DraftGenerationError::BackendUnavailable(msg).into(),
            AppError::Http(e) => DraftGenerationError::BackendUnavailable(e.to_string()).into(),
            other => other,
        })?;

        if let Some(chars) = max_output_chars {
            response.text = truncate_chars(&response.text, chars).to_string();
            let cap = u32::try_from(chars).unwrap_or(u32::MAX);
            response.tokens_estimated = response.tokens_estimated.min(cap);
        }

        tracing::info!(
            project_id,
            duration_ms = started.elapsed().as_millis() as u64,
            tokens_estimated = response.tokens_estimated,
            "LLM call"
        );

        self.usage
            .record(
                project_id,
                now,
                UsageDelta::llm_call(i64::from(response.tokens_estimated)),
            )
            .await?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockGenerator;
    use crate::config::LimitsConfig;
    use crate::db::Repository;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn quota_and_usage_are_applied() {
        let repo = Repository::open_in_memory().await.unwrap();
        let now = Utc::now();
        let project = repo.create_project("o", "p", "UTC", now).await.unwrap();
        let limits = LimitsConfig {
            llm_calls_per_day: 1,
            ..LimitsConfig::default()
        };
        let gateway = LlmGateway::new(
            Arc::new(MockGenerator),
            QuotaService::new(Arc::new(MemoryStore::new()), limits),
            UsageService::new(repo.clone()),
            128,
        );

        let response = gateway
            .generate(project.id, "abcdefghij".to_string(), Some(5), Some(7), now)
            .await
            .unwrap();
        assert_eq!(response.text, "7-abc");

        let err = gateway
            .generate(project.id, "again".to_string(), None, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { kind: "llm_calls", .. }));

        let usage = repo.get_usage(project.id, now.date_naive()).await.unwrap().unwrap();
        assert_eq!(usage.llm_calls, 1);
        assert_eq!(usage.tokens_est, 1);
    }
}
