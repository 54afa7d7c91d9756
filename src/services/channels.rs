use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::channel::ChannelClient;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{BindingStatus, ChannelBinding};

const TEST_MESSAGE: &str = "Connection check from autoposter.";

#[derive(Clone)]
pub struct ChannelService {
    repo: Repository,
    client: Arc<dyn ChannelClient>,
}

impl ChannelService {
    pub fn new(repo: Repository, client: Arc<dyn ChannelClient>) -> Self {
        Self { repo, client }
    }

    /// Attach a channel to the project. It stays `pending` until checked.
    pub async fn bind_channel(
        &self,
        project_id: i64,
        channel_id: &str,
        channel_name: Option<String>,
    ) -> Result<ChannelBinding> {
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            return Err(AppError::Validation("channel id must not be empty".to_string()));
        }
        if self.repo.get_project(project_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Project {project_id}")));
        }
        let binding = self
            .repo
            .upsert_channel_binding(project_id, channel_id, channel_name)
            .await?;
        tracing::info!(project_id, channel_id, "Channel bound");
        Ok(binding)
    }

    pub async fn get_binding(&self, project_id: i64) -> Result<Option<ChannelBinding>> {
        self.repo.get_channel_binding(project_id).await
    }

    /// Send a test message and record whether the channel accepts posts.
    pub async fn check_binding(
        &self,
        project_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ChannelBinding> {
        let binding = self
            .repo
            .get_channel_binding(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Channel binding for project {project_id}")))?;

        match self
            .client
            .send_test_message(&binding.channel_id, TEST_MESSAGE)
            .await
        {
            Ok(()) => {
                self.repo
                    .update_channel_status(project_id, BindingStatus::Connected, None, now)
                    .await?;
                tracing::info!(project_id, channel_id = %binding.channel_id, "Channel connected");
                Ok(ChannelBinding {
                    status: BindingStatus::Connected,
                    last_error: None,
                    last_check_at: Some(now),
                    ..binding
                })
            }
            Err(e) => {
                tracing::warn!(project_id, channel_id = %binding.channel_id, error = %e, "Channel check failed");
                self.repo
                    .update_channel_status(project_id, BindingStatus::Error, Some(e.to_string()), now)
                    .await?;
                Err(e.into())
            }
        }
    }
}
