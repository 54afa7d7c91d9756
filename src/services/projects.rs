use chrono::{DateTime, Utc};

use crate::ai::templates::is_known_template;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{
    normalize_slots, validate_timezone, Project, ProjectSettings, Schedule, SettingsUpdate,
};

#[derive(Clone)]
pub struct ProjectService {
    repo: Repository,
}

impl ProjectService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn create_project(
        &self,
        owner: &str,
        title: &str,
        tz: &str,
        now: DateTime<Utc>,
    ) -> Result<Project> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("project title must not be empty".to_string()));
        }
        validate_timezone(tz)?;
        let project = self.repo.create_project(owner, title, tz, now).await?;
        tracing::info!(project_id = project.id, owner, "Project created");
        Ok(project)
    }

    pub async fn get_project(&self, project_id: i64) -> Result<Project> {
        self.repo
            .get_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {project_id}")))
    }

    pub async fn get_settings(&self, project_id: i64) -> Result<ProjectSettings> {
        self.get_project(project_id).await?;
        Ok(self
            .repo
            .get_settings(project_id)
            .await?
            .unwrap_or_else(|| ProjectSettings::defaults(project_id)))
    }

    pub async fn update_settings(
        &self,
        project_id: i64,
        update: SettingsUpdate,
    ) -> Result<ProjectSettings> {
        if let Some(Some(template_id)) = &update.template_id {
            if !is_known_template(template_id) {
                return Err(AppError::Validation(format!("unknown template '{template_id}'")));
            }
        }
        if update.max_post_len == Some(0) {
            return Err(AppError::Validation("max post length must be positive".to_string()));
        }
        if let Some(language) = &update.language {
            if language.trim().is_empty() {
                return Err(AppError::Validation("language must not be empty".to_string()));
            }
        }

        let settings = self.get_settings(project_id).await?.apply(update);
        self.repo.upsert_settings(settings).await
    }

    /// Store the project's posting schedule. The `enabled` flag is mirrored into
    /// the project's `autopost_enabled` setting.
    pub async fn configure_schedule<S: AsRef<str>>(
        &self,
        project_id: i64,
        tz: &str,
        slots: &[S],
        per_day_limit: u32,
        enabled: bool,
    ) -> Result<Schedule> {
        validate_timezone(tz)?;
        let slots = normalize_slots(slots)?;
        if enabled && slots.is_empty() {
            return Err(AppError::Validation(
                "an enabled schedule needs at least one slot".to_string(),
            ));
        }
        if per_day_limit == 0 {
            return Err(AppError::Validation("per-day limit must be positive".to_string()));
        }

        self.get_project(project_id).await?;
        let schedule = Schedule {
            project_id,
            tz: tz.to_string(),
            slots,
            per_day_limit,
            enabled,
        };
        self.repo.upsert_schedule(&schedule).await?;
        self.update_settings(
            project_id,
            SettingsUpdate {
                autopost_enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await?;

        tracing::info!(project_id, slots = ?schedule.slots, enabled, "Schedule configured");
        Ok(schedule)
    }

    pub async fn get_schedule(&self, project_id: i64) -> Result<Option<Schedule>> {
        self.repo.get_schedule(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> ProjectService {
        ProjectService::new(Repository::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn rejects_unknown_zone() {
        let projects = service().await;
        let err = projects
            .create_project("o", "Title", "Nowhere/Land", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn settings_validate_template() {
        let projects = service().await;
        let project = projects
            .create_project("o", "Title", "Europe/Berlin", Utc::now())
            .await
            .unwrap();
        let err = projects
            .update_settings(
                project.id,
                SettingsUpdate {
                    template_id: Some(Some("poem".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let settings = projects
            .update_settings(
                project.id,
                SettingsUpdate {
                    template_id: Some(Some("digest".to_string())),
                    safe_mode: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(settings.template_id.as_deref(), Some("digest"));
        assert!(!settings.safe_mode);
        assert_eq!(settings.language, "en");
    }

    #[tokio::test]
    async fn schedule_mirrors_autopost_flag() {
        let projects = service().await;
        let project = projects
            .create_project("o", "Title", "UTC", Utc::now())
            .await
            .unwrap();
        let schedule = projects
            .configure_schedule(project.id, "Europe/Berlin", &["14:00", "10:00"], 2, true)
            .await
            .unwrap();
        assert_eq!(schedule.slots, vec!["10:00", "14:00"]);
        assert!(projects.get_settings(project.id).await.unwrap().autopost_enabled);

        let stored = projects.get_schedule(project.id).await.unwrap().unwrap();
        assert_eq!(stored.tz, "Europe/Berlin");
        assert_eq!(stored.per_day_limit, 2);

        assert!(projects
            .configure_schedule(project.id, "UTC", &["10:00"], 0, true)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let projects = service().await;
        assert!(matches!(
            projects.get_settings(42).await,
            Err(AppError::NotFound(_))
        ));
    }
}
