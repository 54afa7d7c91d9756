use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::templates::DEFAULT_TEMPLATE_ID;
use crate::config::GenerationConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub owner: String,
    pub title: String,
    pub tz: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub project_id: i64,
    pub language: String,
    pub niche: String,
    pub tone: String,
    pub template_id: Option<String>,
    pub max_post_len: usize,
    pub safe_mode: bool,
    pub autopost_enabled: bool,
}

/// Partial update applied on top of the stored (or default) settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub language: Option<String>,
    pub niche: Option<String>,
    pub tone: Option<String>,
    pub template_id: Option<Option<String>>,
    pub max_post_len: Option<usize>,
    pub safe_mode: Option<bool>,
    pub autopost_enabled: Option<bool>,
}

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_TONE: &str = "friendly";
pub const DEFAULT_NICHE: &str = "general";
pub const DEFAULT_MAX_POST_LEN: usize = 1000;

impl ProjectSettings {
    pub fn defaults(project_id: i64) -> Self {
        Self {
            project_id,
            language: DEFAULT_LANGUAGE.to_string(),
            niche: DEFAULT_NICHE.to_string(),
            tone: DEFAULT_TONE.to_string(),
            template_id: None,
            max_post_len: DEFAULT_MAX_POST_LEN,
            safe_mode: true,
            autopost_enabled: false,
        }
    }

    pub fn apply(mut self, update: SettingsUpdate) -> Self {
        if let Some(language) = update.language {
            self.language = language;
        }
        if let Some(niche) = update.niche {
            self.niche = niche;
        }
        if let Some(tone) = update.tone {
            self.tone = tone;
        }
        if let Some(template_id) = update.template_id {
            self.template_id = template_id;
        }
        if let Some(max_post_len) = update.max_post_len {
            self.max_post_len = max_post_len;
        }
        if let Some(safe_mode) = update.safe_mode {
            self.safe_mode = safe_mode;
        }
        if let Some(autopost_enabled) = update.autopost_enabled {
            self.autopost_enabled = autopost_enabled;
        }
        self
    }
}

/// Fully merged settings used by generation and publication. Nothing downstream
/// looks at `Option<ProjectSettings>` directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub language: String,
    pub niche: String,
    pub tone: String,
    pub template_id: String,
    pub max_post_len: usize,
    pub safe_mode: bool,
    pub autopost_enabled: bool,
}

impl ResolvedSettings {
    pub fn resolve(settings: Option<&ProjectSettings>, config: &GenerationConfig) -> Self {
        match settings {
            Some(s) => Self {
                language: s.language.clone(),
                niche: s.niche.clone(),
                tone: s.tone.clone(),
                template_id: s
                    .template_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TEMPLATE_ID.to_string()),
                max_post_len: s.max_post_len.max(1),
                safe_mode: s.safe_mode,
                autopost_enabled: s.autopost_enabled,
            },
            None => Self {
                language: DEFAULT_LANGUAGE.to_string(),
                niche: DEFAULT_NICHE.to_string(),
                tone: DEFAULT_TONE.to_string(),
                template_id: DEFAULT_TEMPLATE_ID.to_string(),
                max_post_len: config.default_max_post_len,
                safe_mode: true,
                autopost_enabled: false,
            },
        }
    }
}

super::string_enum!(
    /// Connection state of a project's channel.
    BindingStatus {
        Pending => "pending",
        Connected => "connected",
        Error => "error",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBinding {
    pub project_id: i64,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub status: BindingStatus,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ChannelBinding {
    pub fn is_connected(&self) -> bool {
        self.status == BindingStatus::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_without_settings_uses_defaults() {
        let config = GenerationConfig::default();
        let resolved = ResolvedSettings::resolve(None, &config);
        assert_eq!(resolved.language, "en");
        assert_eq!(resolved.template_id, DEFAULT_TEMPLATE_ID);
        assert_eq!(resolved.max_post_len, config.default_max_post_len);
        assert!(resolved.safe_mode);
    }

    #[test]
    fn resolve_keeps_explicit_template() {
        let mut settings = ProjectSettings::defaults(1);
        settings.template_id = Some("digest".to_string());
        settings.safe_mode = false;
        let resolved = ResolvedSettings::resolve(Some(&settings), &GenerationConfig::default());
        assert_eq!(resolved.template_id, "digest");
        assert!(!resolved.safe_mode);
    }

    #[test]
    fn update_only_touches_given_fields() {
        let settings = ProjectSettings::defaults(7).apply(SettingsUpdate {
            tone: Some("formal".to_string()),
            max_post_len: Some(280),
            ..Default::default()
        });
        assert_eq!(settings.tone, "formal");
        assert_eq!(settings.max_post_len, 280);
        assert_eq!(settings.language, DEFAULT_LANGUAGE);
    }
}
