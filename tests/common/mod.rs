//! Shared fixtures for the integration tests: an app wired over a temporary
//! database with in-process fakes for every external service.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use autoposter::ai::MockGenerator;
use autoposter::channel::{ChannelClient, ChannelError};
use autoposter::config::Config;
use autoposter::db::Repository;
use autoposter::error::Result;
use autoposter::feed::FeedRetriever;
use autoposter::models::{DraftStatus, PostDraft, SettingsUpdate, SourceType};
use autoposter::queue::WorkQueue;
use autoposter::services::Sleeper;
use autoposter::store::MemoryStore;
use autoposter::{App, Backends};

pub const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Tech</title><link>https://news.example.com</link><description>News</description>
<item><guid>rust-1</guid><title>Rust 2.0 announced</title><link>https://news.example.com/rust-2</link>
<description>The Rust team announced a new edition with faster compile times.</description>
<pubDate>Mon, 02 Mar 2026 09:00:00 GMT</pubDate></item>
</channel></rss>"#;

/// Channel that records deliveries. Queued errors are returned first.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<ChannelError>>,
}

impl RecordingChannel {
    pub fn fail_next(&self, error: ChannelError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelClient for RecordingChannel {
    async fn send_post(&self, _channel_id: &str, text: &str) -> std::result::Result<String, ChannelError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(text.to_string());
        Ok(format!("msg-{}", sent.len()))
    }

    async fn send_test_message(&self, _channel_id: &str, _text: &str) -> std::result::Result<(), ChannelError> {
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Serves the same canned feed for every url.
pub struct CannedFeed(pub &'static str);

#[async_trait]
impl FeedRetriever for CannedFeed {
    async fn fetch_rss(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(self.0.as_bytes().to_vec())
    }

    async fn fetch_page(&self, _url: &str) -> Result<String> {
        Ok("<html><head><title>Page</title></head><body><p>Body</p></body></html>".to_string())
    }
}

#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<Duration>>);

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

pub struct TestApp {
    pub app: App,
    pub channel: Arc<RecordingChannel>,
    pub sleeper: Arc<RecordingSleeper>,
    _dir: tempfile::TempDir,
}

pub async fn setup(config: Config) -> TestApp {
    setup_with_queue(config, None).await
}

pub async fn setup_with_queue(config: Config, queue: Option<Arc<dyn WorkQueue>>) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("autoposter.db");
    let repository = Repository::new(&db_path.display().to_string())
        .await
        .expect("Failed to open database");

    let channel = Arc::new(RecordingChannel::default());
    let sleeper = Arc::new(RecordingSleeper::default());
    let backends = Backends {
        generator: Arc::new(MockGenerator),
        channel: Arc::clone(&channel) as Arc<dyn ChannelClient>,
        retriever: Arc::new(CannedFeed(FEED)),
        sleeper: Arc::clone(&sleeper) as Arc<dyn Sleeper>,
    };
    let app = App::assemble(&config, repository, Arc::new(MemoryStore::new()), backends, queue);

    TestApp {
        app,
        channel,
        sleeper,
        _dir: dir,
    }
}

impl TestApp {
    /// Project with a verified channel. Safe mode is switched as requested.
    pub async fn connected_project(&self, safe_mode: bool, now: DateTime<Utc>) -> i64 {
        let project = self
            .app
            .projects
            .create_project("owner-1", "Tech news", "UTC", now)
            .await
            .expect("create project");
        self.app
            .projects
            .update_settings(
                project.id,
                SettingsUpdate {
                    safe_mode: Some(safe_mode),
                    ..Default::default()
                },
            )
            .await
            .expect("update settings");
        self.app
            .channels
            .bind_channel(project.id, "@technews", Some("Tech news".into()))
            .await
            .expect("bind channel");
        self.app
            .channels
            .check_binding(project.id, now)
            .await
            .expect("check channel");
        project.id
    }

    /// Add the canned feed under `url`, fetch it and return the new item ids.
    pub async fn fetched_items(&self, project_id: i64, url: &str, now: DateTime<Utc>) -> Vec<i64> {
        self.fetched_items_of(project_id, SourceType::Rss, url, now).await
    }

    pub async fn fetched_items_of(
        &self,
        project_id: i64,
        source_type: SourceType,
        url: &str,
        now: DateTime<Utc>,
    ) -> Vec<i64> {
        let source = self
            .app
            .sources
            .add_source(project_id, source_type, url)
            .await
            .expect("add source");
        let outcome = self
            .app
            .sources
            .fetch_source_at(source.id, now)
            .await
            .expect("fetch source");
        assert_eq!(outcome.saved, 1);
        self.app
            .repository
            .list_new_items(project_id, 10)
            .await
            .expect("list items")
            .into_iter()
            .filter(|item| item.source_id == source.id)
            .map(|item| item.id)
            .collect()
    }

    /// A generated draft that is ready to publish.
    pub async fn ready_draft(&self, project_id: i64, url: &str, now: DateTime<Utc>) -> PostDraft {
        self.ready_draft_of(project_id, SourceType::Rss, url, now).await
    }

    pub async fn ready_draft_of(
        &self,
        project_id: i64,
        source_type: SourceType,
        url: &str,
        now: DateTime<Utc>,
    ) -> PostDraft {
        let items = self.fetched_items_of(project_id, source_type, url, now).await;
        let draft = self
            .app
            .drafts
            .generate_at(items[0], None, now)
            .await
            .expect("generate draft")
            .into_inner();
        if draft.status == DraftStatus::Ready {
            draft
        } else {
            self.app.drafts.approve(draft.id, now).await.expect("approve draft")
        }
    }
}
