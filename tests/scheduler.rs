//! Autopost scheduling against a fixed clock.

mod common;

use chrono::{DateTime, TimeZone, Utc};

use autoposter::models::{DraftStatus, SettingsUpdate, SourceType};
use autoposter::Config;

use common::{setup, TestApp};

const FEED_URL: &str = "https://news.example.com/feed.xml";
const PAGE_URL: &str = "https://blog.example.com/post";

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
}

async fn scheduled_project(t: &TestApp, tz: &str, slots: &[&str], per_day: u32) -> i64 {
    let project_id = t.connected_project(false, at(8, 0)).await;
    t.app
        .projects
        .configure_schedule(project_id, tz, slots, per_day, true)
        .await
        .unwrap();
    project_id
}

#[tokio::test]
async fn due_slot_publishes_once() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00", "14:00"], 2).await;
    let draft = t.ready_draft(project_id, FEED_URL, at(8, 0)).await;

    let log = t
        .app
        .autopost
        .publish_due(project_id, at(10, 2))
        .await
        .unwrap()
        .expect("slot is due");
    assert_eq!(log.draft_id, draft.id);
    assert_eq!(log.scheduled_at, Some(at(10, 0)));

    let again = t
        .app
        .autopost
        .publish_due(project_id, at(10, 4))
        .await
        .unwrap()
        .expect("same slot");
    assert_eq!(again.id, log.id);
    assert_eq!(t.channel.sent().len(), 1);

    let stored = t.app.drafts.get_draft(draft.id).await.unwrap();
    assert_eq!(stored.status, DraftStatus::Published);
}

#[tokio::test]
async fn nothing_due_outside_the_window() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00", "14:00"], 2).await;
    t.ready_draft(project_id, FEED_URL, at(8, 0)).await;

    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(9, 58))
        .await
        .unwrap()
        .is_none());
    t.app
        .autopost
        .publish_due(project_id, at(10, 2))
        .await
        .unwrap()
        .expect("10:00 slot");

    t.ready_draft_of(project_id, SourceType::Url, PAGE_URL, at(11, 0))
        .await;
    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(14, 6))
        .await
        .unwrap()
        .is_none());
    assert_eq!(t.channel.sent().len(), 1);
}

#[tokio::test]
async fn empty_queue_publishes_nothing() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00"], 1).await;

    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(10, 1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn daily_limit_caps_publications() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00", "14:00"], 1).await;
    t.ready_draft(project_id, FEED_URL, at(8, 0)).await;
    let second = t
        .ready_draft_of(project_id, SourceType::Url, PAGE_URL, at(8, 0))
        .await;

    t.app
        .autopost
        .publish_due(project_id, at(10, 0))
        .await
        .unwrap()
        .expect("first slot");
    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(14, 1))
        .await
        .unwrap()
        .is_none());

    let stored = t.app.drafts.get_draft(second.id).await.unwrap();
    assert_eq!(stored.status, DraftStatus::Ready);
    assert_eq!(t.channel.sent().len(), 1);
}

#[tokio::test]
async fn safe_mode_holds_back_unapproved_drafts() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00"], 1).await;
    let draft = t.ready_draft(project_id, FEED_URL, at(8, 0)).await;
    assert!(draft.approved_at.is_none());

    t.app
        .projects
        .update_settings(
            project_id,
            SettingsUpdate {
                safe_mode: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(10, 1))
        .await
        .unwrap()
        .is_none());
    let stored = t.app.drafts.get_draft(draft.id).await.unwrap();
    assert_eq!(stored.status, DraftStatus::NeedsApproval);
    assert!(t.channel.sent().is_empty());

    // after a human approves it the next tick inside the window publishes
    t.app.drafts.approve(draft.id, at(10, 2)).await.unwrap();
    let log = t
        .app
        .autopost
        .publish_due(project_id, at(10, 3))
        .await
        .unwrap()
        .expect("approved draft");
    assert_eq!(log.draft_id, draft.id);
}

#[tokio::test]
async fn approving_an_auto_ready_draft_survives_safe_mode() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00"], 1).await;
    let draft = t.ready_draft(project_id, FEED_URL, at(8, 0)).await;
    assert_eq!(draft.status, DraftStatus::Ready);
    assert!(draft.approved_at.is_none());

    let approved = t.app.drafts.approve(draft.id, at(9, 0)).await.unwrap();
    assert_eq!(approved.status, DraftStatus::Ready);
    assert!(approved.approved_at.is_some());
    // approving twice stays a no-op
    t.app.drafts.approve(draft.id, at(9, 5)).await.unwrap();

    t.app
        .projects
        .update_settings(
            project_id,
            SettingsUpdate {
                safe_mode: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let log = t
        .app
        .autopost
        .publish_due(project_id, at(10, 1))
        .await
        .unwrap()
        .expect("approved draft is published");
    assert_eq!(log.draft_id, draft.id);
}

#[tokio::test]
async fn slots_follow_the_schedule_time_zone() {
    let t = setup(Config::default()).await;
    // Berlin is UTC+1 on 2026-03-10
    let project_id = scheduled_project(&t, "Europe/Berlin", &["11:00"], 1).await;
    t.ready_draft(project_id, FEED_URL, at(8, 0)).await;

    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(11, 1))
        .await
        .unwrap()
        .is_none());
    let log = t
        .app
        .autopost
        .publish_due(project_id, at(10, 1))
        .await
        .unwrap()
        .expect("11:00 Berlin");
    assert_eq!(log.scheduled_at, Some(at(10, 0)));
}

#[tokio::test]
async fn disabled_schedule_or_lost_channel_skips_project() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00"], 1).await;
    t.ready_draft(project_id, FEED_URL, at(8, 0)).await;

    t.app
        .projects
        .configure_schedule(project_id, "UTC", &["10:00"], 1, false)
        .await
        .unwrap();
    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(10, 1))
        .await
        .unwrap()
        .is_none());
    assert!(!t.app.projects.get_settings(project_id).await.unwrap().autopost_enabled);

    t.app
        .projects
        .configure_schedule(project_id, "UTC", &["10:00"], 1, true)
        .await
        .unwrap();
    t.channel.fail_next(autoposter::channel::ChannelError::Forbidden(
        "bot was removed".into(),
    ));
    assert!(t.app.channels.check_binding(project_id, at(9, 0)).await.is_err());
    assert!(t
        .app
        .autopost
        .publish_due(project_id, at(10, 1))
        .await
        .unwrap()
        .is_none());
    assert!(t.channel.sent().is_empty());
}

#[tokio::test]
async fn tick_covers_every_enabled_project() {
    let t = setup(Config::default()).await;
    let project_id = scheduled_project(&t, "UTC", &["10:00"], 1).await;
    let draft = t.ready_draft(project_id, FEED_URL, at(8, 0)).await;

    let logs = t.app.autopost.tick(at(10, 0)).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].draft_id, draft.id);
}
