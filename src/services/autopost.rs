use chrono::{DateTime, Days, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::db::Repository;
use crate::error::Result;
use crate::models::PublicationLog;
use crate::services::{DraftService, PublicationService};

/// Publishes the next ready draft of each project when a schedule slot is due.
#[derive(Clone)]
pub struct AutopostScheduler {
    repo: Repository,
    drafts: DraftService,
    publication: PublicationService,
    tolerance: chrono::Duration,
}

impl AutopostScheduler {
    pub fn new(
        repo: Repository,
        drafts: DraftService,
        publication: PublicationService,
        tolerance_min: i64,
    ) -> Self {
        Self {
            repo,
            drafts,
            publication,
            tolerance: chrono::Duration::minutes(tolerance_min.max(0)),
        }
    }

    /// One scheduler pass over every enabled schedule. A failing project is
    /// logged and does not stop the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<PublicationLog>> {
        let mut published = Vec::new();
        for schedule in self.repo.list_enabled_schedules().await? {
            match self.publish_due(schedule.project_id, now).await {
                Ok(Some(log)) => published.push(log),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(project_id = schedule.project_id, error = %e, "Autopost failed")
                }
            }
        }
        Ok(published)
    }

    /// Publish for the slot that is due at `now`, if any.
    ///
    /// Repeated calls inside the same slot window return the log written by the
    /// first one instead of publishing again.
    pub async fn publish_due(
        &self,
        project_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PublicationLog>> {
        let Some(schedule) = self.repo.get_schedule(project_id).await? else {
            return Ok(None);
        };
        if !schedule.enabled {
            return Ok(None);
        }
        let connected = self
            .repo
            .get_channel_binding(project_id)
            .await?
            .is_some_and(|b| b.is_connected());
        if !connected {
            tracing::debug!(project_id, "Channel not connected, skipping autopost");
            return Ok(None);
        }

        // projects without stored settings run in safe mode
        let safe_mode = self
            .repo
            .get_settings(project_id)
            .await?
            .map_or(true, |s| s.safe_mode);
        if safe_mode {
            self.drafts.enforce_safe_mode(project_id).await?;
        }

        let tz = schedule.timezone();
        let now_local = now.with_timezone(&tz).naive_local();
        let Some(slot_local) = resolve_slot(&schedule.slot_times(), now_local, self.tolerance)
        else {
            return Ok(None);
        };
        let Some(slot) = local_to_utc(&tz, slot_local) else {
            tracing::warn!(project_id, slot = %slot_local, "Slot does not exist in local time");
            return Ok(None);
        };
        tracing::debug!(project_id, slot = %slot_local, "Slot due");

        if let Some(log) = self.repo.find_published_for_slot(project_id, slot).await? {
            return Ok(Some(log));
        }

        let Some(draft) = self.repo.next_ready_draft(project_id).await? else {
            tracing::debug!(project_id, "No ready draft for slot");
            return Ok(None);
        };

        if let Some(log) = self.repo.get_publication_log(draft.id, Some(slot)).await? {
            return Ok(Some(log));
        }

        let day = slot_local.date();
        let start = local_to_utc(&tz, day.and_time(NaiveTime::MIN));
        let end = day
            .checked_add_days(Days::new(1))
            .and_then(|next| local_to_utc(&tz, next.and_time(NaiveTime::MIN)));
        if let (Some(start), Some(end)) = (start, end) {
            let published = self
                .repo
                .count_published_between(project_id, start, end)
                .await?;
            if published >= schedule.per_day_limit {
                tracing::info!(project_id, published, limit = schedule.per_day_limit, "Daily autopost limit reached");
                return Ok(None);
            }
        }

        tracing::info!(project_id, draft_id = draft.id, slot = %slot, "Autopublishing draft");
        let outcome = self
            .publication
            .publish_scheduled(draft.id, slot, now)
            .await?;
        Ok(Some(outcome.into_log()))
    }
}

/// Latest slot at or before `now_local` that is at most `tolerance` old.
/// Yesterday's slots count too, so a slot just before midnight is still found
/// right after it.
pub fn resolve_slot(
    slots: &[NaiveTime],
    now_local: NaiveDateTime,
    tolerance: chrono::Duration,
) -> Option<NaiveDateTime> {
    let today = now_local.date();
    let days = [Some(today), today.pred_opt()];
    days.into_iter()
        .flatten()
        .flat_map(|day| slots.iter().map(move |t| day.and_time(*t)))
        .filter(|slot| *slot <= now_local && now_local - *slot <= tolerance)
        .max()
}

/// Local wall time to UTC. Ambiguous times take the earlier instant; times in a
/// DST gap move forward by an hour.
fn local_to_utc(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(local + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn slots() -> Vec<NaiveTime> {
        vec![
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        ]
    }

    #[test]
    fn picks_slot_within_tolerance() {
        let tol = chrono::Duration::minutes(5);
        assert_eq!(resolve_slot(&slots(), at(10, 2), tol), Some(at(10, 0)));
        assert_eq!(resolve_slot(&slots(), at(10, 5), tol), Some(at(10, 0)));
        assert_eq!(resolve_slot(&slots(), at(14, 6), tol), None);
        assert_eq!(resolve_slot(&slots(), at(9, 59), tol), None);
    }

    #[test]
    fn latest_due_slot_wins() {
        let slots = vec![
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 3, 0).unwrap(),
        ];
        let tol = chrono::Duration::minutes(5);
        assert_eq!(resolve_slot(&slots, at(10, 4), tol), Some(at(10, 3)));
    }

    #[test]
    fn slot_before_midnight_matches_after_it() {
        let slots = vec![NaiveTime::from_hms_opt(23, 58, 0).unwrap()];
        let now = at(0, 1);
        let expected = NaiveDate::from_ymd_opt(2026, 3, 9)
            .unwrap()
            .and_hms_opt(23, 58, 0)
            .unwrap();
        assert_eq!(
            resolve_slot(&slots, now, chrono::Duration::minutes(5)),
            Some(expected)
        );
    }

    #[test]
    fn local_slot_converts_with_zone() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // CET in March before the switch: UTC+1
        let utc = local_to_utc(&tz, at(10, 0)).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());

        // 02:30 does not exist on 2026-03-29 in Berlin
        let gap = NaiveDate::from_ymd_opt(2026, 3, 29)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert!(local_to_utc(&tz, gap).is_some());
    }
}
