use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const MAX_SLOTS: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub project_id: i64,
    pub tz: String,
    pub slots: Vec<String>,
    pub per_day_limit: u32,
    pub enabled: bool,
}

impl Schedule {
    /// The schedule's zone, or UTC when the stored name is not a valid IANA zone.
    pub fn timezone(&self) -> Tz {
        match self.tz.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(project_id = self.project_id, tz = %self.tz, "Invalid time zone, using UTC");
                Tz::UTC
            }
        }
    }

    /// Slots that parse as `HH:MM`, in stored order. Malformed entries are skipped.
    pub fn slot_times(&self) -> Vec<NaiveTime> {
        self.slots.iter().filter_map(|s| parse_slot(s)).collect()
    }
}

pub fn parse_slot(slot: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(slot.trim(), "%H:%M").ok()
}

/// Validate, deduplicate and sort `HH:MM` slots.
pub fn normalize_slots<S: AsRef<str>>(slots: &[S]) -> Result<Vec<String>> {
    let mut times = Vec::with_capacity(slots.len());
    for slot in slots {
        let slot = slot.as_ref();
        let time = parse_slot(slot)
            .ok_or_else(|| AppError::Validation(format!("slot '{slot}' is not HH:MM")))?;
        times.push(time);
    }
    times.sort();
    times.dedup();
    if times.len() > MAX_SLOTS {
        return Err(AppError::Validation(format!(
            "at most {MAX_SLOTS} slots are allowed, got {}",
            times.len()
        )));
    }
    Ok(times.iter().map(|t| t.format("%H:%M").to_string()).collect())
}

pub fn validate_timezone(tz: &str) -> Result<Tz> {
    tz.parse::<Tz>()
        .map_err(|_| AppError::Validation(format!("unknown time zone '{tz}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_sorted_and_deduplicated() {
        let slots = normalize_slots(&["14:00", "9:05", "14:00", "09:05"]).unwrap();
        assert_eq!(slots, vec!["09:05".to_string(), "14:00".to_string()]);
    }

    #[test]
    fn malformed_slot_is_rejected() {
        assert!(normalize_slots(&["25:00"]).is_err());
        assert!(normalize_slots(&["noon"]).is_err());
    }

    #[test]
    fn too_many_slots_rejected() {
        let slots = ["01:00", "02:00", "03:00", "04:00", "05:00", "06:00", "07:00"];
        assert!(normalize_slots(&slots).is_err());
    }

    #[test]
    fn invalid_zone_falls_back_to_utc() {
        let schedule = Schedule {
            project_id: 1,
            tz: "Mars/Olympus".to_string(),
            slots: vec![],
            per_day_limit: 1,
            enabled: true,
        };
        assert_eq!(schedule.timezone(), Tz::UTC);
        assert!(validate_timezone("Europe/Berlin").is_ok());
    }
}
