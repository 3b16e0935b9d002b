//! Backup schedule and retention settings.
//!
//! The crate never runs timers itself. A host process that wants recurring
//! backups asks [`ScheduleConfig::next_run_after`] when to fire and calls
//! [`BackupEngine::trigger_backup`](crate::backup::BackupEngine::trigger_backup)
//! at that time.

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    #[default]
    Disabled,
    Daily,
    Weekly,
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScheduleKind::Disabled => "disabled",
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
        })
    }
}

impl FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(ScheduleKind::Disabled),
            "daily" => Ok(ScheduleKind::Daily),
            "weekly" => Ok(ScheduleKind::Weekly),
            other => Err(format!(
                "unknown schedule type '{}'. Must be disabled, daily, or weekly.",
                other
            )),
        }
    }
}

/// Schedule plus day-based retention for backup archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    /// Local hour of day, 0-23.
    pub hour: u32,
    /// 0 = Sunday through 6 = Saturday.
    pub day_of_week: u32,
    /// Archives older than this many days are pruned. 0 keeps everything.
    pub retention_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: ScheduleKind::Disabled,
            hour: 3,
            day_of_week: 0,
            retention_days: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.hour > 23 {
            return Err(format!("hour must be in 0..=23, got {}", self.hour));
        }
        if self.day_of_week > 6 {
            return Err(format!(
                "day_of_week must be in 0..=6 (0 = Sunday), got {}",
                self.day_of_week
            ));
        }
        Ok(())
    }

    /// First scheduled run strictly after `now`, or `None` when no schedule
    /// is active.
    pub fn next_run_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if !self.enabled || self.validate().is_err() {
            return None;
        }
        let at = NaiveTime::from_hms_opt(self.hour, 0, 0)?;
        let today = now.date_naive();

        // A week plus one day covers every weekly slot and DST gaps.
        for offset in 0..=7 {
            let date = today + Duration::days(offset);
            let matches_day = match self.kind {
                ScheduleKind::Disabled => return None,
                ScheduleKind::Daily => true,
                ScheduleKind::Weekly => {
                    date.weekday().num_days_from_sunday() == self.day_of_week
                }
            };
            if !matches_day {
                continue;
            }
            if let Some(candidate) = Local.from_local_datetime(&date.and_time(at)).earliest() {
                if candidate > now {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// True when a run scheduled after `last_run` is due at `now`.
    pub fn is_due(&self, last_run: Option<DateTime<Local>>, now: DateTime<Local>) -> bool {
        match last_run {
            Some(last) => self.next_run_after(last).is_some_and(|next| next <= now),
            None => self.enabled && self.kind != ScheduleKind::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .earliest()
            .unwrap()
    }

    fn daily(hour: u32) -> ScheduleConfig {
        ScheduleConfig {
            enabled: true,
            kind: ScheduleKind::Daily,
            hour,
            ..ScheduleConfig::default()
        }
    }

    #[test]
    fn test_disabled_has_no_next_run() {
        let mut cfg = daily(3);
        cfg.enabled = false;
        assert!(cfg.next_run_after(local(2024, 6, 3, 1, 0)).is_none());

        let cfg = ScheduleConfig {
            enabled: true,
            ..ScheduleConfig::default()
        };
        assert!(cfg.next_run_after(local(2024, 6, 3, 1, 0)).is_none());
    }

    #[test]
    fn test_daily_later_today() {
        let next = daily(3).next_run_after(local(2024, 6, 3, 1, 30)).unwrap();
        assert_eq!(next, local(2024, 6, 3, 3, 0));
    }

    #[test]
    fn test_daily_rolls_to_tomorrow() {
        let next = daily(3).next_run_after(local(2024, 6, 3, 3, 0)).unwrap();
        assert_eq!(next, local(2024, 6, 4, 3, 0));
    }

    #[test]
    fn test_weekly_picks_requested_weekday() {
        // 2024-06-03 is a Monday; day 5 is Friday.
        let cfg = ScheduleConfig {
            enabled: true,
            kind: ScheduleKind::Weekly,
            hour: 22,
            day_of_week: 5,
            retention_days: 30,
        };
        let next = cfg.next_run_after(local(2024, 6, 3, 12, 0)).unwrap();
        assert_eq!(next, local(2024, 6, 7, 22, 0));

        let after = cfg.next_run_after(next).unwrap();
        assert_eq!(after, local(2024, 6, 14, 22, 0));
    }

    #[test]
    fn test_is_due() {
        let cfg = daily(3);
        let last = local(2024, 6, 3, 3, 0);
        assert!(!cfg.is_due(Some(last), local(2024, 6, 3, 20, 0)));
        assert!(cfg.is_due(Some(last), local(2024, 6, 4, 3, 5)));
        assert!(cfg.is_due(None, local(2024, 6, 4, 3, 5)));
    }

    #[test]
    fn test_validate_bounds() {
        let mut cfg = daily(24);
        assert!(cfg.validate().is_err());
        cfg.hour = 23;
        cfg.day_of_week = 7;
        assert!(cfg.validate().is_err());
        cfg.day_of_week = 6;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Weekly".parse::<ScheduleKind>().unwrap(), ScheduleKind::Weekly);
        assert!("hourly".parse::<ScheduleKind>().is_err());
    }
}
