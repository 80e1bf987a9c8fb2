//! Enrollment configuration.

use bootcamp_core::Time;
use chrono::{Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Maximum number of courses a learner may be enrolled in at once.
pub const MAX_ENROLLMENTS: usize = 2;

/// Configuration for enrollment and cohort placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    /// Course cap per learner
    pub max_enrollments: usize,

    /// Seats per new cohort (None = unbounded)
    pub cohort_capacity: Option<u32>,

    /// Cohort length for courses that declare none
    pub default_duration_weeks: u32,

    /// How a new cohort's start date is chosen
    pub intake: IntakePolicy,

    /// Retries of a conditional write before giving up
    pub max_write_attempts: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            max_enrollments: MAX_ENROLLMENTS,
            cohort_capacity: None,
            default_duration_weeks: 12,
            intake: IntakePolicy::Immediate,
            max_write_attempts: 5,
        }
    }
}

/// Start-date policy for newly opened cohorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakePolicy {
    /// The cohort starts at the moment it is opened
    Immediate,
    /// The cohort starts at midnight UTC on the next given weekday (today counts)
    NextWeekday {
        /// Intake day
        weekday: Weekday,
    },
}

impl IntakePolicy {
    /// Start date of a cohort opened at `reference`.
    pub fn start_for(&self, reference: Time) -> Time {
        match self {
            IntakePolicy::Immediate => reference,
            IntakePolicy::NextWeekday { weekday } => {
                let today = reference.weekday().num_days_from_monday() as i64;
                let target = weekday.num_days_from_monday() as i64;
                let days_ahead = (target - today).rem_euclid(7);
                let date = reference.date_naive() + Duration::days(days_ahead);
                Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EnrollmentConfig::default();
        assert_eq!(config.max_enrollments, 2);
        assert!(config.cohort_capacity.is_none());
        assert_eq!(config.intake, IntakePolicy::Immediate);
    }

    #[test]
    fn test_partial_config_is_defaulted() {
        let config: EnrollmentConfig =
            serde_json::from_str(r#"{ "cohort_capacity": 30 }"#).unwrap();
        assert_eq!(config.cohort_capacity, Some(30));
        assert_eq!(config.max_enrollments, MAX_ENROLLMENTS);
    }

    #[test]
    fn test_next_weekday_intake() {
        // 2024-03-06 is a Wednesday
        let wednesday = Utc.with_ymd_and_hms(2024, 3, 6, 15, 30, 0).unwrap();
        let monday = IntakePolicy::NextWeekday { weekday: Weekday::Mon };
        assert_eq!(
            monday.start_for(wednesday),
            Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()
        );

        let same_day = IntakePolicy::NextWeekday { weekday: Weekday::Wed };
        assert_eq!(
            same_day.start_for(wednesday),
            Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_immediate_intake() {
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 15, 30, 0).unwrap();
        assert_eq!(IntakePolicy::Immediate.start_for(now), now);
    }
}
