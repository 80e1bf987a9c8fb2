//! Cohort model - a time-boxed intake of one course.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::id::{CohortId, CourseId, UserId};
use crate::Time;

/// A group of learners taking the same course run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    /// Unique identifier
    pub id: CohortId,

    /// Course this cohort runs
    pub course_id: CourseId,

    /// 1-based position among the course's cohorts
    pub sequence: u32,

    /// Display name
    pub name: String,

    /// First day of the run
    pub start_date: Time,

    /// Last day of the run
    pub end_date: Time,

    /// Members
    #[serde(default)]
    pub student_ids: BTreeSet<UserId>,

    /// Maximum number of members (None = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,

    /// When created
    pub created_at: Time,
}

impl Cohort {
    /// Whether the cohort still accepts learners at `at`.
    pub fn is_open_at(&self, at: Time) -> bool {
        self.end_date >= at
    }

    /// Whether there is room for one more learner.
    pub fn has_room(&self) -> bool {
        match self.capacity {
            Some(cap) => self.student_ids.len() < cap as usize,
            None => true,
        }
    }

    /// Summary handed back to callers of `enroll`.
    pub fn summary(&self) -> CohortSummary {
        CohortSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// The fields of a cohort a learner-facing screen shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSummary {
    /// Cohort id
    pub id: CohortId,
    /// Display name
    pub name: String,
    /// First day of the run
    pub start_date: Time,
    /// Last day of the run
    pub end_date: Time,
}
