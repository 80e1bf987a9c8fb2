//! Progress record - completion state of one learner in one course.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use crate::course::Course;
use crate::id::{section_key, BlockId, CourseId, SectionId, UserId, WeekId};
use crate::Time;

/// Per-learner, per-course progress.
///
/// `completed_sections` only ever grows. Quiz scores keep the latest attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Learner
    pub user_id: UserId,

    /// Course
    pub course_id: CourseId,

    /// Completed sections as `weekId_sectionId` keys
    #[serde(default)]
    pub completed_sections: BTreeSet<String>,

    /// Latest quiz score (0-100) per quiz block
    #[serde(default)]
    pub quiz_scores: BTreeMap<BlockId, u8>,

    /// Last time the learner touched the course
    pub last_accessed_at: Time,
}

impl ProgressRecord {
    /// Fresh record for a first visit.
    pub fn new(user_id: UserId, course_id: CourseId, now: Time) -> Self {
        Self {
            user_id,
            course_id,
            completed_sections: BTreeSet::new(),
            quiz_scores: BTreeMap::new(),
            last_accessed_at: now,
        }
    }

    /// Whether a section has been completed.
    pub fn is_section_complete(&self, week_id: &WeekId, section_id: &SectionId) -> bool {
        self.completed_sections.contains(&section_key(week_id, section_id))
    }

    /// Number of completed keys that name a section of `course`.
    ///
    /// Keys left behind by sections removed from the curriculum are ignored
    /// so the ratio never exceeds one.
    pub fn completed_in(&self, course: &Course) -> usize {
        course
            .section_keys()
            .filter(|k| self.completed_sections.contains(k))
            .count()
    }

    /// Completed fraction of `course` in `[0, 1]`.
    pub fn completion_fraction(&self, course: &Course) -> f64 {
        let total = course.total_sections();
        if total == 0 {
            return 0.0;
        }
        self.completed_in(course) as f64 / total as f64
    }
}
