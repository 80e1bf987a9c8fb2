//! Enrollment errors.

use bootcamp_core::{CohortId, CourseId, UserId};
use bootcamp_storage::StorageError;
use std::fmt;

use crate::service::EnrollmentReason;

/// Result type for enrollment operations.
pub type Result<T> = std::result::Result<T, EnrollmentError>;

/// Errors raised by the cohort registry and the enrollment service.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    /// No user document
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// No course document
    #[error("course not found: {0}")]
    CourseNotFound(CourseId),

    /// No cohort document
    #[error("cohort not found: {0}")]
    CohortNotFound(CohortId),

    /// The course document cannot produce a cohort
    #[error("course {course} cannot open a cohort: {reason}")]
    InvalidCourse {
        /// Offending course
        course: CourseId,
        /// What is wrong with it
        reason: String,
    },

    /// The course accepts no new cohorts and none is open
    #[error("course {0} is not accepting new cohorts")]
    CourseClosed(CourseId),

    /// The cohort reached its capacity
    #[error("cohort {0} is full")]
    CohortFull(CohortId),

    /// The enrollment rules refused the request
    #[error("{0}")]
    Rejected(EnrollmentReason),

    /// A step after the first failed; earlier steps stay applied
    #[error("enrollment stopped while {step}: {source}")]
    PartialFailure {
        /// Step that failed
        step: EnrollStep,
        /// What went wrong
        source: Box<EnrollmentError>,
    },

    /// Gave up after repeated write conflicts
    #[error("too much contention on {0}, try again")]
    Contention(String),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EnrollmentError {
    /// Tag an error with the enrollment step it happened in.
    pub(crate) fn during(self, step: EnrollStep) -> Self {
        match self {
            EnrollmentError::Rejected(_) | EnrollmentError::PartialFailure { .. } => self,
            other => EnrollmentError::PartialFailure {
                step,
                source: Box::new(other),
            },
        }
    }
}

/// The steps of an enrollment that follow cohort placement, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollStep {
    /// Adding the learner to the cohort
    JoinCohort,
    /// Writing the course and cohort onto the user
    RecordEnrollment,
}

impl fmt::Display for EnrollStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnrollStep::JoinCohort => "joining the cohort",
            EnrollStep::RecordEnrollment => "recording the enrollment",
        };
        f.write_str(s)
    }
}
