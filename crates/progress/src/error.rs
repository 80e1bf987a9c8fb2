//! Progress tracking errors.

use bootcamp_core::{BlockId, CourseId, SectionId, UserId, WeekId};
use bootcamp_storage::StorageError;

/// Result type for progress operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors raised by the progress tracker.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// No user document
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// No course document
    #[error("course not found: {0}")]
    CourseNotFound(CourseId),

    /// The block is not part of the course
    #[error("block {block} not found in course {course}")]
    BlockNotFound {
        /// Course searched
        course: CourseId,
        /// Missing block
        block: BlockId,
    },

    /// The section is not part of the course
    #[error("section {week}/{section} not found")]
    SectionNotFound {
        /// Week searched
        week: WeekId,
        /// Missing section
        section: SectionId,
    },

    /// The learner does not take the course
    #[error("{user} is not enrolled in {course}")]
    NotEnrolled {
        /// Learner
        user: UserId,
        /// Course
        course: CourseId,
    },

    /// The learner's subscription has lapsed
    #[error("subscription of {0} is not active")]
    InactiveSubscription(UserId),

    /// The block has the wrong kind for the operation
    #[error("block {block} is not {expected}")]
    WrongBlockKind {
        /// Offending block
        block: BlockId,
        /// What was expected, e.g. "a quiz"
        expected: &'static str,
    },

    /// The quiz has no questions to grade
    #[error("quiz {0} has no questions")]
    EmptyQuiz(BlockId),

    /// One answer per question is required
    #[error("expected {expected} answers, got {actual}")]
    AnswerCount {
        /// Questions in the quiz
        expected: usize,
        /// Answers given
        actual: usize,
    },

    /// The assignment payload was rejected
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}
