//! Bootcamp core data models.
//!
//! This crate defines the documents the enrollment and progress services
//! read and write: users, courses, cohorts, progress records and learner
//! submissions.

#![warn(missing_docs)]

// Core identities
mod id;
mod clock;

// Accounts and curriculum
mod user;
mod course;
mod cohort;

// Learner state
mod progress;
mod submission;

// Re-exports
pub use id::*;
pub use clock::{Clock, FixedClock, SystemClock};

pub use user::{Role, Subscription, SubscriptionStatus, User};
pub use course::{
    Assignment, BlockLocation, ContentBlock, Course, Quiz, QuizQuestion, Section,
    SubmissionType, Week,
};
pub use cohort::{Cohort, CohortSummary};

pub use progress::ProgressRecord;
pub use submission::{AssignmentSubmission, QuizAnswer, SubmissionPayload};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Names of the store collections the services use.
pub mod collections {
    /// User documents, keyed by user id
    pub const USERS: &str = "users";
    /// Course documents, keyed by course id
    pub const COURSES: &str = "courses";
    /// Cohort documents, keyed by cohort id
    pub const COHORTS: &str = "cohorts";
    /// Progress records, keyed `userId_courseId`
    pub const PROGRESS: &str = "progress";
    /// Quiz answers, keyed `userId_courseId_blockId_q<index>`
    pub const QUIZ_ANSWERS: &str = "quiz_answers";
    /// Assignment submissions, keyed `userId_courseId_blockId`
    pub const ASSIGNMENT_SUBMISSIONS: &str = "assignment_submissions";
}
