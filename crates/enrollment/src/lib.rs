//! Enrollment and cohort placement.
//!
//! [`EnrollmentService`] decides whether a learner may take a course and
//! enrolls them; [`CohortRegistry`] finds or opens the cohort they join.

#![warn(missing_docs)]

pub mod cohort;
pub mod config;
pub mod error;
pub mod service;

pub use cohort::CohortRegistry;
pub use config::{EnrollmentConfig, IntakePolicy, MAX_ENROLLMENTS};
pub use error::{EnrollStep, EnrollmentError, Result};
pub use service::{
    EnrolledCourse, EnrollmentCheck, EnrollmentReason, EnrollmentService, EnrollOutcome,
    UnenrollOutcome,
};
