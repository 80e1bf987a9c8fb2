//! Course progress tracking.
//!
//! Quiz grading, assignment hand-ins and the per-section completion state
//! machine, on top of the document store.

#![warn(missing_docs)]

pub mod completion;
pub mod config;
pub mod error;
pub mod grading;
pub mod tracker;

pub use completion::PendingItem;
pub use config::{ProgressConfig, PASS_THRESHOLD};
pub use error::{ProgressError, Result};
pub use grading::Grade;
pub use tracker::{CourseReport, ProgressTracker, QuizResult, SectionReport, StoreProgressTracker};
