//! Progress tracking service.

use async_trait::async_trait;
use bootcamp_core::{
    answer_key, collections, progress_key, section_key, submission_key, Assignment,
    AssignmentSubmission, AttemptId, BlockId, Clock, ContentBlock, Course, CourseId,
    ProgressRecord, QuizAnswer, Section, SectionId, SubmissionPayload, SubmissionType, Time,
    User, UserId, Week, WeekId,
};
use bootcamp_storage::{self as storage, DocumentStore, FieldChange, Precondition, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::completion::{auto_completes, pending_items, PendingItem};
use crate::config::ProgressConfig;
use crate::error::{ProgressError, Result};
use crate::grading::grade;

/// Progress tracking service.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Grade a quiz attempt, store it, and complete the section if it is now resolved.
    async fn record_quiz_attempt(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        block_id: &BlockId,
        answers: &[usize],
    ) -> Result<QuizResult>;

    /// Store an assignment submission, replacing any earlier one.
    async fn record_assignment_submission(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        block_id: &BlockId,
        payload: SubmissionPayload,
    ) -> Result<AssignmentSubmission>;

    /// Complete a section regardless of its unresolved items. Idempotent.
    async fn mark_section_complete(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        week_id: &WeekId,
        section_id: &SectionId,
    ) -> Result<()>;

    /// Completed fraction of `course` in `[0, 1]`.
    async fn get_completion_percentage(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        course: &Course,
    ) -> Result<f64>;

    /// Record a visit, creating the progress record on the first one.
    async fn open_course(&self, user_id: &UserId, course_id: &CourseId) -> Result<ProgressRecord>;

    /// Completion state and unresolved items of one section.
    async fn section_status(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        week_id: &WeekId,
        section_id: &SectionId,
    ) -> Result<SectionReport>;

    /// Course-wide summary of a learner's progress.
    async fn course_report(&self, user_id: &UserId, course_id: &CourseId) -> Result<CourseReport>;
}

/// Result of a graded quiz attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    /// Attempt the stored answers belong to
    pub attempt_id: AttemptId,
    /// Score, 0-100
    pub score: u8,
    /// Whether the score reaches the threshold
    pub passed: bool,
    /// Correct answers
    pub correct: usize,
    /// Questions
    pub total: usize,
    /// Whether the owning section is complete after this attempt
    pub section_complete: bool,
}

/// State of one section for one learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionReport {
    /// Week
    pub week_id: WeekId,
    /// Section
    pub section_id: SectionId,
    /// Whether the section is complete
    pub complete: bool,
    /// Gradeable blocks not yet resolved
    pub pending_items: Vec<PendingItem>,
}

/// Course-wide progress summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseReport {
    /// Course
    pub course_id: CourseId,
    /// Completed sections that still exist in the course
    pub completed_sections: usize,
    /// Sections in the course
    pub total_sections: usize,
    /// `completed_sections / total_sections`
    pub fraction: f64,
    /// Latest quiz scores
    pub quiz_scores: BTreeMap<BlockId, u8>,
    /// Last visit, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<Time>,
}

/// Progress tracker backed by a document store.
pub struct StoreProgressTracker {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: ProgressConfig,
}

impl StoreProgressTracker {
    /// Create a tracker with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config: ProgressConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ProgressConfig) -> Self {
        self.config = config;
        self
    }

    async fn load_course(&self, course_id: &CourseId) -> Result<Course> {
        storage::load::<Course>(self.store.as_ref(), collections::COURSES, course_id.as_str())
            .await?
            .map(|v| v.value)
            .ok_or_else(|| ProgressError::CourseNotFound(course_id.clone()))
    }

    /// Gate learner writes on enrollment and subscription.
    async fn authorize(&self, user_id: &UserId, course_id: &CourseId, now: Time) -> Result<()> {
        let user = storage::load::<User>(self.store.as_ref(), collections::USERS, user_id.as_str())
            .await?
            .map(|v| v.value)
            .ok_or_else(|| ProgressError::UserNotFound(user_id.clone()))?;

        if !user.is_enrolled(course_id) {
            return Err(ProgressError::NotEnrolled {
                user: user_id.clone(),
                course: course_id.clone(),
            });
        }
        if self.config.require_subscription && !user.has_active_subscription(now) {
            return Err(ProgressError::InactiveSubscription(user_id.clone()));
        }
        Ok(())
    }

    async fn load_record(&self, user_id: &UserId, course_id: &CourseId) -> Result<Option<ProgressRecord>> {
        Ok(storage::load::<ProgressRecord>(
            self.store.as_ref(),
            collections::PROGRESS,
            &progress_key(user_id, course_id),
        )
        .await?
        .map(|v| v.value))
    }

    /// Create the progress record unless it exists, and return its key.
    async fn ensure_record(&self, user_id: &UserId, course_id: &CourseId, now: Time) -> Result<String> {
        let key = progress_key(user_id, course_id);
        let record = ProgressRecord::new(user_id.clone(), course_id.clone(), now);
        match storage::save(self.store.as_ref(), collections::PROGRESS, &key, &record, Precondition::Absent).await {
            Ok(_) => debug!("Started progress record {}", key),
            Err(StorageError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(key)
    }

    /// Apply `changes` to the record and bump its last access time.
    async fn touch(&self, key: &str, mut changes: Vec<FieldChange>, now: Time) -> Result<()> {
        changes.push(FieldChange::set("lastAccessedAt", now.to_rfc3339()));
        self.store.modify(collections::PROGRESS, key, &changes).await?;
        Ok(())
    }

    /// Assignment blocks of `section` with a non-empty submission.
    async fn submitted_blocks(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        section: &Section,
    ) -> Result<BTreeSet<BlockId>> {
        let mut submitted = BTreeSet::new();
        for block in section.gradeable_blocks() {
            let ContentBlock::Assignment(assignment) = block else {
                continue;
            };
            let key = submission_key(user_id, course_id, &assignment.id);
            let stored = storage::load::<AssignmentSubmission>(
                self.store.as_ref(),
                collections::ASSIGNMENT_SUBMISSIONS,
                &key,
            )
            .await?;
            if stored.is_some_and(|s| !s.value.payload.is_empty()) {
                submitted.insert(assignment.id.clone());
            }
        }
        Ok(submitted)
    }

    /// Complete the section if all its items are resolved. Returns whether it is complete.
    async fn settle_section(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        week: &Week,
        section: &Section,
    ) -> Result<bool> {
        let key = section_key(&week.id, &section.id);
        let Some(record) = self.load_record(user_id, course_id).await? else {
            return Ok(false);
        };
        if record.completed_sections.contains(&key) {
            return Ok(true);
        }

        let submitted = self.submitted_blocks(user_id, course_id, section).await?;
        if !auto_completes(section, &record, &submitted, self.config.pass_threshold) {
            return Ok(false);
        }

        self.store
            .modify(
                collections::PROGRESS,
                &progress_key(user_id, course_id),
                &[FieldChange::union("completedSections", key.clone())],
            )
            .await?;
        info!("{} completed section {} of {}", user_id, key, course_id);
        Ok(true)
    }
}

#[async_trait]
impl ProgressTracker for StoreProgressTracker {
    async fn record_quiz_attempt(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        block_id: &BlockId,
        answers: &[usize],
    ) -> Result<QuizResult> {
        let now = self.clock.now();
        self.authorize(user_id, course_id, now).await?;
        let course = self.load_course(course_id).await?;

        let location = course.locate_block(block_id).ok_or_else(|| ProgressError::BlockNotFound {
            course: course_id.clone(),
            block: block_id.clone(),
        })?;
        let ContentBlock::Quiz(quiz) = location.block else {
            return Err(ProgressError::WrongBlockKind {
                block: block_id.clone(),
                expected: "a quiz",
            });
        };

        let (grade, marks) = grade(quiz, answers, self.config.pass_threshold)?;
        let attempt_id = AttemptId::new();

        for (index, (&selected, is_correct)) in answers.iter().zip(marks).enumerate() {
            let answer = QuizAnswer {
                user_id: user_id.clone(),
                course_id: course_id.clone(),
                block_id: block_id.clone(),
                attempt_id,
                question_index: index,
                selected_option: selected,
                is_correct,
                answered_at: now,
            };
            storage::save(
                self.store.as_ref(),
                collections::QUIZ_ANSWERS,
                &answer_key(user_id, course_id, block_id, index),
                &answer,
                Precondition::None,
            )
            .await?;
        }

        let key = self.ensure_record(user_id, course_id, now).await?;
        self.touch(
            &key,
            vec![FieldChange::set(format!("quizScores.{}", block_id), grade.score)],
            now,
        )
        .await?;
        debug!(
            "{} scored {} on {} (attempt {})",
            user_id, grade.score, block_id, attempt_id
        );

        let section_complete = self
            .settle_section(user_id, course_id, location.week, location.section)
            .await?;

        Ok(QuizResult {
            attempt_id,
            score: grade.score,
            passed: grade.passed,
            correct: grade.correct,
            total: grade.total,
            section_complete,
        })
    }

    async fn record_assignment_submission(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        block_id: &BlockId,
        payload: SubmissionPayload,
    ) -> Result<AssignmentSubmission> {
        let now = self.clock.now();
        self.authorize(user_id, course_id, now).await?;
        let course = self.load_course(course_id).await?;

        let location = course.locate_block(block_id).ok_or_else(|| ProgressError::BlockNotFound {
            course: course_id.clone(),
            block: block_id.clone(),
        })?;
        let ContentBlock::Assignment(assignment) = location.block else {
            return Err(ProgressError::WrongBlockKind {
                block: block_id.clone(),
                expected: "an assignment",
            });
        };
        validate_payload(assignment, &payload)?;

        let submission = AssignmentSubmission {
            user_id: user_id.clone(),
            course_id: course_id.clone(),
            block_id: block_id.clone(),
            payload,
            submitted_at: now,
        };
        storage::save(
            self.store.as_ref(),
            collections::ASSIGNMENT_SUBMISSIONS,
            &submission_key(user_id, course_id, block_id),
            &submission,
            Precondition::None,
        )
        .await?;

        let key = self.ensure_record(user_id, course_id, now).await?;
        self.touch(&key, Vec::new(), now).await?;
        debug!("{} submitted {} in {}", user_id, block_id, course_id);

        self.settle_section(user_id, course_id, location.week, location.section)
            .await?;
        Ok(submission)
    }

    async fn mark_section_complete(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        week_id: &WeekId,
        section_id: &SectionId,
    ) -> Result<()> {
        let now = self.clock.now();
        self.authorize(user_id, course_id, now).await?;
        let course = self.load_course(course_id).await?;
        if course.find_section(week_id, section_id).is_none() {
            return Err(ProgressError::SectionNotFound {
                week: week_id.clone(),
                section: section_id.clone(),
            });
        }

        let key = self.ensure_record(user_id, course_id, now).await?;
        self.touch(
            &key,
            vec![FieldChange::union("completedSections", section_key(week_id, section_id))],
            now,
        )
        .await?;
        info!("{} marked {}/{} of {} complete", user_id, week_id, section_id, course_id);
        Ok(())
    }

    async fn get_completion_percentage(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        course: &Course,
    ) -> Result<f64> {
        Ok(self
            .load_record(user_id, course_id)
            .await?
            .map(|r| r.completion_fraction(course))
            .unwrap_or(0.0))
    }

    async fn open_course(&self, user_id: &UserId, course_id: &CourseId) -> Result<ProgressRecord> {
        let now = self.clock.now();
        self.authorize(user_id, course_id, now).await?;
        self.load_course(course_id).await?;

        let key = self.ensure_record(user_id, course_id, now).await?;
        self.touch(&key, Vec::new(), now).await?;
        self.load_record(user_id, course_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(key).into())
    }

    async fn section_status(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        week_id: &WeekId,
        section_id: &SectionId,
    ) -> Result<SectionReport> {
        let course = self.load_course(course_id).await?;
        let section = course
            .find_section(week_id, section_id)
            .ok_or_else(|| ProgressError::SectionNotFound {
                week: week_id.clone(),
                section: section_id.clone(),
            })?;

        let record = self
            .load_record(user_id, course_id)
            .await?
            .unwrap_or_else(|| ProgressRecord::new(user_id.clone(), course_id.clone(), self.clock.now()));
        let submitted = self.submitted_blocks(user_id, course_id, section).await?;

        Ok(SectionReport {
            week_id: week_id.clone(),
            section_id: section_id.clone(),
            complete: record.is_section_complete(week_id, section_id),
            pending_items: pending_items(section, &record, &submitted, self.config.pass_threshold),
        })
    }

    async fn course_report(&self, user_id: &UserId, course_id: &CourseId) -> Result<CourseReport> {
        let course = self.load_course(course_id).await?;
        let record = self.load_record(user_id, course_id).await?;

        Ok(match record {
            Some(record) => CourseReport {
                course_id: course_id.clone(),
                completed_sections: record.completed_in(&course),
                total_sections: course.total_sections(),
                fraction: record.completion_fraction(&course),
                last_accessed_at: Some(record.last_accessed_at),
                quiz_scores: record.quiz_scores,
            },
            None => CourseReport {
                course_id: course_id.clone(),
                completed_sections: 0,
                total_sections: course.total_sections(),
                fraction: 0.0,
                quiz_scores: BTreeMap::new(),
                last_accessed_at: None,
            },
        })
    }
}

/// Check a payload against the assignment's declared submission type.
fn validate_payload(assignment: &Assignment, payload: &SubmissionPayload) -> Result<()> {
    if payload.kind != assignment.submission_type {
        return Err(ProgressError::InvalidSubmission(format!(
            "expected a {} submission, got {}",
            assignment.submission_type.as_str(),
            payload.kind.as_str()
        )));
    }
    if payload.is_empty() {
        return Err(ProgressError::InvalidSubmission("submission is empty".to_string()));
    }
    if payload.kind == SubmissionType::Url {
        let raw = payload.content.trim();
        let web = Url::parse(raw).is_ok_and(|u| {
            matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty())
        });
        if !web {
            return Err(ProgressError::InvalidSubmission(format!("not an http(s) url: {}", raw)));
        }
    }
    Ok(())
}
