//! Enrollment service - gates and performs course enrollment.
//!
//! An enrollment touches two documents: the learner is added to a cohort,
//! then the course and cohort are recorded on the user. The user write is
//! conditional on the version it was read at and re-checks the course cap,
//! so concurrent enrollments cannot push a learner past the limit. Every
//! step is idempotent; calling `enroll` again finishes an enrollment that
//! stopped partway.

use bootcamp_core::{
    collections, Clock, Cohort, CohortSummary, Course, CourseId, User, UserId,
};
use bootcamp_storage::{self as storage, DocumentStore, FieldChange, Precondition, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cohort::CohortRegistry;
use crate::config::EnrollmentConfig;
use crate::error::{EnrollStep, EnrollmentError, Result};

/// Why an enrollment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentReason {
    /// The learner already takes the course
    AlreadyEnrolled,
    /// The learner reached the course cap
    MaxCoursesReached,
}

impl EnrollmentReason {
    /// Wire name of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentReason::AlreadyEnrolled => "already_enrolled",
            EnrollmentReason::MaxCoursesReached => "max_courses_reached",
        }
    }
}

impl fmt::Display for EnrollmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to "may this learner enroll in this course?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCheck {
    /// Whether enrollment is allowed
    pub can_enroll: bool,
    /// Why not, when refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EnrollmentReason>,
    /// Courses the learner takes now
    pub enrolled_courses: BTreeSet<CourseId>,
}

/// Result of [`EnrollmentService::enroll`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollOutcome {
    /// Whether every step completed
    pub success: bool,
    /// Cohort the learner was placed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort: Option<CohortSummary>,
    /// What went wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`EnrollmentService::unenroll`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnenrollOutcome {
    /// Whether the course was dropped
    pub success: bool,
    /// What went wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One line of a learner's enrollment summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledCourse {
    /// Course id
    pub course_id: CourseId,
    /// Course title, if the course still exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Cohort the learner is mapped to, if it still exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort: Option<CohortSummary>,
}

/// Enrollment service.
pub struct EnrollmentService {
    store: Arc<dyn DocumentStore>,
    cohorts: CohortRegistry,
    clock: Arc<dyn Clock>,
    config: EnrollmentConfig,
}

impl EnrollmentService {
    /// Create a service with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cohorts: CohortRegistry::new(store.clone()),
            store,
            clock,
            config: EnrollmentConfig::default(),
        }
    }

    /// Set the configuration. The cohort registry shares it.
    pub fn with_config(mut self, config: EnrollmentConfig) -> Self {
        self.cohorts = CohortRegistry::new(self.store.clone()).with_config(config.clone());
        self.config = config;
        self
    }

    /// The cohort registry used for placement.
    pub fn cohorts(&self) -> &CohortRegistry {
        &self.cohorts
    }

    async fn load_user(&self, user_id: &UserId) -> Result<storage::Versioned<User>> {
        storage::load::<User>(self.store.as_ref(), collections::USERS, user_id.as_str())
            .await?
            .ok_or_else(|| EnrollmentError::UserNotFound(user_id.clone()))
    }

    /// Decide whether `user_id` may enroll in `course_id`. Read-only.
    pub async fn can_enroll(&self, user_id: &UserId, course_id: &CourseId) -> Result<EnrollmentCheck> {
        let user = self.load_user(user_id).await?.value;
        let reason = self.refusal(&user, course_id);
        debug!("Enrollment check {} -> {}: {:?}", user_id, course_id, reason);

        Ok(EnrollmentCheck {
            can_enroll: reason.is_none(),
            reason,
            enrolled_courses: user.enrolled_courses,
        })
    }

    fn refusal(&self, user: &User, course_id: &CourseId) -> Option<EnrollmentReason> {
        if user.is_enrolled(course_id) {
            Some(EnrollmentReason::AlreadyEnrolled)
        } else if user.enrolled_courses.len() >= self.config.max_enrollments {
            Some(EnrollmentReason::MaxCoursesReached)
        } else {
            None
        }
    }

    /// Enroll a learner, reporting failure as a value.
    pub async fn enroll(&self, user_id: &UserId, course_id: &CourseId) -> EnrollOutcome {
        match self.try_enroll(user_id, course_id).await {
            Ok(cohort) => EnrollOutcome {
                success: true,
                cohort: Some(cohort),
                error: None,
            },
            Err(e) => {
                warn!("Enrollment of {} in {} failed: {}", user_id, course_id, e);
                EnrollOutcome {
                    success: false,
                    cohort: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Enroll a learner and return the cohort they were placed in.
    ///
    /// A learner who is already fully enrolled gets their cohort back with
    /// no writes. Failures after the cohort was joined come back as
    /// [`EnrollmentError::PartialFailure`]; earlier steps stay applied.
    pub async fn try_enroll(&self, user_id: &UserId, course_id: &CourseId) -> Result<CohortSummary> {
        let now = self.clock.now();
        let user = self.load_user(user_id).await?.value;

        if user.is_enrolled(course_id) {
            if let Some(cohort) = self.mapped_cohort(&user, course_id).await? {
                debug!("{} already enrolled in {} ({})", user_id, course_id, cohort.id);
                return Ok(cohort.summary());
            }
            debug!("{} is enrolled in {} without a cohort seat, repairing", user_id, course_id);
        } else if user.enrolled_courses.len() >= self.config.max_enrollments {
            return Err(EnrollmentError::Rejected(EnrollmentReason::MaxCoursesReached));
        }

        // A seat left over from an earlier attempt or enrollment is reused.
        let cohort = match self.cohorts.find_membership(course_id, user_id, now).await? {
            Some(cohort) => cohort,
            None => self.cohorts.find_or_create_cohort(course_id, now).await?,
        };

        let (cohort, joined) = self
            .take_seat(cohort, user_id)
            .await
            .map_err(|e| e.during(EnrollStep::JoinCohort))?;

        if let Err(e) = self.record_enrollment(user_id, course_id, &cohort).await {
            if matches!(e, EnrollmentError::Rejected(_)) && joined {
                self.release_seat(&cohort, user_id).await;
            }
            return Err(e.during(EnrollStep::RecordEnrollment));
        }

        info!("Enrolled {} in {} ({})", user_id, course_id, cohort.id);
        Ok(cohort.summary())
    }

    /// Cohort mapped for the course, if it exists and lists the learner.
    async fn mapped_cohort(&self, user: &User, course_id: &CourseId) -> Result<Option<Cohort>> {
        let Some(cohort_id) = user.enrollments.get(course_id) else {
            return Ok(None);
        };
        match self.cohorts.get_cohort(cohort_id).await {
            Ok(cohort) if cohort.student_ids.contains(&user.id) => Ok(Some(cohort)),
            Ok(_) | Err(EnrollmentError::CohortNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Join `cohort`, moving on to the next cohort whenever it fills up first.
    async fn take_seat(&self, mut cohort: Cohort, user_id: &UserId) -> Result<(Cohort, bool)> {
        for _ in 0..self.config.max_write_attempts {
            match self.cohorts.join(&cohort.id, user_id).await {
                Ok(joined) => return Ok((cohort, joined)),
                Err(EnrollmentError::CohortFull(full)) => {
                    debug!("Cohort {} filled up, looking for the next one", full);
                    cohort = self
                        .cohorts
                        .find_or_create_cohort(&cohort.course_id, self.clock.now())
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
        Err(EnrollmentError::Contention(format!("seats of course {}", cohort.course_id)))
    }

    /// Write course and cohort onto the user, re-checking the cap against
    /// the version being replaced.
    async fn record_enrollment(&self, user_id: &UserId, course_id: &CourseId, cohort: &Cohort) -> Result<()> {
        for _ in 0..self.config.max_write_attempts {
            let current = self.load_user(user_id).await?;
            let mut user = current.value;

            if user.is_enrolled(course_id) {
                if user.enrollments.get(course_id) == Some(&cohort.id) {
                    return Ok(());
                }
            } else if user.enrolled_courses.len() >= self.config.max_enrollments {
                return Err(EnrollmentError::Rejected(EnrollmentReason::MaxCoursesReached));
            }

            user.enrolled_courses.insert(course_id.clone());
            user.enrollments.insert(course_id.clone(), cohort.id.clone());

            match storage::save(
                self.store.as_ref(),
                collections::USERS,
                user_id.as_str(),
                &user,
                Precondition::Version(current.version),
            )
            .await
            {
                Ok(_) => return Ok(()),
                Err(StorageError::Conflict(_)) => {
                    debug!("User {} changed under enrollment, retrying", user_id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EnrollmentError::Contention(format!("user {}", user_id)))
    }

    async fn release_seat(&self, cohort: &Cohort, user_id: &UserId) {
        if let Err(e) = self.cohorts.remove_student_from_cohort(&cohort.id, user_id).await {
            warn!("Could not release seat of {} in {}: {}", user_id, cohort.id, e);
        }
    }

    /// Drop a course, reporting failure as a value.
    pub async fn unenroll(&self, user_id: &UserId, course_id: &CourseId) -> UnenrollOutcome {
        match self.try_unenroll(user_id, course_id).await {
            Ok(()) => UnenrollOutcome {
                success: true,
                error: None,
            },
            Err(e) => {
                warn!("Unenrollment of {} from {} failed: {}", user_id, course_id, e);
                UnenrollOutcome {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Remove the course and its cohort mapping from the user.
    ///
    /// The learner keeps their place in the cohort, so re-enrolling while
    /// the cohort is open puts them back into it.
    pub async fn try_unenroll(&self, user_id: &UserId, course_id: &CourseId) -> Result<()> {
        self.store
            .modify(
                collections::USERS,
                user_id.as_str(),
                &[
                    FieldChange::remove("enrolledCourses", course_id.as_str()),
                    FieldChange::delete(format!("enrollments.{}", course_id)),
                ],
            )
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => EnrollmentError::UserNotFound(user_id.clone()),
                other => other.into(),
            })?;

        info!("Unenrolled {} from {}", user_id, course_id);
        Ok(())
    }

    /// Every course the learner takes, with its title and cohort.
    pub async fn enrollment_summary(&self, user_id: &UserId) -> Result<Vec<EnrolledCourse>> {
        let user = self.load_user(user_id).await?.value;

        let mut lines = Vec::with_capacity(user.enrolled_courses.len());
        for course_id in &user.enrolled_courses {
            let title = storage::load::<Course>(self.store.as_ref(), collections::COURSES, course_id.as_str())
                .await?
                .map(|c| c.value.title);
            let cohort = match user.enrollments.get(course_id) {
                Some(cohort_id) => match self.cohorts.get_cohort(cohort_id).await {
                    Ok(cohort) => Some(cohort.summary()),
                    Err(EnrollmentError::CohortNotFound(_)) => None,
                    Err(e) => return Err(e),
                },
                None => None,
            };
            lines.push(EnrolledCourse {
                course_id: course_id.clone(),
                title,
                cohort,
            });
        }
        Ok(lines)
    }
}
