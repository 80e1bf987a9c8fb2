//! Cohort registry - places a course's learners into time-boxed cohorts.

use bootcamp_core::{collections, Cohort, CohortId, Course, CourseId, Time, UserId};
use bootcamp_storage::{self as storage, DocumentStore, FieldChange, Filter, Precondition, StorageError};
use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::EnrollmentConfig;
use crate::error::{EnrollmentError, Result};

/// Finds or opens cohorts and maintains their membership.
#[derive(Clone)]
pub struct CohortRegistry {
    store: Arc<dyn DocumentStore>,
    config: EnrollmentConfig,
}

impl CohortRegistry {
    /// Create a registry with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: EnrollmentConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EnrollmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Return the open cohort of a course at `reference`, opening one if needed.
    ///
    /// Of several open cohorts with free seats the newest wins. Calling this
    /// twice with nothing changing in between returns the same cohort.
    pub async fn find_or_create_cohort(&self, course_id: &CourseId, reference: Time) -> Result<Cohort> {
        self.find_or_open(course_id, reference, None).await
    }

    /// Like [`find_or_create_cohort`](Self::find_or_create_cohort) but only
    /// matches, or opens, a cohort starting at `start`.
    pub async fn find_or_create_cohort_starting(
        &self,
        course_id: &CourseId,
        reference: Time,
        start: Time,
    ) -> Result<Cohort> {
        self.find_or_open(course_id, reference, Some(start)).await
    }

    async fn find_or_open(&self, course_id: &CourseId, reference: Time, start: Option<Time>) -> Result<Cohort> {
        let course = storage::load::<Course>(self.store.as_ref(), collections::COURSES, course_id.as_str())
            .await?
            .ok_or_else(|| EnrollmentError::CourseNotFound(course_id.clone()))?
            .value;

        let cohorts = self.list_cohorts(course_id).await?;
        let open = cohorts
            .iter()
            .rev()
            .filter(|c| start.map_or(true, |s| c.start_date == s))
            .find(|c| c.is_open_at(reference) && c.has_room());
        if let Some(cohort) = open {
            debug!("Course {} has open cohort {}", course_id, cohort.id);
            return Ok(cohort.clone());
        }

        if !course.is_open {
            return Err(EnrollmentError::CourseClosed(course_id.clone()));
        }

        let sequence = cohorts.iter().map(|c| c.sequence).max().unwrap_or(0) + 1;
        let start_date = start.unwrap_or_else(|| self.config.intake.start_for(reference));
        let weeks = course.duration_weeks.unwrap_or(self.config.default_duration_weeks);
        let invalid = |reason: String| EnrollmentError::InvalidCourse {
            course: course_id.clone(),
            reason,
        };
        let id = CohortId::for_sequence(course_id, sequence).map_err(|e| invalid(e.to_string()))?;
        let end_date = Duration::try_weeks(i64::from(weeks))
            .and_then(|d| start_date.checked_add_signed(d))
            .ok_or_else(|| invalid(format!("duration of {} weeks is out of range", weeks)))?;
        let cohort = Cohort {
            id,
            course_id: course_id.clone(),
            sequence,
            name: format!("{} - Cohort {}", course.title, sequence),
            start_date,
            end_date,
            student_ids: BTreeSet::new(),
            capacity: self.config.cohort_capacity,
            created_at: reference,
        };

        match storage::save(
            self.store.as_ref(),
            collections::COHORTS,
            cohort.id.as_str(),
            &cohort,
            Precondition::Absent,
        )
        .await
        {
            Ok(_) => {
                info!("Opened cohort {} for course {}", cohort.id, course_id);
                Ok(cohort)
            }
            Err(StorageError::Conflict(_)) => {
                // Another registry opened the same intake first.
                debug!("Cohort {} was opened concurrently", cohort.id);
                self.get_cohort(&cohort.id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load a cohort.
    pub async fn get_cohort(&self, cohort_id: &CohortId) -> Result<Cohort> {
        storage::load::<Cohort>(self.store.as_ref(), collections::COHORTS, cohort_id.as_str())
            .await?
            .map(|v| v.value)
            .ok_or_else(|| EnrollmentError::CohortNotFound(cohort_id.clone()))
    }

    /// All cohorts of a course, oldest first.
    pub async fn list_cohorts(&self, course_id: &CourseId) -> Result<Vec<Cohort>> {
        let mut cohorts: Vec<Cohort> = storage::load_all(
            self.store.as_ref(),
            collections::COHORTS,
            &Filter::eq("courseId", course_id.as_str()),
        )
        .await?;
        cohorts.sort_by_key(|c| c.sequence);
        Ok(cohorts)
    }

    /// The newest cohort of a course, open at `reference`, that already lists the user.
    pub async fn find_membership(
        &self,
        course_id: &CourseId,
        user_id: &UserId,
        reference: Time,
    ) -> Result<Option<Cohort>> {
        let filter = Filter::And(vec![
            Filter::eq("courseId", course_id.as_str()),
            Filter::contains("studentIds", user_id.as_str()),
        ]);
        let mut cohorts: Vec<Cohort> =
            storage::load_all(self.store.as_ref(), collections::COHORTS, &filter).await?;
        cohorts.sort_by_key(|c| c.sequence);
        Ok(cohorts.into_iter().rev().find(|c| c.is_open_at(reference)))
    }

    /// Add a learner to a cohort. Adding an existing member is a no-op.
    pub async fn add_student_to_cohort(&self, cohort_id: &CohortId, user_id: &UserId) -> Result<()> {
        self.join(cohort_id, user_id).await.map(|_| ())
    }

    /// Add a learner, returning whether they were newly added.
    ///
    /// Capacity is re-checked against the version the write replaces, so
    /// concurrent joins cannot overfill a cohort.
    pub(crate) async fn join(&self, cohort_id: &CohortId, user_id: &UserId) -> Result<bool> {
        for _ in 0..self.config.max_write_attempts {
            let current =
                storage::load::<Cohort>(self.store.as_ref(), collections::COHORTS, cohort_id.as_str())
                    .await?
                    .ok_or_else(|| EnrollmentError::CohortNotFound(cohort_id.clone()))?;

            let mut cohort = current.value;
            if cohort.student_ids.contains(user_id) {
                return Ok(false);
            }
            if !cohort.has_room() {
                return Err(EnrollmentError::CohortFull(cohort_id.clone()));
            }
            cohort.student_ids.insert(user_id.clone());

            match storage::save(
                self.store.as_ref(),
                collections::COHORTS,
                cohort_id.as_str(),
                &cohort,
                Precondition::Version(current.version),
            )
            .await
            {
                Ok(_) => {
                    debug!("Added {} to cohort {}", user_id, cohort_id);
                    return Ok(true);
                }
                Err(StorageError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EnrollmentError::Contention(format!("cohort {}", cohort_id)))
    }

    /// Take a learner out of a cohort.
    ///
    /// Only used to undo a join that lost the enrollment-cap race; `unenroll`
    /// keeps the learner's seat.
    pub(crate) async fn remove_student_from_cohort(&self, cohort_id: &CohortId, user_id: &UserId) -> Result<()> {
        self.store
            .modify(
                collections::COHORTS,
                cohort_id.as_str(),
                &[FieldChange::remove("studentIds", user_id.as_str())],
            )
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => EnrollmentError::CohortNotFound(cohort_id.clone()),
                other => other.into(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakePolicy;
    use bootcamp_storage::MemoryStorage;
    use chrono::{TimeZone, Utc, Weekday};

    fn t0() -> Time {
        Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap()
    }

    fn course_id(id: &str) -> CourseId {
        CourseId::parse(id).unwrap()
    }

    fn user_id(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    async fn store_with_course(is_open: bool, duration_weeks: Option<u32>) -> Arc<dyn DocumentStore> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStorage::new());
        let course = Course {
            id: course_id("c1"),
            title: "Web Dev".to_string(),
            is_open,
            duration_weeks,
            weeks: vec![],
        };
        storage::save(store.as_ref(), collections::COURSES, "c1", &course, Precondition::None)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_creates_first_cohort() {
        let store = store_with_course(true, Some(10)).await;
        let registry = CohortRegistry::new(store);

        let cohort = registry.find_or_create_cohort(&course_id("c1"), t0()).await.unwrap();
        assert_eq!(cohort.id.as_str(), "c1-cohort-1");
        assert_eq!(cohort.name, "Web Dev - Cohort 1");
        assert_eq!(cohort.start_date, t0());
        assert_eq!(cohort.end_date, t0() + Duration::weeks(10));
        assert!(cohort.student_ids.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_is_idempotent() {
        let store = store_with_course(true, None).await;
        let registry = CohortRegistry::new(store);

        let first = registry.find_or_create_cohort(&course_id("c1"), t0()).await.unwrap();
        let second = registry.find_or_create_cohort(&course_id("c1"), t0()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(registry.list_cohorts(&course_id("c1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_open_one_cohort() {
        let store = store_with_course(true, None).await;
        let a = CohortRegistry::new(store.clone());
        let b = CohortRegistry::new(store);
        let c1 = course_id("c1");

        let (x, y) = tokio::join!(
            a.find_or_create_cohort(&c1, t0()),
            b.find_or_create_cohort(&c1, t0())
        );
        assert_eq!(x.unwrap().id, y.unwrap().id);
        assert_eq!(a.list_cohorts(&c1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_cohort_rolls_over() {
        let store = store_with_course(true, Some(4)).await;
        let registry = CohortRegistry::new(store);
        let c1 = course_id("c1");

        let first = registry.find_or_create_cohort(&c1, t0()).await.unwrap();
        let later = t0() + Duration::weeks(5);
        let second = registry.find_or_create_cohort(&c1, later).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.name, "Web Dev - Cohort 2");
    }

    #[tokio::test]
    async fn test_full_cohort_rolls_over() {
        let store = store_with_course(true, None).await;
        let config = EnrollmentConfig {
            cohort_capacity: Some(1),
            ..Default::default()
        };
        let registry = CohortRegistry::new(store).with_config(config);
        let c1 = course_id("c1");

        let first = registry.find_or_create_cohort(&c1, t0()).await.unwrap();
        registry.add_student_to_cohort(&first.id, &user_id("u1")).await.unwrap();

        let err = registry.add_student_to_cohort(&first.id, &user_id("u2")).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::CohortFull(_)));

        let second = registry.find_or_create_cohort(&c1, t0()).await.unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.capacity, Some(1));
    }

    #[tokio::test]
    async fn test_absurd_duration_is_rejected() {
        let store = store_with_course(true, Some(u32::MAX)).await;
        let registry = CohortRegistry::new(store);
        let c1 = course_id("c1");

        let err = registry.find_or_create_cohort(&c1, t0()).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::InvalidCourse { ref course, .. } if *course == c1));
        assert!(registry.list_cohorts(&c1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_longest_course_id_cannot_open_unreadable_cohort() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStorage::new());
        let long = course_id(&"c".repeat(bootcamp_core::MAX_ID_LEN));
        let course = Course {
            id: long.clone(),
            title: "Long".to_string(),
            is_open: true,
            duration_weeks: None,
            weeks: vec![],
        };
        storage::save(store.as_ref(), collections::COURSES, long.as_str(), &course, Precondition::None)
            .await
            .unwrap();
        let registry = CohortRegistry::new(store);

        for _ in 0..2 {
            let err = registry.find_or_create_cohort(&long, t0()).await.unwrap_err();
            assert!(matches!(err, EnrollmentError::InvalidCourse { .. }));
        }
        assert!(registry.list_cohorts(&long).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_student_is_idempotent() {
        let store = store_with_course(true, None).await;
        let registry = CohortRegistry::new(store);
        let cohort = registry.find_or_create_cohort(&course_id("c1"), t0()).await.unwrap();

        registry.add_student_to_cohort(&cohort.id, &user_id("u1")).await.unwrap();
        registry.add_student_to_cohort(&cohort.id, &user_id("u1")).await.unwrap();

        let stored = registry.get_cohort(&cohort.id).await.unwrap();
        assert_eq!(stored.student_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = store_with_course(true, None).await;
        let registry = CohortRegistry::new(store);

        let err = registry.find_or_create_cohort(&course_id("nope"), t0()).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::CourseNotFound(_)));

        let ghost = CohortId::parse("ghost").unwrap();
        let err = registry.add_student_to_cohort(&ghost, &user_id("u1")).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::CohortNotFound(_)));
    }

    #[tokio::test]
    async fn test_closed_course_keeps_open_cohorts() {
        let store = store_with_course(true, Some(4)).await;
        let registry = CohortRegistry::new(store.clone());
        let c1 = course_id("c1");
        let first = registry.find_or_create_cohort(&c1, t0()).await.unwrap();

        store
            .update(
                collections::COURSES,
                "c1",
                serde_json::json!({ "isOpen": false }).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let again = registry.find_or_create_cohort(&c1, t0()).await.unwrap();
        assert_eq!(again.id, first.id);

        let err = registry
            .find_or_create_cohort(&c1, t0() + Duration::weeks(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::CourseClosed(_)));
    }

    #[tokio::test]
    async fn test_explicit_and_scheduled_start() {
        let store = store_with_course(true, None).await;
        let config = EnrollmentConfig {
            intake: IntakePolicy::NextWeekday { weekday: Weekday::Mon },
            ..Default::default()
        };
        let registry = CohortRegistry::new(store).with_config(config);
        let c1 = course_id("c1");

        let scheduled = registry.find_or_create_cohort(&c1, t0()).await.unwrap();
        assert_eq!(scheduled.start_date, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());

        let start = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let explicit = registry.find_or_create_cohort_starting(&c1, t0(), start).await.unwrap();
        assert_eq!(explicit.start_date, start);
        assert_eq!(explicit.sequence, 2);

        let same = registry.find_or_create_cohort_starting(&c1, t0(), start).await.unwrap();
        assert_eq!(same.id, explicit.id);
    }

    #[tokio::test]
    async fn test_find_membership() {
        let store = store_with_course(true, Some(4)).await;
        let registry = CohortRegistry::new(store);
        let c1 = course_id("c1");
        let cohort = registry.find_or_create_cohort(&c1, t0()).await.unwrap();
        registry.add_student_to_cohort(&cohort.id, &user_id("u1")).await.unwrap();

        let found = registry.find_membership(&c1, &user_id("u1"), t0()).await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(cohort.id.clone()));
        assert!(registry.find_membership(&c1, &user_id("u2"), t0()).await.unwrap().is_none());
        assert!(registry
            .find_membership(&c1, &user_id("u1"), t0() + Duration::weeks(5))
            .await
            .unwrap()
            .is_none());

        registry.remove_student_from_cohort(&cohort.id, &user_id("u1")).await.unwrap();
        assert!(registry.get_cohort(&cohort.id).await.unwrap().student_ids.is_empty());
    }
}
