//! User model - learners and staff.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use crate::id::{CohortId, CourseId, UserId};
use crate::Time;

/// A learner or staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier
    pub id: UserId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Access role
    #[serde(default)]
    pub role: Role,

    /// Courses the user is enrolled in (at most two)
    #[serde(default)]
    pub enrolled_courses: BTreeSet<CourseId>,

    /// Cohort the user was placed in, per enrolled course
    #[serde(default)]
    pub enrollments: BTreeMap<CourseId, CohortId>,

    /// Paid access window, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,

    /// Signup time
    pub created_at: Time,
}

impl User {
    /// Create a user with no enrollments and no subscription.
    pub fn new(id: UserId, name: impl Into<String>, role: Role, now: Time) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            enrolled_courses: BTreeSet::new(),
            enrollments: BTreeMap::new(),
            subscription: None,
            created_at: now,
        }
    }

    /// Whether the user is enrolled in `course_id`.
    pub fn is_enrolled(&self, course_id: &CourseId) -> bool {
        self.enrolled_courses.contains(course_id)
    }

    /// Whether the subscription window is still running at `now`.
    pub fn has_active_subscription(&self, now: Time) -> bool {
        self.subscription
            .as_ref()
            .map(|s| s.end_date > now)
            .unwrap_or(false)
    }
}

/// Access role stored on the user document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Learner
    #[default]
    Student,
    /// Course author
    Teacher,
    /// Platform administrator
    Admin,
}

impl Role {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A paid access window, written by the payment flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Status as reported by the payment flow
    pub status: SubscriptionStatus,

    /// Start of the paid window
    pub start_date: Time,

    /// End of the paid window (exclusive)
    pub end_date: Time,

    /// Plan name
    pub plan: String,
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and running
    Active,
    /// Cancelled, runs until the end date
    Cancelled,
    /// Past the end date
    Expired,
}
