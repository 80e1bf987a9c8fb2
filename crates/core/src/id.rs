//! Identifiers for bootcamp entities.
//!
//! Record ids are opaque strings chosen by whoever created the record
//! (signup, course authoring). They are validated whenever they enter the
//! system from user input so that composite document keys and dotted field
//! paths (`enrollments.<courseId>`) stay unambiguous.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use ulid::Ulid;

/// Separator joining ids into composite document keys.
pub const KEY_SEPARATOR: char = '_';

/// Maximum identifier length.
pub const MAX_ID_LEN: usize = 128;

/// Reasons a string is rejected as an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Empty identifier
    #[error("identifier is empty")]
    Empty,

    /// Identifier longer than [`MAX_ID_LEN`]
    #[error("identifier is longer than 128 characters")]
    TooLong,

    /// Identifier contains characters outside the allowed set
    #[error("invalid identifier '{0}': use ASCII letters, digits or '-'")]
    Invalid(String),
}

fn id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-]*$").ok())
        .as_ref()
}

/// Check that `s` can be used as an identifier.
pub fn validate_id(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if s.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    if !id_pattern().is_some_and(|re| re.is_match(s)) {
        return Err(IdError::Invalid(s.to_string()));
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier.
            pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
                let s = s.into();
                validate_id(&s)?;
                Ok(Self(s))
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

string_id! {
    /// Identifier of a learner or staff member
    UserId
}

string_id! {
    /// Identifier of a course
    CourseId
}

string_id! {
    /// Identifier of a cohort
    CohortId
}

string_id! {
    /// Identifier of a week within a course
    WeekId
}

string_id! {
    /// Identifier of a section within a week
    SectionId
}

string_id! {
    /// Identifier of a content block (quiz, assignment, ...)
    BlockId
}

impl CohortId {
    /// Deterministic id of the `sequence`-th cohort of a course.
    ///
    /// Two registries racing to open the same intake compute the same id,
    /// so the store's insert-if-absent settles which one wins. Fails when the
    /// course id is too long to carry the suffix.
    pub fn for_sequence(course_id: &CourseId, sequence: u32) -> Result<Self, IdError> {
        Self::parse(format!("{}-cohort-{}", course_id, sequence))
    }
}

/// Unique identifier for one quiz attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Ulid);

impl AttemptId {
    /// Generate a new AttemptId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for AttemptId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Composite key of a section inside `ProgressRecord::completed_sections`.
pub fn section_key(week_id: &WeekId, section_id: &SectionId) -> String {
    format!("{}{}{}", week_id, KEY_SEPARATOR, section_id)
}

/// Document key of the progress record for a learner in a course.
pub fn progress_key(user_id: &UserId, course_id: &CourseId) -> String {
    format!("{}{}{}", user_id, KEY_SEPARATOR, course_id)
}

/// Document key of the latest assignment submission for a block.
pub fn submission_key(user_id: &UserId, course_id: &CourseId, block_id: &BlockId) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        user_id,
        course_id,
        block_id,
        sep = KEY_SEPARATOR
    )
}

/// Document key of the stored answer to one quiz question.
pub fn answer_key(
    user_id: &UserId,
    course_id: &CourseId,
    block_id: &BlockId,
    question_index: usize,
) -> String {
    format!(
        "{}{sep}q{}",
        submission_key(user_id, course_id, block_id),
        question_index,
        sep = KEY_SEPARATOR
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(UserId::parse("u1").is_ok());
        assert!(CourseId::parse("web-dev-2024").is_ok());
        assert_eq!(CourseId::parse("c1").unwrap().as_str(), "c1");
    }

    #[test]
    fn test_rejected_ids() {
        assert_eq!(UserId::parse(""), Err(IdError::Empty));
        assert!(matches!(UserId::parse("a_b"), Err(IdError::Invalid(_))));
        assert!(matches!(UserId::parse("-lead"), Err(IdError::Invalid(_))));
        assert!(matches!(UserId::parse("a/b"), Err(IdError::Invalid(_))));
        assert!(matches!(UserId::parse("a.b"), Err(IdError::Invalid(_))));
        assert_eq!(UserId::parse("x".repeat(MAX_ID_LEN + 1)), Err(IdError::TooLong));
    }

    #[test]
    fn test_composite_keys() {
        let user = UserId::parse("u1").unwrap();
        let course = CourseId::parse("c1").unwrap();
        let week = WeekId::parse("w1").unwrap();
        let section = SectionId::parse("s2").unwrap();
        let block = BlockId::parse("quiz-1").unwrap();

        assert_eq!(section_key(&week, &section), "w1_s2");
        assert_eq!(progress_key(&user, &course), "u1_c1");
        assert_eq!(submission_key(&user, &course, &block), "u1_c1_quiz-1");
        assert_eq!(answer_key(&user, &course, &block, 3), "u1_c1_quiz-1_q3");
    }

    #[test]
    fn test_cohort_id_is_deterministic() {
        let course = CourseId::parse("c1").unwrap();
        assert_eq!(
            CohortId::for_sequence(&course, 2).unwrap(),
            CohortId::for_sequence(&course, 2).unwrap()
        );
        assert_eq!(CohortId::for_sequence(&course, 2).unwrap().as_str(), "c1-cohort-2");
    }

    #[test]
    fn test_cohort_id_respects_length_limit() {
        let longest = CourseId::parse("c".repeat(MAX_ID_LEN)).unwrap();
        assert_eq!(CohortId::for_sequence(&longest, 1), Err(IdError::TooLong));

        let fits = CourseId::parse("c".repeat(MAX_ID_LEN - "-cohort-1".len())).unwrap();
        assert_eq!(CohortId::for_sequence(&fits, 1).unwrap().as_str().len(), MAX_ID_LEN);
    }

    #[test]
    fn test_ids_serialize_as_strings() {
        let user = UserId::parse("u1").unwrap();
        assert_eq!(serde_json::to_string(&user).unwrap(), "\"u1\"");
        let back: UserId = serde_json::from_str("\"u1\"").unwrap();
        assert_eq!(back, user);

        assert!(serde_json::from_str::<CourseId>("\"bad.id\"").is_err());
    }
}
