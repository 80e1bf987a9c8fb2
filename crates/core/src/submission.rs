//! Learner submissions: quiz answers and assignment hand-ins.

use serde::{Deserialize, Serialize};
use crate::course::SubmissionType;
use crate::id::{AttemptId, BlockId, CourseId, UserId};
use crate::Time;

/// The learner's answer to one quiz question in the latest attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswer {
    /// Learner
    pub user_id: UserId,

    /// Course
    pub course_id: CourseId,

    /// Quiz block
    pub block_id: BlockId,

    /// Attempt this answer belongs to
    pub attempt_id: AttemptId,

    /// Position of the question in the quiz
    pub question_index: usize,

    /// Option the learner picked
    pub selected_option: usize,

    /// Whether the pick was right
    pub is_correct: bool,

    /// When answered
    pub answered_at: Time,
}

/// What the learner handed in for an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    /// Kind of content
    #[serde(rename = "type")]
    pub kind: SubmissionType,

    /// Text, file reference or URL
    pub content: String,
}

impl SubmissionPayload {
    /// Build a payload.
    pub fn new(kind: SubmissionType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    /// Whether the payload carries anything beyond whitespace.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// The latest assignment submission for one block. Resubmitting overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSubmission {
    /// Learner
    pub user_id: UserId,

    /// Course
    pub course_id: CourseId,

    /// Assignment block
    pub block_id: BlockId,

    /// Submitted content
    pub payload: SubmissionPayload,

    /// When submitted
    pub submitted_at: Time,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_payload_is_empty() {
        assert!(SubmissionPayload::new(SubmissionType::Text, "  \n").is_empty());
        assert!(!SubmissionPayload::new(SubmissionType::Text, "answer").is_empty());
    }

    #[test]
    fn test_payload_uses_type_tag() {
        let payload = SubmissionPayload::new(SubmissionType::Url, "https://example.com");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "url");
        assert_eq!(json["content"], "https://example.com");
    }
}
