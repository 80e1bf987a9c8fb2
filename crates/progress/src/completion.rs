//! Section completion rules.
//!
//! A section is Incomplete until it becomes Complete, and never goes back.
//! Sections with quizzes or assignments complete on their own once every
//! one of them is resolved: each quiz has a stored passing score and each
//! assignment has a non-empty submission. Sections without such blocks
//! only complete when marked.

use bootcamp_core::{BlockId, ContentBlock, ProgressRecord, Section};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::grading::threshold;

/// A gradeable block that still holds a section back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingItem {
    /// Quiz without a passing score
    Quiz {
        /// Quiz block
        block_id: BlockId,
        /// Latest score, if attempted
        score: Option<u8>,
        /// Score needed
        needed: u8,
    },
    /// Assignment without a submission
    Assignment {
        /// Assignment block
        block_id: BlockId,
    },
}

impl PendingItem {
    /// Block the item refers to.
    pub fn block_id(&self) -> &BlockId {
        match self {
            PendingItem::Quiz { block_id, .. } | PendingItem::Assignment { block_id } => block_id,
        }
    }
}

/// Unresolved gradeable blocks of `section`.
///
/// `submitted` holds the assignment blocks with a non-empty submission.
pub fn pending_items(
    section: &Section,
    record: &ProgressRecord,
    submitted: &BTreeSet<BlockId>,
    default_threshold: u8,
) -> Vec<PendingItem> {
    section
        .gradeable_blocks()
        .filter_map(|block| match block {
            ContentBlock::Quiz(quiz) => {
                let needed = threshold(quiz, default_threshold);
                let score = record.quiz_scores.get(&quiz.id).copied();
                match score {
                    Some(s) if s >= needed => None,
                    _ => Some(PendingItem::Quiz {
                        block_id: quiz.id.clone(),
                        score,
                        needed,
                    }),
                }
            }
            ContentBlock::Assignment(a) if !submitted.contains(&a.id) => {
                Some(PendingItem::Assignment { block_id: a.id.clone() })
            }
            _ => None,
        })
        .collect()
}

/// Whether `section` may complete without being marked.
pub fn auto_completes(
    section: &Section,
    record: &ProgressRecord,
    submitted: &BTreeSet<BlockId>,
    default_threshold: u8,
) -> bool {
    section.has_gradeable_blocks()
        && pending_items(section, record, submitted, default_threshold).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootcamp_core::{
        Assignment, CourseId, Quiz, QuizQuestion, SectionId, SubmissionType, UserId,
    };
    use chrono::Utc;

    fn bid(id: &str) -> BlockId {
        BlockId::parse(id).unwrap()
    }

    fn section(content: Vec<ContentBlock>) -> Section {
        Section {
            id: SectionId::parse("s1").unwrap(),
            title: "Intro".to_string(),
            content,
        }
    }

    fn quiz(id: &str, passing_score: Option<u8>) -> ContentBlock {
        ContentBlock::Quiz(Quiz {
            id: bid(id),
            questions: vec![QuizQuestion {
                prompt: "?".to_string(),
                options: vec!["a".into(), "b".into()],
                correct_index: 0,
            }],
            passing_score,
        })
    }

    fn assignment(id: &str) -> ContentBlock {
        ContentBlock::Assignment(Assignment {
            id: bid(id),
            prompt: String::new(),
            submission_type: SubmissionType::Text,
            auto_check: false,
        })
    }

    fn record() -> ProgressRecord {
        ProgressRecord::new(
            UserId::parse("u1").unwrap(),
            CourseId::parse("c1").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_reading_only_section_never_auto_completes() {
        let s = section(vec![ContentBlock::Paragraph { text: "hi".into() }]);
        assert!(pending_items(&s, &record(), &BTreeSet::new(), 70).is_empty());
        assert!(!auto_completes(&s, &record(), &BTreeSet::new(), 70));
    }

    #[test]
    fn test_quiz_needs_passing_score() {
        let s = section(vec![quiz("q1", None)]);
        let mut r = record();

        let pending = pending_items(&s, &r, &BTreeSet::new(), 70);
        assert_eq!(
            pending,
            vec![PendingItem::Quiz { block_id: bid("q1"), score: None, needed: 70 }]
        );

        r.quiz_scores.insert(bid("q1"), 69);
        assert!(!auto_completes(&s, &r, &BTreeSet::new(), 70));

        r.quiz_scores.insert(bid("q1"), 70);
        assert!(auto_completes(&s, &r, &BTreeSet::new(), 70));
    }

    #[test]
    fn test_quiz_threshold_is_per_quiz() {
        let s = section(vec![quiz("q1", Some(90))]);
        let mut r = record();
        r.quiz_scores.insert(bid("q1"), 80);
        assert!(!auto_completes(&s, &r, &BTreeSet::new(), 70));
    }

    #[test]
    fn test_mixed_section() {
        let s = section(vec![quiz("q1", None), assignment("hw1")]);
        let mut r = record();
        r.quiz_scores.insert(bid("q1"), 100);

        let pending = pending_items(&s, &r, &BTreeSet::new(), 70);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].block_id(), &bid("hw1"));

        let submitted: BTreeSet<BlockId> = [bid("hw1")].into_iter().collect();
        assert!(auto_completes(&s, &r, &submitted, 70));
    }
}
