//! Quiz grading.

use bootcamp_core::Quiz;
use serde::{Deserialize, Serialize};

use crate::error::{ProgressError, Result};

/// Outcome of grading one quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    /// Score, 0-100
    pub score: u8,
    /// Whether the score reaches the threshold
    pub passed: bool,
    /// Correct answers
    pub correct: usize,
    /// Questions
    pub total: usize,
}

/// Percentage of `correct` out of `total`, rounded half up.
pub fn score(correct: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let correct = correct.min(total);
    ((200 * correct + total) / (2 * total)) as u8
}

/// Passing score of `quiz`, falling back to `default`.
pub fn threshold(quiz: &Quiz, default: u8) -> u8 {
    quiz.passing_score.unwrap_or(default)
}

/// Grade `answers` against `quiz`. Returns the grade and per-question correctness.
///
/// An option index outside the question's options counts as wrong.
pub fn grade(quiz: &Quiz, answers: &[usize], default_threshold: u8) -> Result<(Grade, Vec<bool>)> {
    if quiz.questions.is_empty() {
        return Err(ProgressError::EmptyQuiz(quiz.id.clone()));
    }
    if answers.len() != quiz.questions.len() {
        return Err(ProgressError::AnswerCount {
            expected: quiz.questions.len(),
            actual: answers.len(),
        });
    }

    let marks: Vec<bool> = quiz
        .questions
        .iter()
        .zip(answers)
        .map(|(q, &picked)| picked < q.options.len() && picked == q.correct_index)
        .collect();

    let correct = marks.iter().filter(|m| **m).count();
    let total = marks.len();
    let score = score(correct, total);

    Ok((
        Grade {
            score,
            passed: score >= threshold(quiz, default_threshold),
            correct,
            total,
        },
        marks,
    ))
}
