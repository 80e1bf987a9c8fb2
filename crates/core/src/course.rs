//! Course model - curriculum authored by teachers.
//!
//! A course is an ordered list of weeks, each an ordered list of sections.
//! A section holds a heterogeneous list of [`ContentBlock`]s; only quiz and
//! assignment blocks take part in completion tracking.

use serde::{Deserialize, Serialize};
use crate::id::{section_key, BlockId, CourseId, SectionId, WeekId};

/// A course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Unique identifier
    pub id: CourseId,

    /// Course title
    pub title: String,

    /// Whether new cohorts may be opened
    #[serde(default = "default_true")]
    pub is_open: bool,

    /// Declared length of one cohort run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_weeks: Option<u32>,

    /// Curriculum
    #[serde(default)]
    pub weeks: Vec<Week>,
}

fn default_true() -> bool {
    true
}

impl Course {
    /// Number of sections across every week.
    pub fn total_sections(&self) -> usize {
        self.weeks.iter().map(|w| w.sections.len()).sum()
    }

    /// Find a section by week and section id.
    pub fn find_section(&self, week_id: &WeekId, section_id: &SectionId) -> Option<&Section> {
        self.weeks
            .iter()
            .find(|w| &w.id == week_id)?
            .sections
            .iter()
            .find(|s| &s.id == section_id)
    }

    /// Locate the week and section that own a content block.
    pub fn locate_block(&self, block_id: &BlockId) -> Option<BlockLocation<'_>> {
        for week in &self.weeks {
            for section in &week.sections {
                if let Some(block) = section.block(block_id) {
                    return Some(BlockLocation { week, section, block });
                }
            }
        }
        None
    }

    /// Composite keys of every section, in curriculum order.
    pub fn section_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.weeks
            .iter()
            .flat_map(|w| w.sections.iter().map(move |s| section_key(&w.id, &s.id)))
    }
}

/// Where a content block lives inside a course.
#[derive(Debug, Clone, Copy)]
pub struct BlockLocation<'a> {
    /// Owning week
    pub week: &'a Week,
    /// Owning section
    pub section: &'a Section,
    /// The block itself
    pub block: &'a ContentBlock,
}

/// One week of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Week {
    /// Unique identifier within the course
    pub id: WeekId,

    /// Week title
    pub title: String,

    /// Ordered sections
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// The smallest navigable unit of course content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Unique identifier within the week
    pub id: SectionId,

    /// Section title
    pub title: String,

    /// Ordered content
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl Section {
    /// Find a block in this section by id.
    pub fn block(&self, block_id: &BlockId) -> Option<&ContentBlock> {
        self.content.iter().find(|b| b.id() == Some(block_id))
    }

    /// Blocks that must be resolved before the section completes on its own.
    pub fn gradeable_blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content.iter().filter(|b| b.is_gradeable())
    }

    /// Whether the section has any quiz or assignment.
    pub fn has_gradeable_blocks(&self) -> bool {
        self.gradeable_blocks().next().is_some()
    }
}

/// A renderable or gradeable item inside a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Section heading
    Heading {
        /// Heading text
        text: String,
    },

    /// Prose
    Paragraph {
        /// Paragraph text
        text: String,
    },

    /// Embedded video
    Video {
        /// Video location
        url: String,
    },

    /// Bullet list
    List {
        /// One entry per bullet
        items: Vec<String>,
    },

    /// External link
    Link {
        /// Target
        url: String,
        /// Link text
        label: String,
    },

    /// Multiple-choice quiz
    Quiz(Quiz),

    /// Graded assignment
    Assignment(Assignment),

    /// Image
    Image {
        /// Image location
        url: String,
        /// Alternative text
        #[serde(default)]
        alt: String,
    },

    /// Code sample
    Code {
        /// Language used for highlighting
        language: String,
        /// Code text
        source: String,
    },
}

impl ContentBlock {
    /// Id of a gradeable block. Presentational blocks carry none.
    pub fn id(&self) -> Option<&BlockId> {
        match self {
            ContentBlock::Quiz(q) => Some(&q.id),
            ContentBlock::Assignment(a) => Some(&a.id),
            ContentBlock::Heading { .. }
            | ContentBlock::Paragraph { .. }
            | ContentBlock::Video { .. }
            | ContentBlock::List { .. }
            | ContentBlock::Link { .. }
            | ContentBlock::Image { .. }
            | ContentBlock::Code { .. } => None,
        }
    }

    /// Whether the block takes part in section completion.
    pub fn is_gradeable(&self) -> bool {
        matches!(self, ContentBlock::Quiz(_) | ContentBlock::Assignment(_))
    }
}

/// A multiple-choice quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    /// Block id
    pub id: BlockId,

    /// Ordered questions
    pub questions: Vec<QuizQuestion>,

    /// Score needed to pass, overriding the platform threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passing_score: Option<u8>,
}

/// A quiz question with a single correct option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    /// Question text
    pub prompt: String,

    /// Answer options
    pub options: Vec<String>,

    /// Index into `options` of the correct answer
    pub correct_index: usize,
}

/// A graded assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Block id
    pub id: BlockId,

    /// Instructions shown to the learner
    #[serde(default)]
    pub prompt: String,

    /// Expected form of the submission
    pub submission_type: SubmissionType,

    /// Whether submissions run through the automated code check
    #[serde(default)]
    pub auto_check: bool,
}

/// Form of an assignment submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    /// Free text
    Text,
    /// Uploaded file reference
    File,
    /// Link to hosted work
    Url,
}

impl SubmissionType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::Text => "text",
            SubmissionType::File => "file",
            SubmissionType::Url => "url",
        }
    }
}

impl std::str::FromStr for SubmissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(SubmissionType::Text),
            "file" => Ok(SubmissionType::File),
            "url" => Ok(SubmissionType::Url),
            other => Err(format!("unknown submission type: {}", other)),
        }
    }
}
