//! Bootcamp CLI - enrollment, cohorts and course progress.

mod config;

use anyhow::{bail, Context, Result};
use bootcamp_core::{
    collections, BlockId, Clock, ContentBlock, Course, CourseId, Role, SectionId, Subscription,
    SubscriptionStatus, SubmissionPayload, SubmissionType, SystemClock, Time, User, UserId, WeekId,
};
use bootcamp_enrollment::EnrollmentService;
use bootcamp_progress::{PendingItem, ProgressTracker, StoreProgressTracker};
use bootcamp_storage::{self as storage, DocumentStore, JsonStorage, Precondition};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::PlatformConfig;

#[derive(Parser)]
#[command(name = "bootcamp")]
#[command(about = "Bootcamp enrollment and course progress", long_about = None)]
struct Cli {
    /// Directory holding the document store
    #[arg(long, default_value = ".bootcamp", global = true)]
    data_dir: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage courses
    #[command(subcommand)]
    Course(CourseCommand),
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Check whether a user may enroll in a course
    CanEnroll {
        /// User ID
        user: UserId,
        /// Course ID
        course: CourseId,
    },
    /// Enroll a user in a course
    Enroll {
        /// User ID
        user: UserId,
        /// Course ID
        course: CourseId,
    },
    /// Drop a course
    Unenroll {
        /// User ID
        user: UserId,
        /// Course ID
        course: CourseId,
    },
    /// Submit a quiz attempt
    Quiz {
        /// User ID
        user: UserId,
        /// Course ID
        course: CourseId,
        /// Quiz block ID
        block: BlockId,
        /// Selected option per question, comma separated
        #[arg(value_delimiter = ',', required = true)]
        answers: Vec<usize>,
    },
    /// Submit an assignment
    Submit {
        /// User ID
        user: UserId,
        /// Course ID
        course: CourseId,
        /// Assignment block ID
        block: BlockId,
        /// Submission content
        content: String,
        /// Submission type (text, file, url)
        #[arg(long = "type", default_value = "text")]
        kind: SubmissionType,
    },
    /// Mark a section complete
    Complete {
        /// User ID
        user: UserId,
        /// Course ID
        course: CourseId,
        /// Week ID
        week: WeekId,
        /// Section ID
        section: SectionId,
    },
    /// Show a user's progress in a course
    Progress {
        /// User ID
        user: UserId,
        /// Course ID
        course: CourseId,
    },
    /// List the cohorts of a course
    Cohorts {
        /// Course ID
        course: CourseId,
    },
}

#[derive(Subcommand)]
enum CourseCommand {
    /// Import a course from a JSON file
    Import {
        /// Path to the course JSON
        file: PathBuf,
    },
    /// Show a course outline
    Show {
        /// Course ID
        id: CourseId,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user
    Create {
        /// User ID
        id: UserId,
        /// Display name
        #[arg(long, default_value = "")]
        name: String,
        /// Role (student, teacher, admin)
        #[arg(long, default_value = "student")]
        role: Role,
    },
    /// Start or extend a subscription
    Subscribe {
        /// User ID
        id: UserId,
        /// Length in days
        #[arg(long, default_value = "30")]
        days: i64,
        /// Plan name
        #[arg(long, default_value = "monthly")]
        plan: String,
    },
    /// Show a user and their enrollments
    Show {
        /// User ID
        id: UserId,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Open storage
    let config = PlatformConfig::load(&cli.data_dir).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(JsonStorage::new(&cli.data_dir).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let enrollment = EnrollmentService::new(store.clone(), clock.clone()).with_config(config.enrollment);
    let tracker = StoreProgressTracker::new(store.clone(), clock.clone()).with_config(config.progress);

    match cli.command {
        Commands::Course(CourseCommand::Import { file }) => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let course: Course = serde_json::from_str(&json)
                .with_context(|| format!("invalid course file {}", file.display()))?;
            storage::save(store.as_ref(), collections::COURSES, course.id.as_str(), &course, Precondition::None)
                .await?;
            info!("Imported course {}", course.id);
            println!(
                "Imported course: {} - {} ({} sections)",
                course.id,
                course.title,
                course.total_sections()
            );
        }
        Commands::Course(CourseCommand::Show { id }) => {
            let Some(course) = storage::load::<Course>(store.as_ref(), collections::COURSES, id.as_str()).await? else {
                bail!("Course not found: {}", id);
            };
            let course = course.value;

            println!("Course: {} - {}", course.id, course.title);
            println!("  Open: {}", course.is_open);
            if let Some(weeks) = course.duration_weeks {
                println!("  Duration: {} weeks", weeks);
            }
            for week in &course.weeks {
                println!("  {} {}", week.id, week.title);
                for section in &week.sections {
                    let gradeable: Vec<String> = section
                        .gradeable_blocks()
                        .map(describe_block)
                        .collect();
                    if gradeable.is_empty() {
                        println!("    {} {}", section.id, section.title);
                    } else {
                        println!("    {} {} [{}]", section.id, section.title, gradeable.join(", "));
                    }
                }
            }
        }
        Commands::User(UserCommand::Create { id, name, role }) => {
            let user = User::new(id.clone(), name, role, clock.now());
            storage::save(store.as_ref(), collections::USERS, id.as_str(), &user, Precondition::Absent)
                .await
                .with_context(|| format!("user {} already exists", id))?;
            println!("Created user: {} ({})", user.id, user.role.as_str());
        }
        Commands::User(UserCommand::Subscribe { id, days, plan }) => {
            let Some(current) = storage::load::<User>(store.as_ref(), collections::USERS, id.as_str()).await? else {
                bail!("User not found: {}", id);
            };
            let mut user = current.value;
            let now = clock.now();
            // Extend a running window instead of restarting it
            let running = user.subscription.as_ref().filter(|s| s.end_date > now);
            let start = running.map(|s| s.start_date).unwrap_or(now);
            let end = extend_by_days(running.map(|s| s.end_date).unwrap_or(now), days)?;
            user.subscription = Some(Subscription {
                status: SubscriptionStatus::Active,
                start_date: start,
                end_date: end,
                plan,
            });
            storage::save(
                store.as_ref(),
                collections::USERS,
                id.as_str(),
                &user,
                Precondition::Version(current.version),
            )
            .await?;
            println!("Subscription of {} active until {}", id, end);
        }
        Commands::User(UserCommand::Show { id }) => {
            let Some(user) = storage::load::<User>(store.as_ref(), collections::USERS, id.as_str()).await? else {
                bail!("User not found: {}", id);
            };
            let user = user.value;

            println!("User: {}", user.id);
            println!("  Name: {}", user.name);
            println!("  Role: {}", user.role.as_str());
            match &user.subscription {
                Some(s) if user.has_active_subscription(clock.now()) => {
                    println!("  Subscription: {} until {}", s.plan, s.end_date)
                }
                Some(s) => println!("  Subscription: lapsed on {}", s.end_date),
                None => println!("  Subscription: none"),
            }
            println!("  Enrollments ({}):", user.enrolled_courses.len());
            for line in enrollment.enrollment_summary(&id).await? {
                let title = line.title.as_deref().unwrap_or("?");
                match line.cohort {
                    Some(cohort) => println!("    {} - {} | {}", line.course_id, title, cohort.name),
                    None => println!("    {} - {} | no cohort", line.course_id, title),
                }
            }
        }
        Commands::CanEnroll { user, course } => {
            let check = enrollment.can_enroll(&user, &course).await?;
            match check.reason {
                None => println!("{} can enroll in {}", user, course),
                Some(reason) => println!("{} cannot enroll in {}: {}", user, course, reason),
            }
        }
        Commands::Enroll { user, course } => {
            let outcome = enrollment.enroll(&user, &course).await;
            match (outcome.success, outcome.cohort) {
                (true, Some(cohort)) => println!(
                    "Enrolled {} in {}: {} ({} to {})",
                    user,
                    course,
                    cohort.name,
                    cohort.start_date.format("%Y-%m-%d"),
                    cohort.end_date.format("%Y-%m-%d")
                ),
                _ => bail!(
                    "Enrollment failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".to_string())
                ),
            }
        }
        Commands::Unenroll { user, course } => {
            let outcome = enrollment.unenroll(&user, &course).await;
            if !outcome.success {
                bail!(
                    "Unenrollment failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            println!("Unenrolled {} from {}. Progress is kept.", user, course);
        }
        Commands::Quiz { user, course, block, answers } => {
            let result = tracker.record_quiz_attempt(&user, &course, &block, &answers).await?;
            println!(
                "Score: {} ({}/{}) - {}",
                result.score,
                result.correct,
                result.total,
                if result.passed { "passed" } else { "not passed" }
            );
            if result.section_complete {
                println!("Section complete");
            }
        }
        Commands::Submit { user, course, block, content, kind } => {
            let submission = tracker
                .record_assignment_submission(&user, &course, &block, SubmissionPayload::new(kind, content))
                .await?;
            println!("Submitted {} at {}", submission.block_id, submission.submitted_at);
        }
        Commands::Complete { user, course, week, section } => {
            let status = tracker.section_status(&user, &course, &week, &section).await?;
            if !status.complete && !status.pending_items.is_empty() {
                println!("Warning: {} item(s) still open:", status.pending_items.len());
                for item in &status.pending_items {
                    println!("  {}", describe_pending(item));
                }
            }
            tracker.mark_section_complete(&user, &course, &week, &section).await?;
            println!("Section {}/{} complete", week, section);
        }
        Commands::Progress { user, course } => {
            let report = tracker.course_report(&user, &course).await?;
            println!(
                "Progress of {} in {}: {}/{} sections ({:.0}%)",
                user,
                course,
                report.completed_sections,
                report.total_sections,
                report.fraction * 100.0
            );
            for (block, score) in &report.quiz_scores {
                println!("  {}: {}", block, score);
            }
            if let Some(at) = report.last_accessed_at {
                println!("  Last visit: {}", at);
            }
        }
        Commands::Cohorts { course } => {
            let cohorts = enrollment.cohorts().list_cohorts(&course).await?;
            let now = clock.now();

            println!("Cohorts ({})", cohorts.len());
            for cohort in cohorts {
                println!(
                    "  {} | {} | {} - {} | {} students{}",
                    cohort.id,
                    cohort.name,
                    cohort.start_date.format("%Y-%m-%d"),
                    cohort.end_date.format("%Y-%m-%d"),
                    cohort.student_ids.len(),
                    if cohort.is_open_at(now) { "" } else { " | closed" }
                );
            }
        }
    }

    Ok(())
}

/// `from` plus `days`, refusing lengths the calendar cannot hold.
fn extend_by_days(from: Time, days: i64) -> Result<Time> {
    let Some(end) = chrono::Duration::try_days(days).and_then(|d| from.checked_add_signed(d)) else {
        bail!("subscription length of {} days is out of range", days);
    };
    Ok(end)
}

fn describe_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Quiz(q) => format!("quiz {} ({} questions)", q.id, q.questions.len()),
        ContentBlock::Assignment(a) => format!("assignment {} ({})", a.id, a.submission_type.as_str()),
        _ => String::new(),
    }
}

fn describe_pending(item: &PendingItem) -> String {
    match item {
        PendingItem::Quiz { block_id, score: Some(score), needed } => {
            format!("quiz {}: scored {}, needs {}", block_id, score, needed)
        }
        PendingItem::Quiz { block_id, score: None, .. } => format!("quiz {}: not attempted", block_id),
        PendingItem::Assignment { block_id } => format!("assignment {}: not submitted", block_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_extend_by_days() {
        let from = Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap();
        assert_eq!(
            extend_by_days(from, 30).unwrap(),
            Utc.with_ymd_and_hms(2024, 4, 5, 10, 0, 0).unwrap()
        );
        assert!(extend_by_days(from, i64::MAX).is_err());
        assert!(extend_by_days(from, 1_000_000_000).is_err());
    }
}
