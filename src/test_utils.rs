//! Shared test utilities for `school-reports`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        clock::FixedClock,
        enrollment::enroll_student,
        submission::{AnswerInput, record_answers},
        term::create_term,
    },
    entities::{
        Question, class, exam, question, report_card, school, subject, submission, term, trade,
        user,
    },
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, QueryOrder, Set, prelude::*};
use tracing_subscriber::EnvFilter;

/// Academic year every fixture is set in
pub const TEST_YEAR: &str = "2024-2025";

/// Installs a test-writer subscriber; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")))
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Clock fixed after the fixture year's third term ended.
pub fn test_clock() -> FixedClock {
    FixedClock::on(date(2025, 7, 1))
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// A school with one trade, one L3 class and a complete academic year.
pub struct Fixture {
    /// Test database
    pub db: DatabaseConnection,
    /// The school
    pub school: school::Model,
    /// Its only trade
    pub trade: trade::Model,
    /// L3 class of [`TEST_YEAR`]
    pub class: class::Model,
    /// Terms 1 to 3 of [`TEST_YEAR`]
    pub terms: Vec<term::Model>,
}

impl Fixture {
    /// Scope parameters for the fixture school and year
    pub fn params(&self, term_id: Option<i64>) -> crate::core::scope::ScopeParams {
        crate::core::scope::ScopeParams {
            school_id: self.school.id,
            academic_year: TEST_YEAR.to_string(),
            term_id,
        }
    }
}

/// Sets up a complete test school.
///
/// # Defaults
/// * trade `SWD` with one L3 class
/// * terms Sep 2 - Dec 13, Jan 6 - Mar 28, Apr 14 - Jun 27
pub async fn setup_school() -> Result<Fixture> {
    let db = setup_test_db().await?;
    let school = school::ActiveModel {
        name: Set("Test Technical School".to_string()),
        ..Default::default()
    }
    .insert(&db)
    .await?;
    let trade = insert_trade(&db, school.id, "SWD").await?;
    let class = insert_class(&db, school.id, trade.id, "L3", TEST_YEAR).await?;

    let windows = [
        (date(2024, 9, 2), date(2024, 12, 13)),
        (date(2025, 1, 6), date(2025, 3, 28)),
        (date(2025, 4, 14), date(2025, 6, 27)),
    ];
    let mut terms = Vec::new();
    for (number, (start, end)) in (1..).zip(windows) {
        terms.push(create_term(&db, school.id, TEST_YEAR, number, start, end).await?);
    }

    Ok(Fixture {
        db,
        school,
        trade,
        class,
        terms,
    })
}

/// Creates a second, empty school.
pub async fn setup_second_school(db: &DatabaseConnection) -> Result<school::Model> {
    Ok(school::ActiveModel {
        name: Set("Other School".to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

async fn insert_trade(db: &DatabaseConnection, school_id: i64, code: &str) -> Result<trade::Model> {
    Ok(trade::ActiveModel {
        school_id: Set(school_id),
        code: Set(code.to_string()),
        name: Set(format!("{code} trade")),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

async fn insert_class(
    db: &DatabaseConnection,
    school_id: i64,
    trade_id: i64,
    level: &str,
    academic_year: &str,
) -> Result<class::Model> {
    Ok(class::ActiveModel {
        school_id: Set(school_id),
        trade_id: Set(trade_id),
        level: Set(level.to_string()),
        academic_year: Set(academic_year.to_string()),
        name: Set(format!("{level} {trade_id} {academic_year}")),
        is_active: Set(true),
        is_deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Creates another trade in the fixture school.
pub async fn create_test_trade(db: &DatabaseConnection, fx: &Fixture, code: &str) -> Result<trade::Model> {
    insert_trade(db, fx.school.id, code).await
}

/// Creates a class of the fixture trade.
pub async fn create_test_class(
    db: &DatabaseConnection,
    fx: &Fixture,
    level: &str,
    academic_year: &str,
) -> Result<class::Model> {
    insert_class(db, fx.school.id, fx.trade.id, level, academic_year).await
}

/// Creates a class of any trade in the fixture school.
pub async fn create_class_in_trade(
    db: &DatabaseConnection,
    fx: &Fixture,
    trade_id: i64,
    level: &str,
    academic_year: &str,
) -> Result<class::Model> {
    insert_class(db, fx.school.id, trade_id, level, academic_year).await
}

async fn insert_user(db: &DatabaseConnection, school_id: i64, name: &str, role: &str) -> Result<user::Model> {
    Ok(user::ActiveModel {
        school_id: Set(school_id),
        name: Set(name.to_string()),
        role: Set(role.to_string()),
        is_active: Set(true),
        is_deleted: Set(false),
        is_graduated: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Creates an active student without any enrollment.
pub async fn create_test_student(db: &DatabaseConnection, school_id: i64, name: &str) -> Result<user::Model> {
    insert_user(db, school_id, name, user::ROLE_STUDENT).await
}

/// Creates an active teacher in the fixture school.
pub async fn create_test_teacher(db: &DatabaseConnection, fx: &Fixture, name: &str) -> Result<user::Model> {
    insert_user(db, fx.school.id, name, user::ROLE_TEACHER).await
}

/// Creates a student enrolled in the fixture class for term 1.
pub async fn create_enrolled_student(db: &DatabaseConnection, fx: &Fixture, name: &str) -> Result<user::Model> {
    let student = create_test_student(db, fx.school.id, name).await?;
    enroll_student(db, &test_clock(), student.id, fx.class.id, fx.terms[0].id).await?;
    Ok(student)
}

/// Creates a subject of the fixture trade.
pub async fn create_test_subject(
    db: &DatabaseConnection,
    fx: &Fixture,
    name: &str,
    teacher_id: Option<i64>,
) -> Result<subject::Model> {
    Ok(subject::ActiveModel {
        school_id: Set(fx.school.id),
        trade_id: Set(fx.trade.id),
        name: Set(name.to_string()),
        teacher_id: Set(teacher_id),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Creates an exam with one question per entry of `max_scores`.
pub async fn create_test_exam(
    db: &DatabaseConnection,
    subject_id: i64,
    term_id: i64,
    exam_type: &str,
    max_scores: &[f64],
) -> Result<exam::Model> {
    let created = exam::ActiveModel {
        subject_id: Set(subject_id),
        term_id: Set(term_id),
        exam_type: Set(exam_type.to_string()),
        total_points: Set(max_scores.iter().sum()),
        is_deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?;

    for (position, max_score) in (1_i32..).zip(max_scores) {
        question::ActiveModel {
            exam_id: Set(created.id),
            position: Set(position),
            max_score: Set(*max_score),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(created)
}

/// Question ids of an exam in position order.
pub async fn question_ids(db: &DatabaseConnection, exam_id: i64) -> Result<Vec<i64>> {
    Ok(Question::find()
        .filter(question::Column::ExamId.eq(exam_id))
        .order_by_asc(question::Column::Position)
        .all(db)
        .await?
        .into_iter()
        .map(|q| q.id)
        .collect())
}

/// Creates a submission with one graded answer per entry of `scores`, in
/// question order, and the given status.
pub async fn create_submission(
    db: &DatabaseConnection,
    exam_id: i64,
    student_id: i64,
    scores: &[f64],
    status: &str,
) -> Result<submission::Model> {
    let created = submission::ActiveModel {
        exam_id: Set(exam_id),
        student_id: Set(student_id),
        status: Set(submission::STATUS_IN_PROGRESS.to_string()),
        total_score: Set(0.0),
        is_deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let answers: Vec<AnswerInput> = question_ids(db, exam_id)
        .await?
        .into_iter()
        .zip(scores)
        .map(|(question_id, score)| AnswerInput {
            question_id,
            score: *score,
            graded: true,
        })
        .collect();
    let recorded = record_answers(db, created.id, &answers).await?;

    let mut active: submission::ActiveModel = recorded.into();
    active.status = Set(status.to_string());
    Ok(active.update(db).await?)
}

/// Creates a graded submission.
pub async fn grade_submission(
    db: &DatabaseConnection,
    exam_id: i64,
    student_id: i64,
    scores: &[f64],
) -> Result<submission::Model> {
    create_submission(db, exam_id, student_id, scores, submission::STATUS_GRADED).await
}

/// Creates a report card in the fixture class whose total and average are `score`.
pub async fn create_report_card(
    db: &DatabaseConnection,
    fx: &Fixture,
    student_id: i64,
    term_id: Option<i64>,
    score: f64,
) -> Result<report_card::Model> {
    create_report_card_in(db, fx, student_id, fx.class.id, term_id, score).await
}

/// Creates a report card in any class whose total and average are `score`.
pub async fn create_report_card_in(
    db: &DatabaseConnection,
    fx: &Fixture,
    student_id: i64,
    class_id: i64,
    term_id: Option<i64>,
    score: f64,
) -> Result<report_card::Model> {
    Ok(report_card::ActiveModel {
        student_id: Set(student_id),
        class_id: Set(class_id),
        school_id: Set(fx.school.id),
        term_id: Set(term_id),
        academic_year: Set(TEST_YEAR.to_string()),
        total_score: Set(score),
        average: Set(score),
        rank: Set(0.0),
        passing_threshold: Set(50.0),
        generated_at: Set(test_clock().0),
        ..Default::default()
    }
    .insert(db)
    .await?)
}
