//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`;
//! the composite natural keys that the upsert and idempotency logic rely on are added as
//! unique indexes afterwards, since entity attributes only describe single-column uniqueness.

use crate::entities::{
    AnswerScore, Class, ClassReport, Enrollment, Exam, PromotionLog, Question, ReportCard,
    ReportCardSubject, School, Subject, Submission, TeacherReport, Term, Trade, User, class_report,
    enrollment, promotion_log, report_card, submission, teacher_report, term,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/school_reports.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, then the
/// configured value, then the default local `SQLite` file.
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the `SQLite` database at `database_url`.
#[instrument]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all tables and natural-key indexes if they do not already exist.
///
/// Tables are created parents first so that the foreign keys generated from
/// `belongs_to` relations resolve.
#[instrument(skip(db))]
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    create_table(db, School).await?;
    create_table(db, Trade).await?;
    create_table(db, Class).await?;
    create_table(db, Term).await?;
    create_table(db, User).await?;
    create_table(db, Subject).await?;
    create_table(db, Exam).await?;
    create_table(db, Question).await?;
    create_table(db, Submission).await?;
    create_table(db, AnswerScore).await?;
    create_table(db, Enrollment).await?;
    create_table(db, ReportCard).await?;
    create_table(db, ReportCardSubject).await?;
    create_table(db, TeacherReport).await?;
    create_table(db, ClassReport).await?;
    create_table(db, PromotionLog).await?;

    for index in natural_key_indexes() {
        db.execute(db.get_database_backend().build(&index)).await?;
    }

    info!("Database tables and indexes ensured");
    Ok(())
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

fn natural_key_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_submissions_student_exam")
            .table(Submission)
            .col(submission::Column::StudentId)
            .col(submission::Column::ExamId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_enrollments_student_term")
            .table(Enrollment)
            .col(enrollment::Column::StudentId)
            .col(enrollment::Column::TermId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_terms_school_year_number")
            .table(Term)
            .col(term::Column::SchoolId)
            .col(term::Column::AcademicYear)
            .col(term::Column::TermNumber)
            .unique()
            .if_not_exists()
            .to_owned(),
        // NULL term ids (year-wide cards) are distinct to SQLite, so those rows
        // rely on the lookup-then-write upsert inside the enclosing transaction.
        Index::create()
            .name("idx_report_cards_natural_key")
            .table(ReportCard)
            .col(report_card::Column::StudentId)
            .col(report_card::Column::ClassId)
            .col(report_card::Column::AcademicYear)
            .col(report_card::Column::TermId)
            .col(report_card::Column::SchoolId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_teacher_reports_natural_key")
            .table(TeacherReport)
            .col(teacher_report::Column::TeacherId)
            .col(teacher_report::Column::SchoolId)
            .col(teacher_report::Column::AcademicYear)
            .col(teacher_report::Column::TermId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_class_reports_natural_key")
            .table(ClassReport)
            .col(class_report::Column::ClassId)
            .col(class_report::Column::SchoolId)
            .col(class_report::Column::AcademicYear)
            .col(class_report::Column::TermId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_promotion_logs_student_year")
            .table(PromotionLog)
            .col(promotion_log::Column::StudentId)
            .col(promotion_log::Column::AcademicYear)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ReportCardModel;
    use sea_orm::{QuerySelect, Set, prelude::*};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<ReportCardModel> = ReportCard::find().limit(1).all(&db).await?;
        let count = PromotionLog::find().count(&db).await?;
        assert_eq!(count, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_promotion_log_unique_per_student_and_year() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let log = || promotion_log::ActiveModel {
            student_id: Set(1),
            school_id: Set(1),
            academic_year: Set("2024-2025".to_string()),
            status: Set("repeated".to_string()),
            from_class_id: Set(1),
            to_class_id: Set(None),
            is_manual: Set(false),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };

        log().insert(&db).await?;
        let duplicate = log().insert(&db).await;
        assert!(duplicate.is_err());

        Ok(())
    }

    #[test]
    fn test_database_url_prefers_configured_value_over_default() {
        if std::env::var("DATABASE_URL").is_err() {
            assert_eq!(get_database_url(Some("sqlite::memory:")), "sqlite::memory:");
            assert_eq!(get_database_url(None), DEFAULT_DATABASE_URL);
        }
    }
}
