//! Persisted reports: report cards with their subject rows, teacher reports
//! and class reports.
//!
//! Every record is upserted on its natural key and its content fully
//! replaced, so regenerating a report is a pure function of the submission
//! data. `rank` is the one field left alone here; the ranking engine owns it.

use crate::{
    core::aggregate::{ClassAggregate, StudentAggregate, TeacherAggregate},
    entities::{
        Class, ClassReport, ReportCard, ReportCardSubject, TeacherReport, Term, User,
        class_report, report_card, report_card_subject, teacher_report,
    },
    errors::Result,
};
use chrono::NaiveDateTime;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::SimpleExpr};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Natural-key parts shared by every record of one report run
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    /// School reported on
    pub school_id: i64,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// Term covered, `None` for the whole year
    pub term_id: Option<i64>,
    /// Passing threshold stored on report cards
    pub passing_threshold: f64,
    /// Timestamp written to `generated_at`
    pub generated_at: NaiveDateTime,
}

fn term_condition<Col: ColumnTrait>(column: Col, term_id: Option<i64>) -> SimpleExpr {
    match term_id {
        Some(term_id) => column.eq(term_id),
        None => column.is_null(),
    }
}

/// Upserts the report card of one student aggregate and replaces its subject rows.
#[instrument(skip(db, student, ctx), fields(student_id = student.student_id))]
pub async fn upsert_report_card<C>(
    db: &C,
    student: &StudentAggregate,
    ctx: &ReportContext,
) -> Result<report_card::Model>
where
    C: ConnectionTrait,
{
    let existing = ReportCard::find()
        .filter(report_card::Column::StudentId.eq(student.student_id))
        .filter(report_card::Column::ClassId.eq(student.class_id))
        .filter(report_card::Column::SchoolId.eq(ctx.school_id))
        .filter(report_card::Column::AcademicYear.eq(ctx.academic_year.as_str()))
        .filter(term_condition(report_card::Column::TermId, ctx.term_id))
        .one(db)
        .await?;

    let card = if let Some(existing) = existing {
        let mut active: report_card::ActiveModel = existing.into();
        active.total_score = Set(student.total_score);
        active.average = Set(student.average);
        active.passing_threshold = Set(ctx.passing_threshold);
        active.generated_at = Set(ctx.generated_at);
        active.update(db).await?
    } else {
        report_card::ActiveModel {
            student_id: Set(student.student_id),
            class_id: Set(student.class_id),
            school_id: Set(ctx.school_id),
            term_id: Set(ctx.term_id),
            academic_year: Set(ctx.academic_year.clone()),
            total_score: Set(student.total_score),
            average: Set(student.average),
            rank: Set(0.0),
            passing_threshold: Set(ctx.passing_threshold),
            generated_at: Set(ctx.generated_at),
            ..Default::default()
        }
        .insert(db)
        .await?
    };

    ReportCardSubject::delete_many()
        .filter(report_card_subject::Column::ReportCardId.eq(card.id))
        .exec(db)
        .await?;

    for subject in &student.subjects {
        let b = &subject.breakdown;
        report_card_subject::ActiveModel {
            report_card_id: Set(card.id),
            subject_id: Set(subject.subject_id),
            subject_name: Set(subject.subject_name.clone()),
            assessment1: Set(b.assessment1.points),
            assessment1_max: Set(b.assessment1.max),
            assessment2: Set(b.assessment2.points),
            assessment2_max: Set(b.assessment2.max),
            test: Set(b.test.points),
            test_max: Set(b.test.max),
            exam: Set(b.exam.points),
            exam_max: Set(b.exam.max),
            total: Set(subject.total),
            max_total: Set(subject.max_total),
            percentage: Set(subject.percentage),
            decision: Set(subject.decision.as_str().to_string()),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    debug!(report_card_id = card.id, subjects = student.subjects.len(), "Upserted report card");
    Ok(card)
}

/// Upserts one teacher aggregate on (teacher, school, year, term).
pub async fn upsert_teacher_report<C>(
    db: &C,
    teacher: &TeacherAggregate,
    ctx: &ReportContext,
) -> Result<teacher_report::Model>
where
    C: ConnectionTrait,
{
    let existing = TeacherReport::find()
        .filter(teacher_report::Column::TeacherId.eq(teacher.teacher_id))
        .filter(teacher_report::Column::SchoolId.eq(ctx.school_id))
        .filter(teacher_report::Column::AcademicYear.eq(ctx.academic_year.as_str()))
        .filter(term_condition(teacher_report::Column::TermId, ctx.term_id))
        .one(db)
        .await?;

    let model = if let Some(existing) = existing {
        let mut active: teacher_report::ActiveModel = existing.into();
        active.total_students = Set(teacher.total_students);
        active.average_score = Set(teacher.average_score);
        active.competency_rate = Set(teacher.competency_rate);
        active.generated_at = Set(ctx.generated_at);
        active.update(db).await?
    } else {
        teacher_report::ActiveModel {
            teacher_id: Set(teacher.teacher_id),
            school_id: Set(ctx.school_id),
            academic_year: Set(ctx.academic_year.clone()),
            term_id: Set(ctx.term_id),
            total_students: Set(teacher.total_students),
            average_score: Set(teacher.average_score),
            competency_rate: Set(teacher.competency_rate),
            rank: Set(0.0),
            generated_at: Set(ctx.generated_at),
            ..Default::default()
        }
        .insert(db)
        .await?
    };
    Ok(model)
}

/// Upserts one class aggregate on (class, school, year, term).
pub async fn upsert_class_report<C>(
    db: &C,
    class: &ClassAggregate,
    ctx: &ReportContext,
) -> Result<class_report::Model>
where
    C: ConnectionTrait,
{
    let existing = ClassReport::find()
        .filter(class_report::Column::ClassId.eq(class.class_id))
        .filter(class_report::Column::SchoolId.eq(ctx.school_id))
        .filter(class_report::Column::AcademicYear.eq(ctx.academic_year.as_str()))
        .filter(term_condition(class_report::Column::TermId, ctx.term_id))
        .one(db)
        .await?;

    let model = if let Some(existing) = existing {
        let mut active: class_report::ActiveModel = existing.into();
        active.student_count = Set(class.student_count);
        active.total_score = Set(class.total_score);
        active.average_score = Set(class.average_score);
        active.generated_at = Set(ctx.generated_at);
        active.update(db).await?
    } else {
        class_report::ActiveModel {
            class_id: Set(class.class_id),
            school_id: Set(ctx.school_id),
            academic_year: Set(ctx.academic_year.clone()),
            term_id: Set(ctx.term_id),
            student_count: Set(class.student_count),
            total_score: Set(class.total_score),
            average_score: Set(class.average_score),
            rank: Set(0.0),
            generated_at: Set(ctx.generated_at),
            ..Default::default()
        }
        .insert(db)
        .await?
    };
    Ok(model)
}

/// A report card joined with the names a reader needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportCardView {
    /// Stored card
    #[serde(flatten)]
    pub card: report_card::Model,
    /// Student's name
    pub student_name: String,
    /// Class name
    pub class_name: String,
    /// Term number, `None` for a year-wide card
    pub term_number: Option<i32>,
    /// Subject rows in subject order
    pub subjects: Vec<report_card_subject::Model>,
}

/// Joins cards with student, class, term and subject data.
///
/// Names of records that no longer exist are left empty.
pub async fn load_views<C>(db: &C, cards: Vec<report_card::Model>) -> Result<Vec<ReportCardView>>
where
    C: ConnectionTrait,
{
    if cards.is_empty() {
        return Ok(Vec::new());
    }

    let student_names: HashMap<i64, String> = User::find()
        .filter(crate::entities::user::Column::Id.is_in(cards.iter().map(|c| c.student_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();
    let class_names: HashMap<i64, String> = Class::find()
        .filter(crate::entities::class::Column::Id.is_in(cards.iter().map(|c| c.class_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let term_numbers: HashMap<i64, i32> = Term::find()
        .filter(crate::entities::term::Column::Id.is_in(cards.iter().filter_map(|c| c.term_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|t| (t.id, t.term_number))
        .collect();

    let mut subjects: HashMap<i64, Vec<report_card_subject::Model>> = HashMap::new();
    for row in ReportCardSubject::find()
        .filter(report_card_subject::Column::ReportCardId.is_in(cards.iter().map(|c| c.id)))
        .order_by_asc(report_card_subject::Column::SubjectId)
        .all(db)
        .await?
    {
        subjects.entry(row.report_card_id).or_default().push(row);
    }

    Ok(cards
        .into_iter()
        .map(|card| ReportCardView {
            student_name: student_names.get(&card.student_id).cloned().unwrap_or_default(),
            class_name: class_names.get(&card.class_id).cloned().unwrap_or_default(),
            term_number: card.term_id.and_then(|id| term_numbers.get(&id).copied()),
            subjects: subjects.remove(&card.id).unwrap_or_default(),
            card,
        })
        .collect())
}

/// Stored report cards of a school's year and term, best first.
pub async fn list_report_cards<C>(
    db: &C,
    school_id: i64,
    academic_year: &str,
    term_id: Option<i64>,
) -> Result<Vec<report_card::Model>>
where
    C: ConnectionTrait,
{
    ReportCard::find()
        .filter(report_card::Column::SchoolId.eq(school_id))
        .filter(report_card::Column::AcademicYear.eq(academic_year))
        .filter(term_condition(report_card::Column::TermId, term_id))
        .order_by_desc(report_card::Column::TotalScore)
        .order_by_asc(report_card::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::aggregate::{CategoryBreakdown, SubjectResult};
    use crate::core::clock::Clock;
    use crate::core::scope::AssessmentCategory;
    use crate::test_utils::*;

    fn student_aggregate(student_id: i64, class_id: i64, exam_points: &[(i64, f64)]) -> StudentAggregate {
        let subjects: Vec<SubjectResult> = exam_points
            .iter()
            .map(|(subject_id, points)| {
                let mut breakdown = CategoryBreakdown::default();
                breakdown.add(AssessmentCategory::Exam, *points, 100.0);
                SubjectResult::from_breakdown(*subject_id, format!("Subject {subject_id}"), breakdown)
            })
            .collect();
        let total_score: f64 = subjects.iter().map(|s| s.total).sum();
        #[allow(clippy::cast_precision_loss)]
        let average = total_score / subjects.len() as f64;
        StudentAggregate {
            student_id,
            class_id,
            subjects,
            total_score,
            average,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_content_but_keeps_rank() -> Result<()> {
        let fx = setup_school().await?;
        let student = create_enrolled_student(&fx.db, &fx, "Alice").await?;
        let ctx = ReportContext {
            school_id: fx.school.id,
            academic_year: "2024-2025".to_string(),
            term_id: Some(fx.terms[0].id),
            passing_threshold: 50.0,
            generated_at: test_clock().now(),
        };

        let first = upsert_report_card(&fx.db, &student_aggregate(student.id, fx.class.id, &[(1, 80.0), (2, 40.0)]), &ctx).await?;
        assert_eq!(first.total_score, 120.0);
        assert_eq!(first.average, 60.0);

        let mut active: report_card::ActiveModel = first.clone().into();
        active.rank = Set(0.5);
        active.update(&fx.db).await?;

        let second = upsert_report_card(&fx.db, &student_aggregate(student.id, fx.class.id, &[(1, 90.0)]), &ctx).await?;
        assert_eq!(second.id, first.id);
        assert_eq!(second.total_score, 90.0);
        assert_eq!(second.rank, 0.5);

        let views = load_views(&fx.db, vec![second]).await?;
        assert_eq!(views[0].subjects.len(), 1);
        assert_eq!(views[0].subjects[0].decision, "Competent");
        assert_eq!(views[0].student_name, "Alice");
        assert_eq!(views[0].class_name, fx.class.name);
        assert_eq!(views[0].term_number, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_year_wide_and_term_cards_are_distinct() -> Result<()> {
        let fx = setup_school().await?;
        let student = create_enrolled_student(&fx.db, &fx, "Bob").await?;
        let aggregate = student_aggregate(student.id, fx.class.id, &[(1, 55.0)]);
        let term_ctx = ReportContext {
            school_id: fx.school.id,
            academic_year: "2024-2025".to_string(),
            term_id: Some(fx.terms[0].id),
            passing_threshold: 50.0,
            generated_at: test_clock().now(),
        };
        let year_ctx = ReportContext {
            term_id: None,
            ..term_ctx.clone()
        };

        let term_card = upsert_report_card(&fx.db, &aggregate, &term_ctx).await?;
        let year_card = upsert_report_card(&fx.db, &aggregate, &year_ctx).await?;
        let year_card_again = upsert_report_card(&fx.db, &aggregate, &year_ctx).await?;
        assert_ne!(term_card.id, year_card.id);
        assert_eq!(year_card.id, year_card_again.id);

        let year_cards = list_report_cards(&fx.db, fx.school.id, "2024-2025", None).await?;
        assert_eq!(year_cards.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_teacher_and_class_report_upserts() -> Result<()> {
        let fx = setup_school().await?;
        let ctx = ReportContext {
            school_id: fx.school.id,
            academic_year: "2024-2025".to_string(),
            term_id: None,
            passing_threshold: 50.0,
            generated_at: test_clock().now(),
        };
        let mut teacher = TeacherAggregate {
            teacher_id: 7,
            total_students: 3,
            average_score: 60.0,
            competency_rate: 33.3,
        };
        let first = upsert_teacher_report(&fx.db, &teacher, &ctx).await?;
        teacher.average_score = 65.0;
        let second = upsert_teacher_report(&fx.db, &teacher, &ctx).await?;
        assert_eq!(first.id, second.id);
        assert_eq!(second.average_score, 65.0);

        let class = ClassAggregate {
            class_id: fx.class.id,
            student_count: 2,
            total_score: 100.0,
            average_score: 50.0,
        };
        let a = upsert_class_report(&fx.db, &class, &ctx).await?;
        let b = upsert_class_report(&fx.db, &class, &ctx).await?;
        assert_eq!(a.id, b.id);
        assert_eq!(ClassReport::find().count(&fx.db).await?, 1);
        Ok(())
    }
}
