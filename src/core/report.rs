//! Report generation service.
//!
//! Validates a report request, then runs aggregate → upsert → rank inside one
//! database transaction so a failure anywhere leaves no partial report behind.
//! The single-assessment report is the exception: it is computed in memory
//! and never stored.

use crate::{
    core::{
        aggregate::{Aggregation, StudentAggregate, aggregate},
        clock::Clock,
        level::AcademicYear,
        ranking::{rank_class_reports, rank_in_memory, rank_report_cards, rank_teacher_reports},
        report_card::{
            ReportCardView, ReportContext, load_views, upsert_class_report, upsert_report_card,
            upsert_teacher_report,
        },
        scope::{AssessmentCategory, ReportScope, ScopeDescriptor, ScopeParams},
        term::{ensure_started, term_in_year},
    },
    entities::{Class, School, Subject, Trade, User, class_report, teacher_report, user},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, EntityTrait, TransactionTrait};
use serde::Serialize;
use tracing::{info, instrument};

/// Threshold stored on report cards when the caller does not give one
pub const DEFAULT_PASSING_THRESHOLD: f64 = 50.0;

/// What to generate
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    /// Scope to aggregate over
    pub scope: ReportScope,
    /// School the report is for
    pub school_id: i64,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// Restrict to one term; `None` produces year-wide records
    pub term_id: Option<i64>,
    /// Informational threshold stored on report cards
    pub passing_threshold: Option<f64>,
}

impl ReportRequest {
    fn params(&self) -> ScopeParams {
        ScopeParams {
            school_id: self.school_id,
            academic_year: self.academic_year.clone(),
            term_id: self.term_id,
        }
    }

    /// Term the stored records are keyed on
    const fn record_term(&self) -> Option<i64> {
        match self.scope {
            ReportScope::Term(term_id) => Some(term_id),
            _ => self.term_id,
        }
    }

    fn context(&self, clock: &dyn Clock) -> ReportContext {
        ReportContext {
            school_id: self.school_id,
            academic_year: self.academic_year.clone(),
            term_id: self.record_term(),
            passing_threshold: self.passing_threshold.unwrap_or(DEFAULT_PASSING_THRESHOLD),
            generated_at: clock.now(),
        }
    }
}

/// A student row of the in-memory single-assessment report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStudent {
    /// Aggregated scores
    #[serde(flatten)]
    pub student: StudentAggregate,
    /// Competition rank, 0 when unranked
    pub rank: f64,
}

/// Output of [`run_report`], one variant per kind of report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum ReportOutput {
    /// Stored, ranked report cards
    ReportCards(Vec<ReportCardView>),
    /// Stored, ranked teacher reports
    Teachers(Vec<teacher_report::Model>),
    /// Stored, ranked class reports
    Classes(Vec<class_report::Model>),
    /// In-memory single-assessment rows
    Assessment(Vec<RankedStudent>),
}

/// Dispatches a request to the generator for its scope.
pub async fn run_report<C>(db: &C, clock: &dyn Clock, request: &ReportRequest) -> Result<ReportOutput>
where
    C: ConnectionTrait + TransactionTrait,
{
    Ok(match request.scope {
        ReportScope::Teacher => ReportOutput::Teachers(generate_teacher_report(db, clock, request).await?),
        ReportScope::ClassPerformance => {
            ReportOutput::Classes(generate_class_report(db, clock, request).await?)
        }
        ReportScope::Assessment(_) => {
            ReportOutput::Assessment(generate_assessment_report(db, clock, request).await?)
        }
        _ => ReportOutput::ReportCards(generate_report(db, clock, request).await?),
    })
}

/// Generates, stores and ranks the report cards of a student-grouped scope.
///
/// Running it twice with unchanged submission data leaves the stored cards
/// unchanged apart from `generated_at`.
///
/// # Errors
/// - Precondition errors (`NotFound`, `InvalidScope`, `InvalidInput`,
///   `TermNotStarted`) before any work starts
/// - `Error::Ranking` or `Error::Database` after which nothing is stored
#[instrument(skip(db, clock), fields(scope = request.scope.name()))]
pub async fn generate_report<C>(
    db: &C,
    clock: &dyn Clock,
    request: &ReportRequest,
) -> Result<Vec<ReportCardView>>
where
    C: ConnectionTrait + TransactionTrait,
{
    if matches!(
        request.scope,
        ReportScope::Teacher | ReportScope::ClassPerformance | ReportScope::Assessment(_)
    ) {
        return Err(Error::InvalidScope {
            message: format!("Scope '{}' does not produce report cards", request.scope.name()),
        });
    }

    let txn = db.begin().await?;
    check_preconditions(&txn, clock, request).await?;

    let descriptor = ScopeDescriptor::new(request.scope, request.params());
    let Aggregation::Students(students) = aggregate(&txn, &descriptor).await? else {
        return Err(Error::Aggregation {
            message: "Student scope produced non-student rows".to_string(),
        });
    };

    let ctx = request.context(clock);
    let mut cards = Vec::with_capacity(students.len());
    for student in &students {
        cards.push(upsert_report_card(&txn, student, &ctx).await?);
    }

    let ranked = rank_report_cards(&txn, cards, request.scope.ranking()).await?;
    let views = load_views(&txn, ranked).await?;
    txn.commit().await?;

    info!(cards = views.len(), "Generated report cards");
    Ok(views)
}

/// Generates, stores and ranks teacher reports for the school.
#[instrument(skip(db, clock))]
pub async fn generate_teacher_report<C>(
    db: &C,
    clock: &dyn Clock,
    request: &ReportRequest,
) -> Result<Vec<teacher_report::Model>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let request = ReportRequest {
        scope: ReportScope::Teacher,
        ..request.clone()
    };
    let txn = db.begin().await?;
    check_preconditions(&txn, clock, &request).await?;

    let descriptor = ScopeDescriptor::new(request.scope, request.params());
    let Aggregation::Teachers(teachers) = aggregate(&txn, &descriptor).await? else {
        return Err(Error::Aggregation {
            message: "Teacher scope produced non-teacher rows".to_string(),
        });
    };

    let ctx = request.context(clock);
    let mut reports = Vec::with_capacity(teachers.len());
    for teacher in &teachers {
        reports.push(upsert_teacher_report(&txn, teacher, &ctx).await?);
    }
    let ranked = rank_teacher_reports(&txn, reports).await?;
    txn.commit().await?;

    info!(teachers = ranked.len(), "Generated teacher reports");
    Ok(ranked)
}

/// Generates, stores and ranks class-performance reports for the school.
#[instrument(skip(db, clock))]
pub async fn generate_class_report<C>(
    db: &C,
    clock: &dyn Clock,
    request: &ReportRequest,
) -> Result<Vec<class_report::Model>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let request = ReportRequest {
        scope: ReportScope::ClassPerformance,
        ..request.clone()
    };
    let txn = db.begin().await?;
    check_preconditions(&txn, clock, &request).await?;

    let descriptor = ScopeDescriptor::new(request.scope, request.params());
    let Aggregation::Classes(classes) = aggregate(&txn, &descriptor).await? else {
        return Err(Error::Aggregation {
            message: "Class scope produced non-class rows".to_string(),
        });
    };

    let ctx = request.context(clock);
    let mut reports = Vec::with_capacity(classes.len());
    for class in &classes {
        reports.push(upsert_class_report(&txn, class, &ctx).await?);
    }
    let ranked = rank_class_reports(&txn, reports).await?;
    txn.commit().await?;

    info!(classes = ranked.len(), "Generated class reports");
    Ok(ranked)
}

/// Aggregates one continuous assessment and competition-ranks the students.
///
/// Nothing is stored.
#[instrument(skip(db, clock))]
pub async fn generate_assessment_report<C>(
    db: &C,
    clock: &dyn Clock,
    request: &ReportRequest,
) -> Result<Vec<RankedStudent>>
where
    C: ConnectionTrait,
{
    check_preconditions(db, clock, request).await?;

    let descriptor = ScopeDescriptor::new(request.scope, request.params());
    let Aggregation::Students(students) = aggregate(db, &descriptor).await? else {
        return Err(Error::Aggregation {
            message: "Assessment scope produced non-student rows".to_string(),
        });
    };

    let ranks = rank_in_memory(&students);
    let mut rows: Vec<RankedStudent> = students
        .into_iter()
        .zip(ranks)
        .map(|(student, rank)| RankedStudent { student, rank })
        .collect();
    rows.sort_by(|a, b| a.rank.total_cmp(&b.rank).then(a.student.student_id.cmp(&b.student.student_id)));
    Ok(rows)
}

async fn check_preconditions<C>(db: &C, clock: &dyn Clock, request: &ReportRequest) -> Result<()>
where
    C: ConnectionTrait,
{
    request.academic_year.parse::<AcademicYear>()?;
    if let Some(threshold) = request.passing_threshold {
        if !(0.0..=100.0).contains(&threshold) {
            return Err(Error::InvalidInput {
                message: format!("Passing threshold must be between 0 and 100, got {threshold}"),
            });
        }
    }

    School::find_by_id(request.school_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("school", request.school_id))?;

    if let Some(term_id) = request.term_id {
        let term = term_in_year(db, term_id, request.school_id, &request.academic_year).await?;
        ensure_started(&term, clock)?;
    }

    let foreign = |entity: &str, id: i64| Error::InvalidScope {
        message: format!("{entity} {id} does not belong to school {}", request.school_id),
    };

    match request.scope {
        ReportScope::Student(student_id) => {
            let student = User::find_by_id(student_id)
                .one(db)
                .await?
                .filter(|u| !u.is_deleted && u.role == user::ROLE_STUDENT)
                .ok_or_else(|| Error::not_found("student", student_id))?;
            if student.school_id != request.school_id {
                return Err(foreign("Student", student_id));
            }
        }
        ReportScope::Class(class_id) => {
            let class = Class::find_by_id(class_id)
                .one(db)
                .await?
                .filter(|c| !c.is_deleted)
                .ok_or_else(|| Error::not_found("class", class_id))?;
            if class.school_id != request.school_id {
                return Err(foreign("Class", class_id));
            }
            if class.academic_year != request.academic_year {
                return Err(Error::InvalidScope {
                    message: format!(
                        "Class {class_id} is for {}, not {}",
                        class.academic_year, request.academic_year
                    ),
                });
            }
        }
        ReportScope::Term(term_id) => {
            if request.term_id.is_some_and(|t| t != term_id) {
                return Err(Error::InvalidScope {
                    message: format!("Term scope {term_id} conflicts with term parameter"),
                });
            }
            let term = term_in_year(db, term_id, request.school_id, &request.academic_year).await?;
            ensure_started(&term, clock)?;
        }
        ReportScope::Subject(subject_id) => {
            let subject = Subject::find_by_id(subject_id)
                .one(db)
                .await?
                .ok_or_else(|| Error::not_found("subject", subject_id))?;
            if subject.school_id != request.school_id {
                return Err(foreign("Subject", subject_id));
            }
        }
        ReportScope::Trade(trade_id) => {
            let trade = Trade::find_by_id(trade_id)
                .one(db)
                .await?
                .ok_or_else(|| Error::not_found("trade", trade_id))?;
            if trade.school_id != request.school_id {
                return Err(foreign("Trade", trade_id));
            }
        }
        ReportScope::Assessment(category) => {
            AssessmentCategory::parse_single_assessment(category.as_str())?;
        }
        ReportScope::School | ReportScope::Teacher | ReportScope::ClassPerformance => {}
    }

    Ok(())
}
