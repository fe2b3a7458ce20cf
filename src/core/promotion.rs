//! Year-end promotion engine.
//!
//! For one school and academic year every student with an active enrollment
//! is decided once:
//! - passed (deciding report card average >= 50) below the last level:
//!   promoted into the next level's class of the same trade, enrolled in term 1
//!   of the next academic year;
//! - passed at the last level: graduated;
//! - failed, or no report card: repeated.
//!
//! Each decision writes exactly one immutable [`promotion_log`] row. The whole
//! run is one transaction and each student runs in a savepoint, so a student
//! that cannot be decided is rolled back alone while the others commit.

use crate::{
    config::settings::PromotionSettings,
    core::{
        clock::Clock,
        enrollment::{active_enrollments_in_terms, deactivate_student_enrollments, find_enrollment, place_student},
        level::{AcademicYear, Level},
        term::{ensure_complete_year, find_or_create_first_term, terms_for_year},
    },
    entities::{
        Class, PromotionLog, ReportCard, School, Trade, User, class, enrollment, promotion_log,
        report_card, term, user,
    },
    errors::{Error, ErrorCategory, Result},
};
use sea_orm::{DbErr, QueryOrder, Set, SqlErr, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

/// Minimum report card average that counts as a pass.
///
/// Fixed; the card's own `passing_threshold` is not consulted.
pub const PROMOTION_PASS_AVERAGE: f64 = 50.0;

/// Outcome recorded in a promotion log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStatus {
    /// Moved to the next level
    Promoted,
    /// Stays at the same level, no new enrollment
    Repeated,
    /// Completed the last level
    Graduated,
    /// Removed from the school (manual decisions only)
    Expelled,
}

impl PromotionStatus {
    /// Stored value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Promoted => "promoted",
            Self::Repeated => "repeated",
            Self::Graduated => "graduated",
            Self::Expelled => "expelled",
        }
    }

    /// Whether an existing log with this status settles the student for the year
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Promoted | Self::Graduated)
    }
}

impl FromStr for PromotionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "promoted" => Ok(Self::Promoted),
            "repeated" => Ok(Self::Repeated),
            "graduated" => Ok(Self::Graduated),
            "expelled" => Ok(Self::Expelled),
            other => Err(Error::InvalidInput {
                message: format!("Unknown promotion status '{other}'"),
            }),
        }
    }
}

impl fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts from one promotion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionSummary {
    /// Students with an active enrollment in the year
    pub evaluated: usize,
    /// Students moved to the next level
    pub promoted: usize,
    /// Students kept at their level
    pub repeated: usize,
    /// Students who completed the last level
    pub graduated: usize,
    /// Students already promoted or graduated for the year
    pub already_decided: usize,
    /// Students whose promotion would cross trades
    pub blocked: usize,
    /// Students whose log insert lost a race with another run
    pub duplicates: usize,
    /// Students skipped because their records were inconsistent
    pub failed: usize,
}

impl PromotionSummary {
    fn record(&mut self, status: PromotionStatus) {
        match status {
            PromotionStatus::Promoted => self.promoted += 1,
            PromotionStatus::Repeated => self.repeated += 1,
            PromotionStatus::Graduated => self.graduated += 1,
            PromotionStatus::Expelled => {}
        }
    }
}

/// A decision made by hand for one student
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualDecision {
    /// Promote into an explicit class of the next academic year
    Promote {
        /// Destination class
        to_class_id: i64,
    },
    /// Keep the student at the current level
    Repeat,
    /// Mark the student graduated
    Graduate,
    /// Remove the student from the school
    Expel,
}

/// Everything fixed for the duration of one run
struct RunContext<'a> {
    clock: &'a dyn Clock,
    settings: &'a PromotionSettings,
    school_id: i64,
    year: AcademicYear,
    academic_year: String,
    terms: &'a [term::Model],
    is_manual: bool,
}

impl RunContext<'_> {
    fn term_ids(&self) -> Vec<i64> {
        self.terms.iter().map(|t| t.id).collect()
    }

    fn term_number(&self, term_id: i64) -> i32 {
        self.terms
            .iter()
            .find(|t| t.id == term_id)
            .map_or(0, |t| t.term_number)
    }
}

/// Runs the automatic promotion for every actively enrolled student.
///
/// # Errors
/// - `Error::InvalidInput` for a malformed academic year
/// - `Error::NotFound` if the school does not exist
/// - `Error::IncompleteAcademicYear` if the year lacks any of its three terms;
///   no student is touched in that case
/// - `Error::Database` on storage failure, after which nothing is committed
///
/// Per-student consistency problems are logged and counted in the summary.
#[instrument(skip(db, clock, settings))]
pub async fn run_promotion<C>(
    db: &C,
    clock: &dyn Clock,
    settings: &PromotionSettings,
    school_id: i64,
    academic_year: &str,
) -> Result<PromotionSummary>
where
    C: ConnectionTrait + TransactionTrait,
{
    let year: AcademicYear = academic_year.parse()?;
    let txn = db.begin().await?;

    School::find_by_id(school_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("school", school_id))?;
    let terms = ensure_complete_year(&txn, school_id, academic_year).await?;

    let ctx = RunContext {
        clock,
        settings,
        school_id,
        year,
        academic_year: academic_year.to_string(),
        terms: &terms,
        is_manual: false,
    };

    // One evaluation per student, on the enrollment of the latest term.
    let mut latest: BTreeMap<i64, enrollment::Model> = BTreeMap::new();
    for enrollment in active_enrollments_in_terms(&txn, school_id, &ctx.term_ids()).await? {
        let replace = latest.get(&enrollment.student_id).is_none_or(|current| {
            ctx.term_number(enrollment.term_id) > ctx.term_number(current.term_id)
        });
        if replace {
            latest.insert(enrollment.student_id, enrollment);
        }
    }

    let decided: HashMap<i64, String> = PromotionLog::find()
        .filter(promotion_log::Column::SchoolId.eq(school_id))
        .filter(promotion_log::Column::AcademicYear.eq(academic_year))
        .all(&txn)
        .await?
        .into_iter()
        .map(|log| (log.student_id, log.status))
        .collect();

    let mut summary = PromotionSummary {
        evaluated: latest.len(),
        ..PromotionSummary::default()
    };

    for (student_id, enrollment) in latest {
        if decided
            .get(&student_id)
            .and_then(|status| status.parse::<PromotionStatus>().ok())
            .is_some_and(PromotionStatus::is_final)
        {
            debug!(student_id, "Already decided for the year, skipping");
            summary.already_decided += 1;
            continue;
        }

        let savepoint = txn.begin().await?;
        match decide_student(&savepoint, &ctx, &enrollment).await {
            Ok(log) => {
                savepoint.commit().await?;
                summary.record(log_status(&log));
            }
            Err(err) => {
                savepoint.rollback().await?;
                match err {
                    Error::CrossTradeMismatch { .. } => {
                        warn!(student_id, "Promotion blocked: {err}");
                        summary.blocked += 1;
                    }
                    Error::DuplicatePromotion { .. } => {
                        warn!(student_id, "Promotion already recorded by another run");
                        summary.duplicates += 1;
                    }
                    Error::Database(_) => return Err(err),
                    other if other.category() == ErrorCategory::Internal => return Err(other),
                    other => {
                        warn!(student_id, "Skipping student: {other}");
                        summary.failed += 1;
                    }
                }
            }
        }
    }

    txn.commit().await?;
    info!(
        promoted = summary.promoted,
        repeated = summary.repeated,
        graduated = summary.graduated,
        blocked = summary.blocked,
        "Promotion run finished for {academic_year}"
    );
    Ok(summary)
}

fn log_status(log: &promotion_log::Model) -> PromotionStatus {
    log.status.parse().unwrap_or(PromotionStatus::Repeated)
}

async fn decide_student<C>(
    db: &C,
    ctx: &RunContext<'_>,
    enrollment: &enrollment::Model,
) -> Result<promotion_log::Model>
where
    C: ConnectionTrait,
{
    let student_id = enrollment.student_id;
    let from_class = Class::find_by_id(enrollment.class_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("class", enrollment.class_id))?;
    let level: Level = from_class.level.parse()?;

    let passed = deciding_card(db, ctx, student_id, from_class.id)
        .await?
        .is_some_and(|card| card.average >= PROMOTION_PASS_AVERAGE);

    if !passed {
        deactivate_student_enrollments(db, student_id, &ctx.term_ids()).await?;
        return write_log(db, ctx, student_id, PromotionStatus::Repeated, &from_class, None).await;
    }

    let Some(next_level) = level.next() else {
        deactivate_student_enrollments(db, student_id, &ctx.term_ids()).await?;
        mark_graduated(db, student_id).await?;
        return write_log(db, ctx, student_id, PromotionStatus::Graduated, &from_class, None).await;
    };

    let next_year = ctx.year.next()?;
    let first_term = find_or_create_first_term(db, ctx.school_id, next_year, &ctx.settings.first_term).await?;
    // Always in the student's trade; a cross-trade block can only come from
    // an existing placement.
    let target = locate_or_create_class(db, &from_class, next_level, next_year).await?;

    let existing = find_enrollment(db, student_id, first_term.id).await?;
    if let Some(existing) = existing.as_ref().filter(|e| e.is_active && !e.is_deleted) {
        let placed_in = Class::find_by_id(existing.class_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("class", existing.class_id))?;
        if placed_in.trade_id != from_class.trade_id {
            return Err(Error::CrossTradeMismatch {
                student_id,
                expected_trade: from_class.trade_id,
                found_trade: placed_in.trade_id,
            });
        }
    }

    deactivate_student_enrollments(db, student_id, &ctx.term_ids()).await?;
    let student = User::find_by_id(student_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("student", student_id))?;
    let placed = match existing.filter(|e| e.is_active && !e.is_deleted) {
        Some(already) => already,
        None => place_student(db, &student, &target, &first_term).await?,
    };
    debug!(student_id, enrollment_id = placed.id, class_id = placed.class_id, "Promoted");

    write_log(db, ctx, student_id, PromotionStatus::Promoted, &from_class, Some(placed.class_id)).await
}

/// The year-wide card if one exists, else the card of the latest term.
async fn deciding_card<C>(
    db: &C,
    ctx: &RunContext<'_>,
    student_id: i64,
    class_id: i64,
) -> Result<Option<report_card::Model>>
where
    C: ConnectionTrait,
{
    let cards = ReportCard::find()
        .filter(report_card::Column::StudentId.eq(student_id))
        .filter(report_card::Column::ClassId.eq(class_id))
        .filter(report_card::Column::SchoolId.eq(ctx.school_id))
        .filter(report_card::Column::AcademicYear.eq(ctx.academic_year.as_str()))
        .order_by_asc(report_card::Column::Id)
        .all(db)
        .await?;

    if let Some(year_wide) = cards.iter().find(|c| c.term_id.is_none()) {
        return Ok(Some(year_wide.clone()));
    }
    Ok(cards
        .into_iter()
        .filter(|c| c.term_id.is_some())
        .max_by_key(|c| c.term_id.map_or(0, |t| ctx.term_number(t))))
}

/// Finds the active class of the same school and trade at `level` for `year`,
/// creating it when none exists.
async fn locate_or_create_class<C>(
    db: &C,
    from_class: &class::Model,
    level: Level,
    year: AcademicYear,
) -> Result<class::Model>
where
    C: ConnectionTrait,
{
    let year = year.to_string();
    if let Some(found) = Class::find()
        .filter(class::Column::SchoolId.eq(from_class.school_id))
        .filter(class::Column::TradeId.eq(from_class.trade_id))
        .filter(class::Column::Level.eq(level.as_str()))
        .filter(class::Column::AcademicYear.eq(year.as_str()))
        .filter(class::Column::IsActive.eq(true))
        .filter(class::Column::IsDeleted.eq(false))
        .order_by_asc(class::Column::Id)
        .one(db)
        .await?
    {
        return Ok(found);
    }

    let trade = Trade::find_by_id(from_class.trade_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("trade", from_class.trade_id))?;
    let created = class::ActiveModel {
        school_id: Set(from_class.school_id),
        trade_id: Set(from_class.trade_id),
        level: Set(level.as_str().to_string()),
        academic_year: Set(year.clone()),
        name: Set(format!("{level} {}", trade.code)),
        is_active: Set(true),
        is_deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(class_id = created.id, "Created {level} class for {year}");
    Ok(created)
}

async fn mark_graduated<C>(db: &C, student_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let student = User::find_by_id(student_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("student", student_id))?;
    let mut active: user::ActiveModel = student.into();
    active.is_graduated = Set(true);
    active.update(db).await?;
    Ok(())
}

async fn write_log<C>(
    db: &C,
    ctx: &RunContext<'_>,
    student_id: i64,
    status: PromotionStatus,
    from_class: &class::Model,
    to_class_id: Option<i64>,
) -> Result<promotion_log::Model>
where
    C: ConnectionTrait,
{
    promotion_log::ActiveModel {
        student_id: Set(student_id),
        school_id: Set(ctx.school_id),
        academic_year: Set(ctx.academic_year.clone()),
        status: Set(status.as_str().to_string()),
        from_class_id: Set(from_class.id),
        to_class_id: Set(to_class_id),
        is_manual: Set(ctx.is_manual),
        created_at: Set(ctx.clock.now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|err| duplicate_or(err, student_id, &ctx.academic_year))
}

fn duplicate_or(err: DbErr, student_id: i64, academic_year: &str) -> Error {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        Error::DuplicatePromotion {
            student_id,
            academic_year: academic_year.to_string(),
        }
    } else {
        err.into()
    }
}

/// Records a manual decision for one student.
///
/// Unlike the automatic run, any existing log for the year rejects the call.
///
/// # Errors
/// - `Error::DuplicatePromotion` if the student already has a log for the year
/// - `Error::InvalidInput` if the student has no active enrollment in the year
/// - `Error::CrossTradeMismatch` if the destination class is of another trade
/// - `Error::InvalidScope` if the destination class is not in the school's next year
#[instrument(skip(db, clock, settings))]
pub async fn record_manual_decision<C>(
    db: &C,
    clock: &dyn Clock,
    settings: &PromotionSettings,
    student_id: i64,
    academic_year: &str,
    decision: ManualDecision,
) -> Result<promotion_log::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let year: AcademicYear = academic_year.parse()?;
    let txn = db.begin().await?;

    let student = User::find_by_id(student_id)
        .one(&txn)
        .await?
        .filter(|u| !u.is_deleted && u.role == user::ROLE_STUDENT)
        .ok_or_else(|| Error::not_found("student", student_id))?;

    let existing = PromotionLog::find()
        .filter(promotion_log::Column::StudentId.eq(student_id))
        .filter(promotion_log::Column::AcademicYear.eq(academic_year))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(Error::DuplicatePromotion {
            student_id,
            academic_year: academic_year.to_string(),
        });
    }

    let terms = terms_for_year(&txn, student.school_id, academic_year).await?;
    let ctx = RunContext {
        clock,
        settings,
        school_id: student.school_id,
        year,
        academic_year: academic_year.to_string(),
        terms: &terms,
        is_manual: true,
    };

    let enrollment = active_enrollments_in_terms(&txn, student.school_id, &ctx.term_ids())
        .await?
        .into_iter()
        .filter(|e| e.student_id == student_id)
        .max_by_key(|e| ctx.term_number(e.term_id))
        .ok_or_else(|| Error::InvalidInput {
            message: format!("Student {student_id} has no active enrollment in {academic_year}"),
        })?;
    let from_class = Class::find_by_id(enrollment.class_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("class", enrollment.class_id))?;

    let log = match decision {
        ManualDecision::Promote { to_class_id } => {
            let next_year = year.next()?;
            let target = Class::find_by_id(to_class_id)
                .one(&txn)
                .await?
                .filter(|c| !c.is_deleted)
                .ok_or_else(|| Error::not_found("class", to_class_id))?;
            if target.school_id != student.school_id
                || target.academic_year != next_year.to_string()
            {
                return Err(Error::InvalidScope {
                    message: format!(
                        "Class {to_class_id} is not a {} class of school {}",
                        next_year,
                        student.school_id
                    ),
                });
            }
            if target.trade_id != from_class.trade_id {
                return Err(Error::CrossTradeMismatch {
                    student_id,
                    expected_trade: from_class.trade_id,
                    found_trade: target.trade_id,
                });
            }
            let first_term =
                find_or_create_first_term(&txn, student.school_id, next_year, &settings.first_term).await?;
            deactivate_student_enrollments(&txn, student_id, &ctx.term_ids()).await?;
            place_student(&txn, &student, &target, &first_term).await?;
            write_log(&txn, &ctx, student_id, PromotionStatus::Promoted, &from_class, Some(target.id)).await?
        }
        ManualDecision::Repeat => {
            deactivate_student_enrollments(&txn, student_id, &ctx.term_ids()).await?;
            write_log(&txn, &ctx, student_id, PromotionStatus::Repeated, &from_class, None).await?
        }
        ManualDecision::Graduate => {
            deactivate_student_enrollments(&txn, student_id, &ctx.term_ids()).await?;
            mark_graduated(&txn, student_id).await?;
            write_log(&txn, &ctx, student_id, PromotionStatus::Graduated, &from_class, None).await?
        }
        ManualDecision::Expel => {
            deactivate_student_enrollments(&txn, student_id, &ctx.term_ids()).await?;
            let mut active: user::ActiveModel = student.clone().into();
            active.is_active = Set(false);
            active.update(&txn).await?;
            write_log(&txn, &ctx, student_id, PromotionStatus::Expelled, &from_class, None).await?
        }
    };

    txn.commit().await?;
    info!(student_id, status = %log.status, "Recorded manual promotion decision");
    Ok(log)
}

/// Promotion logs of a school's academic year ordered by student.
pub async fn list_promotion_logs<C>(
    db: &C,
    school_id: i64,
    academic_year: &str,
) -> Result<Vec<promotion_log::Model>>
where
    C: ConnectionTrait,
{
    PromotionLog::find()
        .filter(promotion_log::Column::SchoolId.eq(school_id))
        .filter(promotion_log::Column::AcademicYear.eq(academic_year))
        .order_by_asc(promotion_log::Column::StudentId)
        .all(db)
        .await
        .map_err(Into::into)
}
