//! Term management: creation with validation, academic-year completeness and
//! the term window checks report generation relies on.

use crate::{
    config::settings::TermWindow,
    core::{clock::Clock, level::AcademicYear},
    entities::{School, Term, term},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{info, instrument};

/// Number of terms that make up a complete academic year
pub const TERMS_PER_YEAR: usize = 3;

/// Creates a term after validating its number and date range.
///
/// # Errors
/// - `Error::NotFound` if the school does not exist
/// - `Error::InvalidInput` if `term_number` is outside 1..=3, `start_date` is
///   not before `end_date`, the academic year is malformed, or the school
///   already has that term number for the year
#[instrument(skip(db))]
pub async fn create_term<C>(
    db: &C,
    school_id: i64,
    academic_year: &str,
    term_number: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<term::Model>
where
    C: ConnectionTrait,
{
    academic_year.parse::<AcademicYear>()?;
    if !(1..=3).contains(&term_number) {
        return Err(Error::InvalidInput {
            message: format!("Term number must be between 1 and 3, got {term_number}"),
        });
    }
    if start_date >= end_date {
        return Err(Error::InvalidInput {
            message: format!("Term start {start_date} must be before end {end_date}"),
        });
    }
    School::find_by_id(school_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("school", school_id))?;

    if find_term_by_number(db, school_id, academic_year, term_number)
        .await?
        .is_some()
    {
        return Err(Error::InvalidInput {
            message: format!(
                "School {school_id} already has term {term_number} for {academic_year}"
            ),
        });
    }

    let created = term::ActiveModel {
        school_id: Set(school_id),
        academic_year: Set(academic_year.to_string()),
        term_number: Set(term_number),
        start_date: Set(start_date),
        end_date: Set(end_date),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(term_id = created.id, "Created term {term_number} of {academic_year}");
    Ok(created)
}

/// Looks up a school's term by number.
pub async fn find_term_by_number<C>(
    db: &C,
    school_id: i64,
    academic_year: &str,
    term_number: i32,
) -> Result<Option<term::Model>>
where
    C: ConnectionTrait,
{
    Term::find()
        .filter(term::Column::SchoolId.eq(school_id))
        .filter(term::Column::AcademicYear.eq(academic_year))
        .filter(term::Column::TermNumber.eq(term_number))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All terms of a school's academic year ordered by term number.
pub async fn terms_for_year<C>(db: &C, school_id: i64, academic_year: &str) -> Result<Vec<term::Model>>
where
    C: ConnectionTrait,
{
    Term::find()
        .filter(term::Column::SchoolId.eq(school_id))
        .filter(term::Column::AcademicYear.eq(academic_year))
        .order_by_asc(term::Column::TermNumber)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns the year's terms if all three exist.
///
/// # Errors
/// Returns `Error::IncompleteAcademicYear` when fewer than three terms exist.
pub async fn ensure_complete_year<C>(
    db: &C,
    school_id: i64,
    academic_year: &str,
) -> Result<Vec<term::Model>>
where
    C: ConnectionTrait,
{
    let terms = terms_for_year(db, school_id, academic_year).await?;
    let mut numbers: Vec<i32> = terms.iter().map(|t| t.term_number).collect();
    numbers.dedup();
    if numbers.len() < TERMS_PER_YEAR {
        return Err(Error::IncompleteAcademicYear {
            school_id,
            academic_year: academic_year.to_string(),
            found: numbers.len(),
        });
    }
    Ok(terms)
}

/// Finds term 1 of `academic_year`, creating it from `window` if missing.
///
/// The window is anchored on the first calendar year of the academic year.
pub async fn find_or_create_first_term<C>(
    db: &C,
    school_id: i64,
    academic_year: AcademicYear,
    window: &TermWindow,
) -> Result<term::Model>
where
    C: ConnectionTrait,
{
    let year = academic_year.to_string();
    if let Some(existing) = find_term_by_number(db, school_id, &year, 1).await? {
        return Ok(existing);
    }

    let (start_date, end_date) = window.dates_in(academic_year.start_year())?;
    create_term(db, school_id, &year, 1, start_date, end_date).await
}

/// Loads a term and checks it belongs to the school and academic year.
///
/// # Errors
/// - `Error::NotFound` if the term does not exist
/// - `Error::InvalidScope` if it belongs to another school or year
pub async fn term_in_year<C>(
    db: &C,
    term_id: i64,
    school_id: i64,
    academic_year: &str,
) -> Result<term::Model>
where
    C: ConnectionTrait,
{
    let found = Term::find_by_id(term_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("term", term_id))?;
    if found.school_id != school_id || found.academic_year != academic_year {
        return Err(Error::InvalidScope {
            message: format!(
                "Term {term_id} belongs to school {} year {}, not school {school_id} year {academic_year}",
                found.school_id, found.academic_year
            ),
        });
    }
    Ok(found)
}

/// Fails with `Error::TermNotStarted` if `term` starts after today.
pub fn ensure_started(term: &term::Model, clock: &dyn Clock) -> Result<()> {
    if clock.today() < term.start_date {
        return Err(Error::TermNotStarted {
            term_id: term.id,
            starts_on: term.start_date,
        });
    }
    Ok(())
}

/// Whether `term` ended before today.
#[must_use]
pub fn has_ended(term: &term::Model, clock: &dyn Clock) -> bool {
    clock.today() > term.end_date
}
