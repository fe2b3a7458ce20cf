//! Enrollment placement and deactivation.
//!
//! The cross-record rules (student role and school, class and term of the
//! same school and year, one enrollment per student per term) are checked here
//! explicitly rather than left to the storage layer.

use crate::{
    core::clock::Clock,
    entities::{Class, Enrollment, Term, User, class, enrollment, term, user},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*, sea_query::Expr};
use tracing::{debug, info, instrument, warn};

/// Places a student in a class for one term.
///
/// An inactive enrollment for the same term is reactivated in the new class;
/// an active one is rejected.
///
/// # Errors
/// - `Error::NotFound` if the student, class or term does not exist
/// - `Error::InvalidInput` if any of the placement rules are violated
#[instrument(skip(db, clock))]
pub async fn enroll_student<C>(
    db: &C,
    clock: &dyn Clock,
    student_id: i64,
    class_id: i64,
    term_id: i64,
) -> Result<enrollment::Model>
where
    C: ConnectionTrait,
{
    let student = User::find_by_id(student_id)
        .one(db)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| Error::not_found("student", student_id))?;
    if student.role != user::ROLE_STUDENT {
        return Err(Error::InvalidInput {
            message: format!("User {student_id} is a {}, not a student", student.role),
        });
    }
    if !student.is_active || student.is_graduated {
        return Err(Error::InvalidInput {
            message: format!("Student {student_id} is not active"),
        });
    }

    let class = Class::find_by_id(class_id)
        .one(db)
        .await?
        .filter(|c| !c.is_deleted)
        .ok_or_else(|| Error::not_found("class", class_id))?;
    let term = Term::find_by_id(term_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("term", term_id))?;

    if class.school_id != student.school_id || term.school_id != student.school_id {
        return Err(Error::InvalidInput {
            message: format!(
                "Student {student_id}, class {class_id} and term {term_id} must belong to the same school"
            ),
        });
    }
    if class.academic_year != term.academic_year {
        return Err(Error::InvalidInput {
            message: format!(
                "Class {class_id} is for {} but term {term_id} is in {}",
                class.academic_year, term.academic_year
            ),
        });
    }
    if crate::core::term::has_ended(&term, clock) {
        warn!(term_id, "Enrolling into a term that has already ended");
    }

    place_student(db, &student, &class, &term).await
}

/// Creates (or reactivates) the enrollment without re-checking school/year rules.
pub(crate) async fn place_student<C>(
    db: &C,
    student: &user::Model,
    class: &class::Model,
    term: &term::Model,
) -> Result<enrollment::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_enrollment(db, student.id, term.id).await? {
        if existing.is_active && !existing.is_deleted {
            return Err(Error::InvalidInput {
                message: format!(
                    "Student {} already has an active enrollment for term {}",
                    student.id, term.id
                ),
            });
        }
        let mut active: enrollment::ActiveModel = existing.into();
        active.class_id = Set(class.id);
        active.school_id = Set(class.school_id);
        active.is_active = Set(true);
        active.is_deleted = Set(false);
        let reactivated = active.update(db).await?;
        debug!(enrollment_id = reactivated.id, "Reactivated enrollment");
        return Ok(reactivated);
    }

    let created = enrollment::ActiveModel {
        student_id: Set(student.id),
        class_id: Set(class.id),
        term_id: Set(term.id),
        school_id: Set(class.school_id),
        is_active: Set(true),
        is_deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(
        enrollment_id = created.id,
        student_id = student.id,
        class_id = class.id,
        term_id = term.id,
        "Enrolled student"
    );
    Ok(created)
}

/// The student's enrollment for a term, active or not.
pub async fn find_enrollment<C>(
    db: &C,
    student_id: i64,
    term_id: i64,
) -> Result<Option<enrollment::Model>>
where
    C: ConnectionTrait,
{
    Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::TermId.eq(term_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Active, non-deleted enrollments of a school in any of `term_ids`.
pub async fn active_enrollments_in_terms<C>(
    db: &C,
    school_id: i64,
    term_ids: &[i64],
) -> Result<Vec<enrollment::Model>>
where
    C: ConnectionTrait,
{
    Enrollment::find()
        .filter(enrollment::Column::SchoolId.eq(school_id))
        .filter(enrollment::Column::TermId.is_in(term_ids.iter().copied()))
        .filter(enrollment::Column::IsActive.eq(true))
        .filter(enrollment::Column::IsDeleted.eq(false))
        .all(db)
        .await
        .map_err(Into::into)
}

/// Deactivates a student's active enrollments in `term_ids`.
///
/// Enrollments are never deleted. Returns the number of rows changed.
pub async fn deactivate_student_enrollments<C>(
    db: &C,
    student_id: i64,
    term_ids: &[i64],
) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = Enrollment::update_many()
        .col_expr(enrollment::Column::IsActive, Expr::value(false))
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::TermId.is_in(term_ids.iter().copied()))
        .filter(enrollment::Column::IsActive.eq(true))
        .exec(db)
        .await?;
    debug!(student_id, rows = result.rows_affected, "Deactivated enrollments");
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_enroll_student_rejects_second_active_enrollment() -> Result<()> {
        let fx = setup_school().await?;
        let student = create_enrolled_student(&fx.db, &fx, "Alice").await?;

        let result = enroll_student(&fx.db, &test_clock(), student.id, fx.class.id, fx.terms[0].id).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let second = enroll_student(&fx.db, &test_clock(), student.id, fx.class.id, fx.terms[1].id).await?;
        assert!(second.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_enroll_student_rejects_teacher_and_foreign_school() -> Result<()> {
        let fx = setup_school().await?;
        let teacher = create_test_teacher(&fx.db, &fx, "Mr. Smith").await?;
        let result = enroll_student(&fx.db, &test_clock(), teacher.id, fx.class.id, fx.terms[0].id).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let other = setup_second_school(&fx.db).await?;
        let outsider = create_test_student(&fx.db, other.id, "Outsider").await?;
        let result = enroll_student(&fx.db, &test_clock(), outsider.id, fx.class.id, fx.terms[0].id).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = enroll_student(&fx.db, &test_clock(), 9999, fx.class.id, fx.terms[0].id).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_enroll_student_rejects_term_of_other_year() -> Result<()> {
        let fx = setup_school().await?;
        let student = create_test_student(&fx.db, fx.school.id, "Bob").await?;
        let next_term = crate::core::term::create_term(
            &fx.db,
            fx.school.id,
            "2025-2026",
            1,
            chrono::NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2025, 12, 15).unwrap(),
        )
        .await?;

        let clock = FixedClock::on(chrono::NaiveDate::from_ymd_opt(2025, 9, 2).unwrap());
        let result = enroll_student(&fx.db, &clock, student.id, fx.class.id, next_term.id).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivate_then_reenroll_reactivates() -> Result<()> {
        let fx = setup_school().await?;
        let student = create_enrolled_student(&fx.db, &fx, "Carol").await?;

        let changed = deactivate_student_enrollments(&fx.db, student.id, &[fx.terms[0].id]).await?;
        assert_eq!(changed, 1);
        let active = active_enrollments_in_terms(&fx.db, fx.school.id, &[fx.terms[0].id]).await?;
        assert!(active.is_empty());

        let again = enroll_student(&fx.db, &test_clock(), student.id, fx.class.id, fx.terms[0].id).await?;
        assert!(again.is_active);
        let count = Enrollment::find()
            .filter(enrollment::Column::StudentId.eq(student.id))
            .count(&fx.db)
            .await?;
        assert_eq!(count, 1);
        Ok(())
    }
}
