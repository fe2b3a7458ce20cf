//! Submission scoring upkeep.
//!
//! Keeps the derived totals consistent with their parts: a submission's
//! `total_score` with its answer scores, and an exam's `total_points` with its
//! question maxima. Grading itself happens upstream; these functions only
//! store what graders produced.

use crate::{
    entities::{AnswerScore, Exam, Question, Submission, answer_score, exam, question, submission},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// One graded (or pending) answer to store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerInput {
    /// Question answered; must belong to the submission's exam
    pub question_id: i64,
    /// Points awarded
    pub score: f64,
    /// Whether a grader confirmed the score
    pub graded: bool,
}

/// Replaces a submission's answer scores and recomputes its `total_score`.
///
/// Answers are stored in the order given. Scores must be finite, non-negative
/// and no larger than the question's maximum.
#[instrument(skip(db, answers))]
pub async fn record_answers<C>(
    db: &C,
    submission_id: i64,
    answers: &[AnswerInput],
) -> Result<submission::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let sub = Submission::find_by_id(submission_id)
        .one(&txn)
        .await?
        .filter(|s| !s.is_deleted)
        .ok_or_else(|| Error::not_found("submission", submission_id))?;

    let maxima: HashMap<i64, f64> = Question::find()
        .filter(question::Column::ExamId.eq(sub.exam_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|q| (q.id, q.max_score))
        .collect();

    for answer in answers {
        let Some(max_score) = maxima.get(&answer.question_id) else {
            return Err(Error::InvalidInput {
                message: format!(
                    "Question {} is not part of exam {}",
                    answer.question_id, sub.exam_id
                ),
            });
        };
        if !answer.score.is_finite() || answer.score < 0.0 || answer.score > *max_score {
            return Err(Error::InvalidInput {
                message: format!(
                    "Score {} for question {} must be between 0 and {max_score}",
                    answer.score, answer.question_id
                ),
            });
        }
    }

    AnswerScore::delete_many()
        .filter(answer_score::Column::SubmissionId.eq(submission_id))
        .exec(&txn)
        .await?;

    for (position, answer) in (1_i32..).zip(answers) {
        answer_score::ActiveModel {
            submission_id: Set(submission_id),
            question_id: Set(answer.question_id),
            position: Set(position),
            score: Set(answer.score),
            graded: Set(answer.graded),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    let updated = recompute_total_score(&txn, submission_id).await?;
    txn.commit().await?;
    Ok(updated)
}

/// Recomputes `total_score` as the sum of the submission's answer scores.
pub async fn recompute_total_score<C>(db: &C, submission_id: i64) -> Result<submission::Model>
where
    C: ConnectionTrait,
{
    let sub = Submission::find_by_id(submission_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("submission", submission_id))?;

    let total: f64 = AnswerScore::find()
        .filter(answer_score::Column::SubmissionId.eq(submission_id))
        .all(db)
        .await?
        .iter()
        .map(|a| a.score)
        .sum();

    debug!(submission_id, total, "Recomputed submission total");
    let mut active: submission::ActiveModel = sub.into();
    active.total_score = Set(total);
    active.update(db).await.map_err(Into::into)
}

/// Marks a submission graded once every answer carries a confirmed score.
pub async fn mark_graded<C>(db: &C, submission_id: i64) -> Result<submission::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let answers = AnswerScore::find()
        .filter(answer_score::Column::SubmissionId.eq(submission_id))
        .order_by_asc(answer_score::Column::Position)
        .all(&txn)
        .await?;
    if let Some(pending) = answers.iter().find(|a| !a.graded) {
        return Err(Error::InvalidInput {
            message: format!(
                "Submission {submission_id} still has an ungraded answer for question {}",
                pending.question_id
            ),
        });
    }

    let sub = recompute_total_score(&txn, submission_id).await?;
    let mut active: submission::ActiveModel = sub.into();
    active.status = Set(submission::STATUS_GRADED.to_string());
    let graded = active.update(&txn).await?;

    txn.commit().await?;
    Ok(graded)
}

/// Recomputes an exam's `total_points` as the sum of its question maxima.
pub async fn sync_exam_total_points<C>(db: &C, exam_id: i64) -> Result<exam::Model>
where
    C: ConnectionTrait,
{
    let found = Exam::find_by_id(exam_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("exam", exam_id))?;

    let total: f64 = Question::find()
        .filter(question::Column::ExamId.eq(exam_id))
        .all(db)
        .await?
        .iter()
        .map(|q| q.max_score)
        .sum();

    let mut active: exam::ActiveModel = found.into();
    active.total_points = Set(total);
    active.update(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_record_answers_recomputes_total() -> Result<()> {
        let fx = setup_school().await?;
        let subject = create_test_subject(&fx.db, &fx, "Physics", None).await?;
        let exam = create_test_exam(&fx.db, subject.id, fx.terms[0].id, "exam", &[10.0, 20.0]).await?;
        let student = create_enrolled_student(&fx.db, &fx, "Alice").await?;
        let sub = create_submission(&fx.db, exam.id, student.id, &[], submission::STATUS_SUBMITTED).await?;
        let questions = question_ids(&fx.db, exam.id).await?;

        let updated = record_answers(
            &fx.db,
            sub.id,
            &[
                AnswerInput { question_id: questions[0], score: 8.0, graded: true },
                AnswerInput { question_id: questions[1], score: 15.5, graded: true },
            ],
        )
        .await?;
        assert_eq!(updated.total_score, 23.5);

        // Replacing answers replaces the total as well
        let updated = record_answers(
            &fx.db,
            sub.id,
            &[AnswerInput { question_id: questions[0], score: 2.0, graded: true }],
        )
        .await?;
        assert_eq!(updated.total_score, 2.0);
        let stored = AnswerScore::find()
            .filter(answer_score::Column::SubmissionId.eq(sub.id))
            .count(&fx.db)
            .await?;
        assert_eq!(stored, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_answers_rejects_score_above_maximum() -> Result<()> {
        let fx = setup_school().await?;
        let subject = create_test_subject(&fx.db, &fx, "Physics", None).await?;
        let exam = create_test_exam(&fx.db, subject.id, fx.terms[0].id, "exam", &[10.0]).await?;
        let student = create_enrolled_student(&fx.db, &fx, "Bob").await?;
        let sub = create_submission(&fx.db, exam.id, student.id, &[], submission::STATUS_SUBMITTED).await?;
        let questions = question_ids(&fx.db, exam.id).await?;

        let result = record_answers(
            &fx.db,
            sub.id,
            &[AnswerInput { question_id: questions[0], score: 11.0, graded: true }],
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = record_answers(
            &fx.db,
            sub.id,
            &[AnswerInput { question_id: 9999, score: 1.0, graded: true }],
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_graded_requires_all_answers_graded() -> Result<()> {
        let fx = setup_school().await?;
        let subject = create_test_subject(&fx.db, &fx, "Physics", None).await?;
        let exam = create_test_exam(&fx.db, subject.id, fx.terms[0].id, "exam", &[10.0, 10.0]).await?;
        let student = create_enrolled_student(&fx.db, &fx, "Carol").await?;
        let sub = create_submission(&fx.db, exam.id, student.id, &[], submission::STATUS_SUBMITTED).await?;
        let questions = question_ids(&fx.db, exam.id).await?;

        record_answers(
            &fx.db,
            sub.id,
            &[
                AnswerInput { question_id: questions[0], score: 5.0, graded: true },
                AnswerInput { question_id: questions[1], score: 4.0, graded: false },
            ],
        )
        .await?;
        assert!(matches!(
            mark_graded(&fx.db, sub.id).await,
            Err(Error::InvalidInput { .. })
        ));

        record_answers(
            &fx.db,
            sub.id,
            &[
                AnswerInput { question_id: questions[0], score: 5.0, graded: true },
                AnswerInput { question_id: questions[1], score: 4.0, graded: true },
            ],
        )
        .await?;
        let graded = mark_graded(&fx.db, sub.id).await?;
        assert_eq!(graded.status, submission::STATUS_GRADED);
        assert_eq!(graded.total_score, 9.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_exam_total_points() -> Result<()> {
        let fx = setup_school().await?;
        let subject = create_test_subject(&fx.db, &fx, "Physics", None).await?;
        let exam = create_test_exam(&fx.db, subject.id, fx.terms[0].id, "exam", &[10.0, 15.0, 25.0]).await?;

        let mut active: exam::ActiveModel = exam.clone().into();
        active.total_points = Set(0.0);
        active.update(&fx.db).await?;

        let synced = sync_exam_total_points(&fx.db, exam.id).await?;
        assert_eq!(synced.total_points, 50.0);
        Ok(())
    }
}
