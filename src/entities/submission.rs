//! Submission entity - one student's attempt at one exam.
//!
//! Unique per (`student_id`, `exam_id`). `total_score` is derived from the
//! submission's answer scores and recomputed whenever they change.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status value of a submission that is still being answered
pub const STATUS_IN_PROGRESS: &str = "in-progress";
/// Status value of a submission handed in by the student
pub const STATUS_SUBMITTED: &str = "submitted";
/// Status value of a submission closed by the exam timer
pub const STATUS_AUTO_SUBMITTED: &str = "auto-submitted";
/// Status value of a fully graded submission; the only one reports consume
pub const STATUS_GRADED: &str = "graded";

/// Submission database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    /// Unique identifier for the submission
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Exam being answered
    pub exam_id: i64,
    /// Student answering
    pub student_id: i64,
    /// One of the `STATUS_*` values
    pub status: String,
    /// Sum of the answer scores
    pub total_score: f64,
    /// Soft delete flag
    pub is_deleted: bool,
}

/// Defines relationships between Submission and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One submission owns many answer scores
    #[sea_orm(has_many = "super::answer_score::Entity")]
    AnswerScores,
}

impl Related<super::answer_score::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AnswerScores.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
