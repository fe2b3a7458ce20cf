//! Answer score entity - the score awarded to one answered question.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Answer score database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "answer_scores")]
pub struct Model {
    /// Unique identifier for the answer score
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning submission
    pub submission_id: i64,
    /// Question answered
    pub question_id: i64,
    /// Order within the submission
    pub position: i32,
    /// Points awarded
    pub score: f64,
    /// Whether a grader has confirmed the score
    pub graded: bool,
}

/// Defines relationships between `AnswerScore` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each answer score belongs to one submission
    #[sea_orm(
        belongs_to = "super::submission::Entity",
        from = "Column::SubmissionId",
        to = "super::submission::Column::Id",
        on_delete = "Cascade"
    )]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
