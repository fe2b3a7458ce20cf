//! Exam entity - an exam definition for one subject in one term.
//!
//! `exam_type` is one of the four assessment categories and `total_points`
//! always equals the sum of the exam's question maxima.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Exam database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "exams")]
pub struct Model {
    /// Unique identifier for the exam
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Subject being examined
    pub subject_id: i64,
    /// Term the exam is sat in
    pub term_id: i64,
    /// `"assessment1"`, `"assessment2"`, `"test"` or `"exam"`
    pub exam_type: String,
    /// Sum of question maxima
    pub total_points: f64,
    /// Soft delete flag
    pub is_deleted: bool,
}

/// Defines relationships between Exam and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One exam has many questions
    #[sea_orm(has_many = "super::question::Entity")]
    Questions,
}

impl Related<super::question::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Questions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
