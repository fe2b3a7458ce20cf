//! Report card entity - the materialized per-student aggregate of one scope.
//!
//! Unique per (`student_id`, `class_id`, `academic_year`, `term_id`, `school_id`).
//! A `term_id` of `None` marks a year-wide card. Content is fully replaced on
//! every regeneration; `rank` is written afterwards by the ranking engine.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Report card database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "report_cards")]
pub struct Model {
    /// Unique identifier for the report card
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student reported on
    pub student_id: i64,
    /// Class the student was enrolled in
    pub class_id: i64,
    /// School of the class
    pub school_id: i64,
    /// Term covered, `None` for the whole academic year
    pub term_id: Option<i64>,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// Sum of subject totals
    pub total_score: f64,
    /// `total_score` divided by the number of subjects
    pub average: f64,
    /// Scope-relative rank, 0 until ranked
    pub rank: f64,
    /// Threshold requested by the caller; informational only
    pub passing_threshold: f64,
    /// When the card content was last regenerated
    pub generated_at: DateTime,
}

/// Defines relationships between `ReportCard` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One report card has one result row per subject
    #[sea_orm(has_many = "super::report_card_subject::Entity")]
    Subjects,
}

impl Related<super::report_card_subject::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subjects.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
