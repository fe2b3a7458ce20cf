//! Class report entity - persisted class-performance aggregate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Class report database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "class_reports")]
pub struct Model {
    /// Unique identifier for the row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Class aggregated
    pub class_id: i64,
    /// School of the class
    pub school_id: i64,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// Term covered, `None` for the whole academic year
    pub term_id: Option<i64>,
    /// Distinct students with graded submissions
    pub student_count: i64,
    /// Sum of raw submission scores
    pub total_score: f64,
    /// `total_score / student_count`
    pub average_score: f64,
    /// Fractional rank among the school's classes, 0 until ranked
    pub rank: f64,
    /// When the row was last regenerated
    pub generated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
