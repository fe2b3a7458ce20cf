//! Teacher report entity - persisted teacher-performance aggregate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Teacher report database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "teacher_reports")]
pub struct Model {
    /// Unique identifier for the row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Teacher the subjects are assigned to
    pub teacher_id: i64,
    /// School of the teacher
    pub school_id: i64,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// Term covered, `None` for the whole academic year
    pub term_id: Option<i64>,
    /// Graded submissions counted across the teacher's subjects. A student
    /// with several graded exams counts once per exam, so this is not a
    /// head count of distinct students.
    pub total_students: i64,
    /// Mean raw submission score
    pub average_score: f64,
    /// Share of submissions with a raw score of at least 70, in percent
    pub competency_rate: f64,
    /// Fractional rank among the school's teachers, 0 until ranked
    pub rank: f64,
    /// When the row was last regenerated
    pub generated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
