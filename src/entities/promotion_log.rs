//! Promotion log entity - the immutable record of one promotion decision.
//!
//! Unique per (`student_id`, `academic_year`); the unique index is what keeps
//! concurrent promotion runs from deciding a student twice.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Promotion log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promotion_logs")]
pub struct Model {
    /// Unique identifier for the log row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student decided on
    pub student_id: i64,
    /// School running the promotion
    pub school_id: i64,
    /// Academic year being closed
    pub academic_year: String,
    /// `"promoted"`, `"repeated"`, `"graduated"` or `"expelled"`
    pub status: String,
    /// Class the student left
    pub from_class_id: i64,
    /// Class the student moved into, if any
    pub to_class_id: Option<i64>,
    /// Whether the decision was recorded by hand rather than by a run
    pub is_manual: bool,
    /// When the decision was recorded
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
