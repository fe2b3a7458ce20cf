//! Enrollment entity - places one student in one class for one term.
//!
//! Unique per (`student_id`, `term_id`). Enrollments are deactivated, never
//! deleted, when a student is promoted, repeated or graduated.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Enrollment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    /// Unique identifier for the enrollment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Enrolled student
    pub student_id: i64,
    /// Class the student sits in
    pub class_id: i64,
    /// Term the enrollment covers
    pub term_id: i64,
    /// School of the class and term
    pub school_id: i64,
    /// Whether this is the student's current placement
    pub is_active: bool,
    /// Soft delete flag
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
