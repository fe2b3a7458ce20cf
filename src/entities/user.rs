//! User entity - students and teachers.
//!
//! Only the fields the reporting core reads or writes are modelled here;
//! credentials and profile data live with the authentication layer.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role value for students
pub const ROLE_STUDENT: &str = "student";
/// Role value for teachers
pub const ROLE_TEACHER: &str = "teacher";

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// School the user belongs to
    pub school_id: i64,
    /// Display name
    pub name: String,
    /// `"student"` or `"teacher"`
    pub role: String,
    /// Inactive teachers do not count towards the school's teacher population
    pub is_active: bool,
    /// Soft delete flag
    pub is_deleted: bool,
    /// Set by the promotion engine when a student completes the last level
    pub is_graduated: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
