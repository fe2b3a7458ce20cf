//! Subject entity - a taught module, optionally assigned to a teacher.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subject database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subjects")]
pub struct Model {
    /// Unique identifier for the subject
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning school
    pub school_id: i64,
    /// Trade the subject is taught in
    pub trade_id: i64,
    /// Display name
    pub name: String,
    /// Assigned teacher, if any
    pub teacher_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
