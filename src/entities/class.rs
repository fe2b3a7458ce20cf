//! Class entity - one cohort of one trade at one level for one academic year.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Class database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "classes")]
pub struct Model {
    /// Unique identifier for the class
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning school
    pub school_id: i64,
    /// Trade the class teaches
    pub trade_id: i64,
    /// Level code: `"L3"`, `"L4"` or `"L5"`
    pub level: String,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// Display name
    pub name: String,
    /// Inactive classes do not count towards the school's class population
    pub is_active: bool,
    /// Soft delete flag
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
