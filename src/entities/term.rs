//! Term entity - one of the three terms of a school's academic year.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Term database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "terms")]
pub struct Model {
    /// Unique identifier for the term
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning school
    pub school_id: i64,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// 1-based position in the year (1..=3)
    pub term_number: i32,
    /// First day of the term
    pub start_date: Date,
    /// Last day of the term, always after `start_date`
    pub end_date: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
