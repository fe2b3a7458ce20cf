//! Trade entity - a vocational program (e.g. software development) offered by a school.
//!
//! Classes belong to exactly one trade; promotion never moves a student across trades.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Trade database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trades")]
pub struct Model {
    /// Unique identifier for the trade
    #[sea_orm(primary_key)]
    pub id: i64,
    /// School offering the trade
    pub school_id: i64,
    /// Short code used when naming generated classes (e.g. `"SWD"`)
    pub code: String,
    /// Display name
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
