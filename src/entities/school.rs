//! School entity - the tenant every other record belongs to.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// School database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schools")]
pub struct Model {
    /// Unique identifier for the school
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
}

/// Schools are referenced by id only; no navigable relations are needed
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
