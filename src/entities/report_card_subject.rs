//! Report card subject entity - one subject's score breakdown on a report card.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Report card subject database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "report_card_subjects")]
pub struct Model {
    /// Unique identifier for the row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning report card
    pub report_card_id: i64,
    /// Subject scored
    pub subject_id: i64,
    /// Subject name at generation time
    pub subject_name: String,
    /// Points earned in first assessments
    pub assessment1: f64,
    /// Points available in first assessments
    pub assessment1_max: f64,
    /// Points earned in second assessments
    pub assessment2: f64,
    /// Points available in second assessments
    pub assessment2_max: f64,
    /// Points earned in tests
    pub test: f64,
    /// Points available in tests
    pub test_max: f64,
    /// Points earned in exams
    pub exam: f64,
    /// Points available in exams
    pub exam_max: f64,
    /// Points earned across all categories
    pub total: f64,
    /// Points available across all categories
    pub max_total: f64,
    /// `total / max_total * 100`, rounded to 2 decimals
    pub percentage: f64,
    /// `"Competent"` or `"Not Yet Competent"`
    pub decision: String,
}

/// Defines relationships between `ReportCardSubject` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each row belongs to one report card
    #[sea_orm(
        belongs_to = "super::report_card::Entity",
        from = "Column::ReportCardId",
        to = "super::report_card::Column::Id",
        on_delete = "Cascade"
    )]
    ReportCard,
}

impl Related<super::report_card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReportCard.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
