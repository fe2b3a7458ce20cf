//! Core business logic - framework-agnostic aggregation, ranking, report
//! generation and promotion. Every function takes a `sea_orm` connection (or
//! transaction) and returns structured data; presentation is left to callers.

/// Score aggregation over one parameterized scope
pub mod aggregate;
/// Injectable time source
pub mod clock;
/// Enrollment placement and deactivation
pub mod enrollment;
/// Academic years and class levels
pub mod level;
/// Year-end promotion engine
pub mod promotion;
/// Rank computation and write-back
pub mod ranking;
/// Report generation service
pub mod report;
/// Report card, teacher report and class report persistence
pub mod report_card;
/// Aggregation scopes and their descriptors
pub mod scope;
/// Submission and exam total upkeep
pub mod submission;
/// Term creation and academic-year checks
pub mod term;
