//! Unified error type for report generation, ranking and promotion.
//!
//! Every variant maps onto one of four handling categories (see
//! [`ErrorCategory`]) so callers can decide whether correcting the input,
//! retrying, or giving up is the right response.

use thiserror::Error;

/// Handling category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or missing input; rejected before any work started.
    Precondition,
    /// Joined data missing or inconsistent while aggregating.
    Aggregation,
    /// A single entity violated a cross-record rule.
    Consistency,
    /// Anything else; the unit of work was rolled back.
    Internal,
}

/// Errors produced by the reporting core.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description
        message: String,
    },

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O failure while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be rendered as JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A referenced record does not exist (or is deleted)
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record, e.g. `"school"`
        entity: &'static str,
        /// Identifier that was looked up
        id: i64,
    },

    /// A scope argument was not acceptable
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Human-readable description
        message: String,
    },

    /// A request parameter was malformed or inconsistent
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Human-readable description
        message: String,
    },

    /// Promotion requires all three terms of the academic year
    #[error("School {school_id} has {found} of 3 terms for academic year {academic_year}")]
    IncompleteAcademicYear {
        /// School being promoted
        school_id: i64,
        /// Academic year being promoted
        academic_year: String,
        /// Number of terms that exist
        found: usize,
    },

    /// Report requested for a term that has not started yet
    #[error("Term {term_id} starts on {starts_on} and cannot be reported yet")]
    TermNotStarted {
        /// Requested term
        term_id: i64,
        /// First day of the term
        starts_on: chrono::NaiveDate,
    },

    /// Joined data expected by the aggregation was missing
    #[error("Aggregation failed: {message}")]
    Aggregation {
        /// Human-readable description
        message: String,
    },

    /// Promotion target belongs to a different trade than the student
    #[error("Student {student_id} cannot move from trade {expected_trade} to trade {found_trade}")]
    CrossTradeMismatch {
        /// Student being promoted
        student_id: i64,
        /// Trade of the current class
        expected_trade: i64,
        /// Trade of the conflicting target class
        found_trade: i64,
    },

    /// A promotion decision already exists for this student and year
    #[error("Student {student_id} already has a promotion decision for {academic_year}")]
    DuplicatePromotion {
        /// Student being promoted
        student_id: i64,
        /// Academic year of the existing decision
        academic_year: String,
    },

    /// Writing ranks back failed part way through the list
    #[error("Ranking stopped after {ranked} of {total} records: {source}")]
    Ranking {
        /// Records whose rank was written
        ranked: usize,
        /// Records in the list
        total: usize,
        /// Failure that interrupted the write-back
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns the handling category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. }
            | Self::InvalidScope { .. }
            | Self::InvalidInput { .. }
            | Self::IncompleteAcademicYear { .. }
            | Self::TermNotStarted { .. } => ErrorCategory::Precondition,
            Self::Aggregation { .. } => ErrorCategory::Aggregation,
            Self::CrossTradeMismatch { .. } | Self::DuplicatePromotion { .. } => {
                ErrorCategory::Consistency
            }
            Self::Config { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Ranking { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    pub(crate) const fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        assert_eq!(
            Error::not_found("school", 1).category(),
            ErrorCategory::Precondition
        );
        assert_eq!(
            Error::IncompleteAcademicYear {
                school_id: 1,
                academic_year: "2024-2025".to_string(),
                found: 2,
            }
            .category(),
            ErrorCategory::Precondition
        );
        assert_eq!(
            Error::CrossTradeMismatch {
                student_id: 1,
                expected_trade: 1,
                found_trade: 2,
            }
            .category(),
            ErrorCategory::Consistency
        );
        assert_eq!(
            Error::Database(sea_orm::DbErr::Custom("boom".to_string())).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = Error::IncompleteAcademicYear {
            school_id: 7,
            academic_year: "2024-2025".to_string(),
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "School 7 has 2 of 3 terms for academic year 2024-2025"
        );
        assert_eq!(Error::not_found("term", 3).to_string(), "term 3 not found");
    }
}
