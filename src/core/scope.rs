//! Aggregation scopes.
//!
//! A [`ReportScope`] names what a report is about; [`ScopeDescriptor`] turns it
//! plus the request parameters into the filter predicate and grouping key the
//! single aggregation routine in [`crate::core::aggregate`] runs with.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The unit of score composition within a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentCategory {
    /// First continuous assessment
    Assessment1,
    /// Second continuous assessment
    Assessment2,
    /// Mid-term test
    Test,
    /// End-of-term exam
    Exam,
}

impl AssessmentCategory {
    /// All categories in report column order
    pub const ALL: [Self; 4] = [Self::Assessment1, Self::Assessment2, Self::Test, Self::Exam];

    /// Stored `exam_type` value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assessment1 => "assessment1",
            Self::Assessment2 => "assessment2",
            Self::Test => "test",
            Self::Exam => "exam",
        }
    }

    /// Parses the argument of a single-assessment report, which only accepts
    /// the two continuous assessments.
    ///
    /// # Errors
    /// Returns `Error::InvalidScope` for anything but `assessment1`/`assessment2`.
    pub fn parse_single_assessment(raw: &str) -> Result<Self> {
        match raw.parse::<Self>() {
            Ok(category @ (Self::Assessment1 | Self::Assessment2)) => Ok(category),
            _ => Err(Error::InvalidScope {
                message: format!(
                    "Assessment type must be 'assessment1' or 'assessment2', got '{raw}'"
                ),
            }),
        }
    }
}

impl FromStr for AssessmentCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "assessment1" => Ok(Self::Assessment1),
            "assessment2" => Ok(Self::Assessment2),
            "test" => Ok(Self::Test),
            "exam" => Ok(Self::Exam),
            other => Err(Error::InvalidScope {
                message: format!("Unknown assessment category '{other}'"),
            }),
        }
    }
}

impl fmt::Display for AssessmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a report aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    /// One student's card
    Student(i64),
    /// Every student of one class
    Class(i64),
    /// Every student with work in one term
    Term(i64),
    /// Every student of the school
    School,
    /// Every student taking one subject
    Subject(i64),
    /// Every student of one trade
    Trade(i64),
    /// Every student, one assessment category only
    Assessment(AssessmentCategory),
    /// Grouped by the teacher assigned to each subject
    Teacher,
    /// Grouped by class
    ClassPerformance,
}

impl ReportScope {
    /// How entities produced by this scope are ranked
    #[must_use]
    pub const fn ranking(self) -> RankingScope {
        match self {
            Self::Student(_) | Self::Class(_) => RankingScope::StudentInClass,
            Self::Teacher => RankingScope::TeacherInSchool,
            Self::ClassPerformance => RankingScope::ClassInSchool,
            Self::Term(_) | Self::School | Self::Subject(_) | Self::Trade(_) | Self::Assessment(_) => {
                RankingScope::Flat
            }
        }
    }

    /// Grouping key rows are collected under
    #[must_use]
    pub const fn grouping(self) -> Grouping {
        match self {
            Self::Teacher => Grouping::Teacher,
            Self::ClassPerformance => Grouping::Class,
            _ => Grouping::Student,
        }
    }

    /// Short name used in logs and the CLI
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Student(_) => "student",
            Self::Class(_) => "class",
            Self::Term(_) => "term",
            Self::School => "school",
            Self::Subject(_) => "subject",
            Self::Trade(_) => "trade",
            Self::Assessment(_) => "assessment",
            Self::Teacher => "teacher",
            Self::ClassPerformance => "class-performance",
        }
    }
}

/// Population a rank is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingScope {
    /// Fractional rank over the report cards of the student's class
    StudentInClass,
    /// Fractional rank over the school's active teachers
    TeacherInSchool,
    /// Fractional rank over the school's active classes
    ClassInSchool,
    /// Competition rank over the ranked list itself
    Flat,
}

/// Key aggregate rows are grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// One row per student with a per-subject breakdown
    Student,
    /// One row per assigned teacher
    Teacher,
    /// One row per class
    Class,
}

/// Parameters shared by every scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeParams {
    /// School the report is for
    pub school_id: i64,
    /// Academic year in `YYYY-YYYY` form
    pub academic_year: String,
    /// Restrict to one term; `None` covers the whole year
    pub term_id: Option<i64>,
}

/// The joined context of one graded submission, as seen by scope filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionContext<'a> {
    /// Submitting student
    pub student_id: i64,
    /// Class of the student's enrollment
    pub class_id: i64,
    /// Trade of that class
    pub trade_id: i64,
    /// Term of the exam and enrollment
    pub term_id: i64,
    /// School of the enrollment
    pub school_id: i64,
    /// Academic year of the term
    pub academic_year: &'a str,
    /// Subject examined
    pub subject_id: i64,
    /// Teacher assigned to the subject
    pub teacher_id: Option<i64>,
    /// Category of the exam
    pub category: AssessmentCategory,
}

/// Filter predicate plus grouping key for one aggregation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDescriptor {
    /// Scope being aggregated
    pub scope: ReportScope,
    /// Shared parameters
    pub params: ScopeParams,
}

impl ScopeDescriptor {
    /// Builds a descriptor for `scope` with `params`
    #[must_use]
    pub const fn new(scope: ReportScope, params: ScopeParams) -> Self {
        Self { scope, params }
    }

    /// Grouping key of the scope
    #[must_use]
    pub const fn grouping(&self) -> Grouping {
        self.scope.grouping()
    }

    /// Term a submission must fall in, combining the scope and the parameters
    #[must_use]
    pub const fn term_filter(&self) -> Option<i64> {
        match self.scope {
            ReportScope::Term(term_id) => Some(term_id),
            _ => self.params.term_id,
        }
    }

    /// Whether a submission with this context counts towards the scope
    #[must_use]
    pub fn includes(&self, ctx: &SubmissionContext<'_>) -> bool {
        if ctx.school_id != self.params.school_id || ctx.academic_year != self.params.academic_year
        {
            return false;
        }
        if self.term_filter().is_some_and(|term_id| term_id != ctx.term_id) {
            return false;
        }
        match self.scope {
            ReportScope::Student(student_id) => ctx.student_id == student_id,
            ReportScope::Class(class_id) => ctx.class_id == class_id,
            ReportScope::Subject(subject_id) => ctx.subject_id == subject_id,
            ReportScope::Trade(trade_id) => ctx.trade_id == trade_id,
            ReportScope::Assessment(category) => ctx.category == category,
            ReportScope::Teacher => ctx.teacher_id.is_some(),
            ReportScope::Term(_) | ReportScope::School | ReportScope::ClassPerformance => true,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn params() -> ScopeParams {
        ScopeParams {
            school_id: 1,
            academic_year: "2024-2025".to_string(),
            term_id: None,
        }
    }

    fn context() -> SubmissionContext<'static> {
        SubmissionContext {
            student_id: 10,
            class_id: 20,
            trade_id: 30,
            term_id: 40,
            school_id: 1,
            academic_year: "2024-2025",
            subject_id: 50,
            teacher_id: None,
            category: AssessmentCategory::Test,
        }
    }

    #[test]
    fn test_single_assessment_accepts_only_continuous_assessments() {
        assert_eq!(
            AssessmentCategory::parse_single_assessment("assessment1").unwrap(),
            AssessmentCategory::Assessment1
        );
        assert_eq!(
            AssessmentCategory::parse_single_assessment("assessment2").unwrap(),
            AssessmentCategory::Assessment2
        );
        for raw in ["test", "exam", "assessment3", ""] {
            assert!(matches!(
                AssessmentCategory::parse_single_assessment(raw),
                Err(Error::InvalidScope { .. })
            ));
        }
    }

    #[test]
    fn test_school_and_year_always_filter() {
        let descriptor = ScopeDescriptor::new(ReportScope::School, params());
        assert!(descriptor.includes(&context()));

        let other_school = SubmissionContext {
            school_id: 2,
            ..context()
        };
        assert!(!descriptor.includes(&other_school));

        let other_year = SubmissionContext {
            academic_year: "2023-2024",
            ..context()
        };
        assert!(!descriptor.includes(&other_year));
    }

    #[test]
    fn test_scope_specific_filters() {
        let ctx = context();
        let check = |scope| ScopeDescriptor::new(scope, params()).includes(&ctx);

        assert!(check(ReportScope::Student(10)));
        assert!(!check(ReportScope::Student(11)));
        assert!(check(ReportScope::Class(20)));
        assert!(!check(ReportScope::Class(21)));
        assert!(check(ReportScope::Trade(30)));
        assert!(check(ReportScope::Term(40)));
        assert!(!check(ReportScope::Term(41)));
        assert!(check(ReportScope::Subject(50)));
        assert!(!check(ReportScope::Assessment(AssessmentCategory::Assessment1)));
        assert!(!check(ReportScope::Teacher));
    }

    #[test]
    fn test_term_parameter_narrows_any_scope() {
        let descriptor = ScopeDescriptor::new(
            ReportScope::Class(20),
            ScopeParams {
                term_id: Some(99),
                ..params()
            },
        );
        assert!(!descriptor.includes(&context()));
    }

    #[test]
    fn test_ranking_scope_per_report_scope() {
        assert_eq!(ReportScope::Class(1).ranking(), RankingScope::StudentInClass);
        assert_eq!(ReportScope::Teacher.ranking(), RankingScope::TeacherInSchool);
        assert_eq!(
            ReportScope::ClassPerformance.ranking(),
            RankingScope::ClassInSchool
        );
        assert_eq!(ReportScope::Trade(1).ranking(), RankingScope::Flat);
        assert_eq!(ReportScope::Teacher.grouping(), Grouping::Teacher);
    }
}
