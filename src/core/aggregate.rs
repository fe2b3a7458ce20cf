//! Score aggregation.
//!
//! Every report scope runs through [`aggregate`]: graded submissions are
//! loaded together with their exam, questions, subject, enrollment and class,
//! each submission's joined context is checked against the scope's filter
//! predicate, and the surviving rows are grouped by the scope's key (student,
//! teacher or class). Submissions failing any filter are left out entirely,
//! they are never counted as zero.

use crate::{
    core::scope::{AssessmentCategory, Grouping, ScopeDescriptor, SubmissionContext},
    entities::{
        AnswerScore, Class, Enrollment, Exam, Question, Subject, Submission, Term, answer_score,
        enrollment, exam, question, submission, term,
    },
    errors::Result,
};
use sea_orm::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, instrument, warn};

/// Percentage at or above which a subject is `Competent`
pub const COMPETENCY_THRESHOLD: f64 = 70.0;

/// Raw submission score at or above which a submission counts as competent
/// in teacher-performance reports
pub const TEACHER_COMPETENT_SCORE: f64 = 70.0;

/// Rounds `value` to `places` decimal places, halves away from zero.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

/// `round(total / max_total * 100, 2)`, or 0 when nothing was available.
#[must_use]
pub fn percentage(total: f64, max_total: f64) -> f64 {
    if max_total <= 0.0 {
        return 0.0;
    }
    round_to(total / max_total * 100.0, 2)
}

/// Pass/fail outcome of one subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Percentage of at least 70
    #[serde(rename = "Competent")]
    Competent,
    /// Anything below
    #[serde(rename = "Not Yet Competent")]
    NotYetCompetent,
}

impl Decision {
    /// Decides a subject from its percentage.
    #[must_use]
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= COMPETENCY_THRESHOLD {
            Self::Competent
        } else {
            Self::NotYetCompetent
        }
    }

    /// Stored value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Competent => "Competent",
            Self::NotYetCompetent => "Not Yet Competent",
        }
    }
}

/// Points earned and available in one assessment category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryTally {
    /// Points earned
    pub points: f64,
    /// Points available
    pub max: f64,
}

/// Per-category tallies of one subject
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    /// First continuous assessment
    pub assessment1: CategoryTally,
    /// Second continuous assessment
    pub assessment2: CategoryTally,
    /// Tests
    pub test: CategoryTally,
    /// Exams
    pub exam: CategoryTally,
}

impl CategoryBreakdown {
    /// Tally of `category`
    #[must_use]
    pub const fn get(&self, category: AssessmentCategory) -> CategoryTally {
        match category {
            AssessmentCategory::Assessment1 => self.assessment1,
            AssessmentCategory::Assessment2 => self.assessment2,
            AssessmentCategory::Test => self.test,
            AssessmentCategory::Exam => self.exam,
        }
    }

    fn tally_mut(&mut self, category: AssessmentCategory) -> &mut CategoryTally {
        match category {
            AssessmentCategory::Assessment1 => &mut self.assessment1,
            AssessmentCategory::Assessment2 => &mut self.assessment2,
            AssessmentCategory::Test => &mut self.test,
            AssessmentCategory::Exam => &mut self.exam,
        }
    }

    /// Adds one submission's points to its category.
    pub fn add(&mut self, category: AssessmentCategory, points: f64, max: f64) {
        let tally = self.tally_mut(category);
        tally.points += points;
        tally.max += max;
    }

    /// Points earned across all categories
    #[must_use]
    pub fn total(&self) -> f64 {
        AssessmentCategory::ALL
            .iter()
            .map(|category| self.get(*category).points)
            .sum()
    }

    /// Points available across all categories
    #[must_use]
    pub fn max_total(&self) -> f64 {
        AssessmentCategory::ALL
            .iter()
            .map(|category| self.get(*category).max)
            .sum()
    }
}

/// One subject's result within a student aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectResult {
    /// Subject scored
    pub subject_id: i64,
    /// Subject name
    pub subject_name: String,
    /// Per-category points
    pub breakdown: CategoryBreakdown,
    /// Points earned
    pub total: f64,
    /// Points available
    pub max_total: f64,
    /// `round(total / max_total * 100, 2)`
    pub percentage: f64,
    /// Competency decision
    pub decision: Decision,
}

impl SubjectResult {
    /// Derives totals, percentage and decision from a breakdown.
    #[must_use]
    pub fn from_breakdown(subject_id: i64, subject_name: String, breakdown: CategoryBreakdown) -> Self {
        let total = breakdown.total();
        let max_total = breakdown.max_total();
        let percentage = percentage(total, max_total);
        Self {
            subject_id,
            subject_name,
            breakdown,
            total,
            max_total,
            percentage,
            decision: Decision::from_percentage(percentage),
        }
    }
}

/// One student's aggregate row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAggregate {
    /// Student aggregated
    pub student_id: i64,
    /// Class of the student's most recent enrollment among the rows
    pub class_id: i64,
    /// Per-subject results ordered by subject id
    pub subjects: Vec<SubjectResult>,
    /// Sum of subject totals
    pub total_score: f64,
    /// `total_score` per subject, 0 without subjects
    pub average: f64,
}

/// One teacher's aggregate row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherAggregate {
    /// Teacher assigned to the subjects
    pub teacher_id: i64,
    /// Graded submissions counted across the teacher's subjects. A student
    /// with several graded exams counts once per exam, so this is not a
    /// head count of distinct students.
    pub total_students: i64,
    /// Mean raw submission score
    pub average_score: f64,
    /// Percentage of submissions with a raw score of at least 70
    pub competency_rate: f64,
}

/// One class's aggregate row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassAggregate {
    /// Class aggregated
    pub class_id: i64,
    /// Distinct students with graded submissions
    pub student_count: i64,
    /// Sum of raw submission scores
    pub total_score: f64,
    /// `total_score / student_count`
    pub average_score: f64,
}

/// Output of one aggregation run, shaped by the scope's grouping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Aggregation {
    /// Grouped by student
    Students(Vec<StudentAggregate>),
    /// Grouped by teacher
    Teachers(Vec<TeacherAggregate>),
    /// Grouped by class
    Classes(Vec<ClassAggregate>),
}

/// One graded submission that passed the scope filter
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSubmission {
    /// Submitting student
    pub student_id: i64,
    /// Enrollment the submission belongs to
    pub enrollment_id: i64,
    /// Class of that enrollment
    pub class_id: i64,
    /// Subject examined
    pub subject_id: i64,
    /// Subject name
    pub subject_name: String,
    /// Teacher assigned to the subject
    pub teacher_id: Option<i64>,
    /// Category of the exam
    pub category: AssessmentCategory,
    /// Sum of graded answer scores
    pub score: f64,
    /// Sum of the exam's question maxima
    pub max: f64,
}

/// Runs the aggregation for `descriptor`.
///
/// All reads go through `db`, so passing a transaction gives the caller a
/// consistent snapshot.
#[instrument(skip(db), fields(scope = descriptor.scope.name()))]
pub async fn aggregate<C>(db: &C, descriptor: &ScopeDescriptor) -> Result<Aggregation>
where
    C: ConnectionTrait,
{
    let rows = load_scored_submissions(db, descriptor).await?;
    debug!("{} submissions in scope", rows.len());
    Ok(group_rows(&rows, descriptor.grouping()))
}

/// Loads every graded submission that falls inside `descriptor`.
#[allow(clippy::too_many_lines)]
pub async fn load_scored_submissions<C>(
    db: &C,
    descriptor: &ScopeDescriptor,
) -> Result<Vec<ScoredSubmission>>
where
    C: ConnectionTrait,
{
    let params = &descriptor.params;

    let mut term_query = Term::find()
        .filter(term::Column::SchoolId.eq(params.school_id))
        .filter(term::Column::AcademicYear.eq(params.academic_year.as_str()));
    if let Some(term_id) = descriptor.term_filter() {
        term_query = term_query.filter(term::Column::Id.eq(term_id));
    }
    let terms: HashMap<i64, term::Model> = term_query
        .all(db)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let term_ids: Vec<i64> = terms.keys().copied().collect();

    let exams: HashMap<i64, exam::Model> = Exam::find()
        .filter(exam::Column::TermId.is_in(term_ids.clone()))
        .filter(exam::Column::IsDeleted.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();
    if exams.is_empty() {
        return Ok(Vec::new());
    }
    let exam_ids: Vec<i64> = exams.keys().copied().collect();

    let mut submission_query = Submission::find()
        .filter(submission::Column::ExamId.is_in(exam_ids.clone()))
        .filter(submission::Column::Status.eq(submission::STATUS_GRADED))
        .filter(submission::Column::IsDeleted.eq(false));
    if let crate::core::scope::ReportScope::Student(student_id) = descriptor.scope {
        submission_query = submission_query.filter(submission::Column::StudentId.eq(student_id));
    }
    let submissions = submission_query.all(db).await?;
    if submissions.is_empty() {
        return Ok(Vec::new());
    }
    let submission_ids: Vec<i64> = submissions.iter().map(|s| s.id).collect();

    let mut scores: HashMap<i64, f64> = HashMap::new();
    for answer in AnswerScore::find()
        .filter(answer_score::Column::SubmissionId.is_in(submission_ids))
        .filter(answer_score::Column::Graded.eq(true))
        .all(db)
        .await?
    {
        *scores.entry(answer.submission_id).or_default() += answer.score;
    }

    let mut maxima: HashMap<i64, f64> = HashMap::new();
    for q in Question::find()
        .filter(question::Column::ExamId.is_in(exam_ids))
        .all(db)
        .await?
    {
        *maxima.entry(q.exam_id).or_default() += q.max_score;
    }

    let subject_ids: BTreeSet<i64> = exams.values().map(|e| e.subject_id).collect();
    let subjects: HashMap<i64, _> = Subject::find()
        .filter(crate::entities::subject::Column::Id.is_in(subject_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let enrollments: HashMap<(i64, i64), enrollment::Model> = Enrollment::find()
        .filter(enrollment::Column::TermId.is_in(term_ids))
        .filter(enrollment::Column::SchoolId.eq(params.school_id))
        .filter(enrollment::Column::IsActive.eq(true))
        .filter(enrollment::Column::IsDeleted.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|e| ((e.student_id, e.term_id), e))
        .collect();

    let class_ids: BTreeSet<i64> = enrollments.values().map(|e| e.class_id).collect();
    let classes: HashMap<i64, _> = Class::find()
        .filter(crate::entities::class::Column::Id.is_in(class_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut rows = Vec::with_capacity(submissions.len());
    for sub in submissions {
        let Some(exam) = exams.get(&sub.exam_id) else {
            warn!(submission_id = sub.id, exam_id = sub.exam_id, "Exam missing, skipping submission");
            continue;
        };
        let Ok(category) = exam.exam_type.parse::<AssessmentCategory>() else {
            warn!(exam_id = exam.id, exam_type = %exam.exam_type, "Unknown exam type, skipping submission");
            continue;
        };
        let Some(subject) = subjects.get(&exam.subject_id) else {
            warn!(exam_id = exam.id, subject_id = exam.subject_id, "Subject missing, skipping submission");
            continue;
        };
        // No active enrollment for the exam's term: the submission is out of scope.
        let Some(enrollment) = enrollments.get(&(sub.student_id, exam.term_id)) else {
            continue;
        };
        let Some(class) = classes.get(&enrollment.class_id) else {
            warn!(enrollment_id = enrollment.id, class_id = enrollment.class_id, "Class missing, skipping submission");
            continue;
        };
        let Some(term) = terms.get(&exam.term_id) else {
            continue;
        };

        let ctx = SubmissionContext {
            student_id: sub.student_id,
            class_id: class.id,
            trade_id: class.trade_id,
            term_id: term.id,
            school_id: enrollment.school_id,
            academic_year: &term.academic_year,
            subject_id: subject.id,
            teacher_id: subject.teacher_id,
            category,
        };
        if !descriptor.includes(&ctx) {
            continue;
        }

        rows.push(ScoredSubmission {
            student_id: sub.student_id,
            enrollment_id: enrollment.id,
            class_id: class.id,
            subject_id: subject.id,
            subject_name: subject.name.clone(),
            teacher_id: subject.teacher_id,
            category,
            score: scores.get(&sub.id).copied().unwrap_or_default(),
            max: maxima.get(&exam.id).copied().unwrap_or_default(),
        });
    }

    Ok(rows)
}

/// Groups filtered rows by `grouping`.
#[must_use]
pub fn group_rows(rows: &[ScoredSubmission], grouping: Grouping) -> Aggregation {
    match grouping {
        Grouping::Student => Aggregation::Students(group_by_student(rows)),
        Grouping::Teacher => Aggregation::Teachers(group_by_teacher(rows)),
        Grouping::Class => Aggregation::Classes(group_by_class(rows)),
    }
}

#[allow(clippy::cast_precision_loss)] // subject counts are tiny
fn group_by_student(rows: &[ScoredSubmission]) -> Vec<StudentAggregate> {
    struct Acc {
        enrollment_id: i64,
        class_id: i64,
        subjects: BTreeMap<i64, (String, CategoryBreakdown)>,
    }

    let mut students: BTreeMap<i64, Acc> = BTreeMap::new();
    for row in rows {
        let acc = students.entry(row.student_id).or_insert_with(|| Acc {
            enrollment_id: row.enrollment_id,
            class_id: row.class_id,
            subjects: BTreeMap::new(),
        });
        if row.enrollment_id > acc.enrollment_id {
            acc.enrollment_id = row.enrollment_id;
            acc.class_id = row.class_id;
        }
        acc.subjects
            .entry(row.subject_id)
            .or_insert_with(|| (row.subject_name.clone(), CategoryBreakdown::default()))
            .1
            .add(row.category, row.score, row.max);
    }

    students
        .into_iter()
        .map(|(student_id, acc)| {
            let subjects: Vec<SubjectResult> = acc
                .subjects
                .into_iter()
                .map(|(subject_id, (name, breakdown))| {
                    SubjectResult::from_breakdown(subject_id, name, breakdown)
                })
                .collect();
            let total_score: f64 = subjects.iter().map(|s| s.total).sum();
            let average = if subjects.is_empty() {
                0.0
            } else {
                total_score / subjects.len() as f64
            };
            StudentAggregate {
                student_id,
                class_id: acc.class_id,
                subjects,
                total_score,
                average,
            }
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn group_by_teacher(rows: &[ScoredSubmission]) -> Vec<TeacherAggregate> {
    // (submissions, score sum, competent submissions)
    let mut teachers: BTreeMap<i64, (i64, f64, i64)> = BTreeMap::new();
    for row in rows {
        let Some(teacher_id) = row.teacher_id else {
            continue;
        };
        let entry = teachers.entry(teacher_id).or_default();
        entry.0 += 1;
        entry.1 += row.score;
        if row.score >= TEACHER_COMPETENT_SCORE {
            entry.2 += 1;
        }
    }

    teachers
        .into_iter()
        .map(|(teacher_id, (count, sum, competent))| TeacherAggregate {
            teacher_id,
            total_students: count,
            average_score: sum / count as f64,
            competency_rate: competent as f64 / count as f64 * 100.0,
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn group_by_class(rows: &[ScoredSubmission]) -> Vec<ClassAggregate> {
    let mut classes: BTreeMap<i64, (BTreeSet<i64>, f64)> = BTreeMap::new();
    for row in rows {
        let entry = classes.entry(row.class_id).or_default();
        entry.0.insert(row.student_id);
        entry.1 += row.score;
    }

    classes
        .into_iter()
        .map(|(class_id, (students, total_score))| {
            let student_count = students.len() as i64;
            ClassAggregate {
                class_id,
                student_count,
                total_score,
                average_score: if student_count == 0 {
                    0.0
                } else {
                    total_score / student_count as f64
                },
            }
        })
        .collect()
}
