//! Entity module - Contains all SeaORM entity definitions for the database.
//! Catalog tables (schools, trades, classes, terms, users, subjects) are read
//! by the core; exam and submission tables feed the aggregator; report and
//! promotion tables are written by it.

pub mod answer_score;
pub mod class;
pub mod class_report;
pub mod enrollment;
pub mod exam;
pub mod promotion_log;
pub mod question;
pub mod report_card;
pub mod report_card_subject;
pub mod school;
pub mod subject;
pub mod submission;
pub mod teacher_report;
pub mod term;
pub mod trade;
pub mod user;

// Re-export specific types to avoid conflicts
pub use answer_score::{Entity as AnswerScore, Model as AnswerScoreModel};
pub use class::{Entity as Class, Model as ClassModel};
pub use class_report::{Entity as ClassReport, Model as ClassReportModel};
pub use enrollment::{Entity as Enrollment, Model as EnrollmentModel};
pub use exam::{Entity as Exam, Model as ExamModel};
pub use promotion_log::{Entity as PromotionLog, Model as PromotionLogModel};
pub use question::{Entity as Question, Model as QuestionModel};
pub use report_card::{Entity as ReportCard, Model as ReportCardModel};
pub use report_card_subject::{Entity as ReportCardSubject, Model as ReportCardSubjectModel};
pub use school::{Entity as School, Model as SchoolModel};
pub use subject::{Entity as Subject, Model as SubjectModel};
pub use submission::{Entity as Submission, Model as SubmissionModel};
pub use teacher_report::{Entity as TeacherReport, Model as TeacherReportModel};
pub use term::{Entity as Term, Model as TermModel};
pub use trade::{Entity as Trade, Model as TradeModel};
pub use user::{Entity as User, Model as UserModel};
