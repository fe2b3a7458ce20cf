use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use school_reports::{
    config::{database, settings},
    core::{
        clock::SystemClock,
        promotion::{list_promotion_logs, run_promotion},
        report::{ReportRequest, run_report},
        scope::{AssessmentCategory, ReportScope},
    },
    errors::{Error, Result},
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "school-reports", about = "Report cards, rankings and promotion")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing tables and indexes
    InitDb,
    /// Generate a report and print it as JSON
    Report {
        /// What to aggregate over
        #[arg(long, value_enum)]
        scope: ScopeKind,
        /// Student, class, term, subject or trade id, depending on the scope
        #[arg(long)]
        id: Option<i64>,
        /// Assessment category for the assessment scope
        #[arg(long)]
        assessment: Option<String>,
        /// School id
        #[arg(long)]
        school: i64,
        /// Academic year, e.g. 2024-2025
        #[arg(long)]
        year: String,
        /// Restrict to one term
        #[arg(long)]
        term: Option<i64>,
        /// Passing threshold stored on report cards
        #[arg(long)]
        passing_threshold: Option<f64>,
    },
    /// Run the year-end promotion for a school
    Promote {
        /// School id
        #[arg(long)]
        school: i64,
        /// Academic year being closed, e.g. 2024-2025
        #[arg(long)]
        year: String,
    },
    /// Print the promotion decisions of a school's academic year
    PromotionLog {
        /// School id
        #[arg(long)]
        school: i64,
        /// Academic year, e.g. 2024-2025
        #[arg(long)]
        year: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeKind {
    Student,
    Class,
    Term,
    School,
    Subject,
    Trade,
    Assessment,
    Teacher,
    ClassPerformance,
}

fn build_scope(kind: ScopeKind, id: Option<i64>, assessment: Option<&str>) -> Result<ReportScope> {
    let require_id = || {
        id.ok_or_else(|| Error::InvalidScope {
            message: "This scope needs --id".to_string(),
        })
    };
    Ok(match kind {
        ScopeKind::Student => ReportScope::Student(require_id()?),
        ScopeKind::Class => ReportScope::Class(require_id()?),
        ScopeKind::Term => ReportScope::Term(require_id()?),
        ScopeKind::Subject => ReportScope::Subject(require_id()?),
        ScopeKind::Trade => ReportScope::Trade(require_id()?),
        ScopeKind::School => ReportScope::School,
        ScopeKind::Teacher => ReportScope::Teacher,
        ScopeKind::ClassPerformance => ReportScope::ClassPerformance,
        ScopeKind::Assessment => ReportScope::Assessment(AssessmentCategory::parse_single_assessment(
            assessment.unwrap_or_default(),
        )?),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenv().ok();
    let app_settings = settings::load_settings_or_default(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_settings.logging.filter)),
        )
        .init();

    let url = database::get_database_url(app_settings.database.url.as_deref());
    let db = database::create_connection(&url)
        .await
        .inspect(|_| info!("Connected to database"))
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db).await?;

    let clock = SystemClock;
    match cli.command {
        Commands::InitDb => {
            info!("Database ready at {url}");
        }
        Commands::Report {
            scope,
            id,
            assessment,
            school,
            year,
            term,
            passing_threshold,
        } => {
            let request = ReportRequest {
                scope: build_scope(scope, id, assessment.as_deref())?,
                school_id: school,
                academic_year: year,
                term_id: term,
                passing_threshold,
            };
            let output = run_report(&db, &clock, &request)
                .await
                .inspect_err(|e| error!(category = ?e.category(), "Report failed: {e}"))?;
            print_json(&output)?;
        }
        Commands::Promote { school, year } => {
            let summary = run_promotion(&db, &clock, &app_settings.promotion, school, &year)
                .await
                .inspect_err(|e| error!(category = ?e.category(), "Promotion failed: {e}"))?;
            print_json(&summary)?;
        }
        Commands::PromotionLog { school, year } => {
            let logs = list_promotion_logs(&db, school, &year).await?;
            print_json(&logs)?;
        }
    }

    Ok(())
}
