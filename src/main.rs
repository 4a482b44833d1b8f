mod contact;
mod db;
mod filters;
mod metrics;
mod models;
mod report;
mod session;
mod tui;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use contact::ContactPayload;
use db::Database;
use filters::{DateRange, FilterState, PeriodPreset};
use models::{AnalysisRecord, Criticality, FeedbackType, Sentiment, DEPARTMENTS};
use report::{ExportOutcome, ReportExporter};
use session::{require_company_access, require_session, Session};

#[derive(Parser)]
#[command(name = "voicebox")]
#[command(about = "Anonymous employee feedback - collect, analyze, and report")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Log in as a dashboard user
    Login {
        /// Email address
        email: String,
    },

    /// Log out the current dashboard user
    Logout,

    /// Manage companies
    Company {
        #[command(subcommand)]
        command: CompanyCommands,
    },

    /// Manage dashboard access for a company
    Access {
        #[command(subcommand)]
        command: AccessCommands,
    },

    /// Submit anonymous feedback
    Submit {
        /// Company slug
        #[arg(short, long)]
        company: String,

        /// Department (run 'voicebox submit --help' for the list)
        #[arg(short, long)]
        department: String,

        /// Self-reported type (elogio, sugestao, problema, reclamacao)
        #[arg(short = 't', long = "type")]
        feedback_type: Option<String>,

        /// Confirm the feedback is anonymous and may be analyzed
        #[arg(long)]
        consent: bool,

        /// Feedback text (10 to 2000 characters)
        text: String,
    },

    /// Manage analysis results from the external pipeline
    Analysis {
        #[command(subcommand)]
        command: AnalysisCommands,
    },

    /// List recent analyzed feedbacks
    Recent {
        /// Company slug
        #[arg(short, long)]
        company: String,

        /// Number of feedbacks to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Open the interactive dashboard
    Dashboard {
        /// Company slug
        #[arg(short, long)]
        company: String,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Export dashboard data
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },

    /// Send a message to the product team
    Contact {
        /// Your name
        #[arg(long)]
        name: String,

        /// Your email
        #[arg(long)]
        email: String,

        /// Company name (optional)
        #[arg(long)]
        company: Option<String>,

        /// Message text
        #[arg(long)]
        message: String,
    },
}

#[derive(Subcommand)]
enum CompanyCommands {
    /// Register a company
    Add {
        /// Company name
        name: String,

        /// URL-safe identifier (derived from the name when omitted)
        #[arg(short, long)]
        slug: Option<String>,

        /// Dashboard seat limit
        #[arg(short, long, default_value = "1")]
        max_users: i64,

        /// Email of the owner account
        #[arg(short, long)]
        owner: String,
    },

    /// List companies
    List,

    /// Show company details
    Show {
        /// Company slug
        slug: String,
    },
}

#[derive(Subcommand)]
enum AccessCommands {
    /// List dashboard users
    List {
        /// Company slug
        #[arg(short, long)]
        company: String,
    },

    /// Invite a dashboard user (owner only)
    Invite {
        /// Company slug
        #[arg(short, long)]
        company: String,

        /// Email to invite
        email: String,
    },

    /// Remove a dashboard user (owner only)
    Remove {
        /// Company slug
        #[arg(short, long)]
        company: String,

        /// Email to remove
        email: String,
    },
}

#[derive(Subcommand)]
enum AnalysisCommands {
    /// Import a JSON file of analysis records
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Request a report from the report webhook
    Report {
        /// Company slug
        #[arg(short, long)]
        company: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Export filtered feedbacks as CSV
    Csv {
        /// Company slug
        #[arg(short, long)]
        company: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,
    },
}

/// Shared filter flags for dashboard and export commands.
#[derive(Args)]
struct FilterArgs {
    /// Period preset in days (7, 30, or 90)
    #[arg(long)]
    days: Option<i64>,

    /// Custom range start (YYYY-MM-DD, inclusive)
    #[arg(long)]
    from: Option<String>,

    /// Custom range end (YYYY-MM-DD, inclusive)
    #[arg(long)]
    to: Option<String>,

    /// Filter by category (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Filter by criticality (repeatable)
    #[arg(long = "criticality")]
    criticalities: Vec<String>,

    /// Filter by sentiment (repeatable)
    #[arg(long = "sentiment")]
    sentiments: Vec<String>,

    /// Filter by theme (repeatable)
    #[arg(long = "theme")]
    themes: Vec<String>,

    /// Filter by department (repeatable)
    #[arg(long = "department")]
    departments: Vec<String>,
}

impl FilterArgs {
    fn into_filters(self) -> Result<FilterState> {
        let mut filters = FilterState::default();

        if let Some(days) = self.days {
            let preset = PeriodPreset::parse(&days.to_string())
                .ok_or_else(|| anyhow!("--days must be 7, 30, or 90"))?;
            filters.set_preset(preset);
        }

        if self.from.is_some() || self.to.is_some() {
            let start = self
                .from
                .as_deref()
                .map(|s| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
                .transpose()?;
            let end = self
                .to
                .as_deref()
                .map(|s| {
                    parse_date(s).map(|d| {
                        d.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1)
                    })
                })
                .transpose()?;
            if let (Some(start), Some(end)) = (start, end) {
                if end < start {
                    return Err(anyhow!("--to must not be earlier than --from"));
                }
            }
            filters.set_date_range(DateRange { start, end });
        }

        for value in &self.categories {
            FeedbackType::parse(value)
                .ok_or_else(|| anyhow!("Unknown category '{}'", value))?;
            filters.toggle_category(value);
        }
        for value in &self.criticalities {
            Criticality::parse(value)
                .ok_or_else(|| anyhow!("Unknown criticality '{}'", value))?;
            filters.toggle_criticality(value);
        }
        for value in &self.sentiments {
            Sentiment::parse(value)
                .ok_or_else(|| anyhow!("Unknown sentiment '{}'", value))?;
            filters.toggle_sentiment(value);
        }
        for value in &self.themes {
            filters.toggle_theme(value);
        }
        for value in &self.departments {
            validate_department(value)?;
            filters.toggle_department(value);
        }

        Ok(filters)
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("'{}' is not a valid date (expected YYYY-MM-DD)", value))
}

fn validate_department(value: &str) -> Result<()> {
    if DEPARTMENTS.contains(&value) {
        Ok(())
    } else {
        Err(anyhow!(
            "Unknown department '{}'. Valid departments:\n  {}",
            value,
            DEPARTMENTS.join("\n  ")
        ))
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Resolves the session to the requested company and requires the acting
/// user to hold the owner role.
fn require_owner(db: &Database, session: &Session, slug: &str) -> Result<models::Company> {
    let company = require_company_access(db, session, slug)?;
    let user = db
        .get_company_user(company.id, &session.email)?
        .ok_or_else(|| anyhow!("'{}' has no dashboard access", session.email))?;
    if user.role != "owner" {
        return Err(anyhow!("Only the company owner can manage dashboard access"));
    }
    Ok(company)
}

const FEEDBACK_MIN_CHARS: usize = 10;
const FEEDBACK_MAX_CHARS: usize = 2000;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let db = Database::open()?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Login { email } => {
            let session = Session::login(&email)?;
            println!("Logged in as {}", session.email);
        }

        Commands::Logout => {
            if Session::logout()? {
                println!("Logged out.");
            } else {
                println!("No active session.");
            }
        }

        Commands::Company { command } => {
            let mut db = Database::open()?;
            db.ensure_initialized()?;
            match command {
                CompanyCommands::Add {
                    name,
                    slug,
                    max_users,
                    owner,
                } => {
                    if max_users < 1 {
                        return Err(anyhow!("--max-users must be at least 1"));
                    }
                    let slug = slug.unwrap_or_else(|| slugify(&name));
                    if slug.is_empty() {
                        return Err(anyhow!("Could not derive a slug from '{}'; pass --slug", name));
                    }
                    let company_id = db.create_company(&name, &slug, max_users, &owner)?;
                    println!("Added company '{}' (ID: {}, slug: {})", name, company_id, slug);
                }

                CompanyCommands::List => {
                    let companies = db.list_companies()?;
                    if companies.is_empty() {
                        println!("No companies found.");
                    } else {
                        println!("{:<6} {:<25} {:<20} {:>6}", "ID", "NAME", "SLUG", "SEATS");
                        println!("{}", "-".repeat(60));
                        for company in companies {
                            println!(
                                "{:<6} {:<25} {:<20} {:>6}",
                                company.id,
                                truncate(&company.name, 23),
                                truncate(&company.slug, 18),
                                company.max_dashboard_users
                            );
                        }
                    }
                }

                CompanyCommands::Show { slug } => match db.get_company_by_slug(&slug)? {
                    Some(company) => {
                        let users = db.list_company_users(company.id)?;
                        println!("Company #{}", company.id);
                        println!("Name: {}", company.name);
                        println!("Slug: {}", company.slug);
                        println!(
                            "Dashboard seats: {}/{}",
                            users.len(),
                            company.max_dashboard_users
                        );
                        println!("Created: {}", company.created_at);
                    }
                    None => {
                        println!("Company '{}' not found.", slug);
                    }
                },
            }
        }

        Commands::Access { command } => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let session = require_session()?;
            match command {
                AccessCommands::List { company } => {
                    let company = require_company_access(&db, &session, &company)?;
                    let users = db.list_company_users(company.id)?;
                    println!(
                        "Dashboard users for '{}' ({}/{}):",
                        company.name,
                        users.len(),
                        company.max_dashboard_users
                    );
                    println!("{:<30} {:<8} {:<20}", "EMAIL", "ROLE", "SINCE");
                    println!("{}", "-".repeat(60));
                    for user in users {
                        println!(
                            "{:<30} {:<8} {:<20}",
                            truncate(&user.email, 28),
                            user.role,
                            truncate(&user.created_at, 18)
                        );
                    }
                }

                AccessCommands::Invite { company, email } => {
                    let company = require_owner(&db, &session, &company)?;
                    db.add_company_user(&company, &email)?;
                    println!("Invited '{}' to '{}'.", email, company.name);
                }

                AccessCommands::Remove { company, email } => {
                    let company = require_owner(&db, &session, &company)?;
                    if email.eq_ignore_ascii_case(&session.email) {
                        return Err(anyhow!("The owner cannot remove their own access"));
                    }
                    if db.remove_company_user(company.id, &email)? {
                        println!("Removed '{}' from '{}'.", email, company.name);
                    } else {
                        println!("'{}' has no dashboard access to '{}'.", email, company.name);
                    }
                }
            }
        }

        Commands::Submit {
            company,
            department,
            feedback_type,
            consent,
            text,
        } => {
            let db = Database::open()?;
            db.ensure_initialized()?;

            if !consent {
                return Err(anyhow!(
                    "Pass --consent to confirm the feedback is anonymous and may be analyzed"
                ));
            }
            if db.get_company_by_slug(&company)?.is_none() {
                return Err(anyhow!("Company '{}' not found", company));
            }
            validate_department(&department)?;
            if let Some(value) = &feedback_type {
                FeedbackType::parse(value)
                    .ok_or_else(|| anyhow!("Unknown feedback type '{}'", value))?;
            }

            let text = text.trim();
            let length = text.chars().count();
            if length < FEEDBACK_MIN_CHARS {
                return Err(anyhow!(
                    "Feedback must be at least {} characters",
                    FEEDBACK_MIN_CHARS
                ));
            }
            if length > FEEDBACK_MAX_CHARS {
                return Err(anyhow!(
                    "Feedback must be at most {} characters",
                    FEEDBACK_MAX_CHARS
                ));
            }

            let id = db.insert_feedback(&company, &department, feedback_type.as_deref(), text)?;
            println!("Feedback #{} recorded. Thank you.", id);
        }

        Commands::Analysis { command } => {
            let mut db = Database::open()?;
            db.ensure_initialized()?;
            match command {
                AnalysisCommands::Import { file } => {
                    let contents = std::fs::read_to_string(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    let records: Vec<AnalysisRecord> = serde_json::from_str(&contents)
                        .with_context(|| format!("Invalid analysis file {}", file.display()))?;

                    let mut imported = 0;
                    let mut skipped = 0;
                    for record in &records {
                        match db.insert_analysis(record) {
                            Ok(_) => imported += 1,
                            Err(err) => {
                                skipped += 1;
                                eprintln!("Skipping feedback #{}: {:#}", record.feedback_id, err);
                            }
                        }
                    }
                    println!("Imported {} of {} records.", imported, records.len());
                    if skipped > 0 {
                        println!("Skipped {} record(s), see above.", skipped);
                    }
                }
            }
        }

        Commands::Recent {
            company,
            limit,
            filters,
        } => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let session = require_session()?;
            let company = require_company_access(&db, &session, &company)?;

            let filters = filters.into_filters()?;
            let mut rows = db.list_analyzed(&company.slug, &filters)?;
            rows.truncate(limit);
            if rows.is_empty() {
                println!("No analyzed feedbacks for '{}'.", company.name);
            } else {
                println!(
                    "{:<12} {:<22} {:<12} {:<10} {:<6} {:<30}",
                    "DATE", "DEPARTMENT", "CATEGORY", "SENTIMENT", "CRIT", "FEEDBACK"
                );
                println!("{}", "-".repeat(96));
                for row in rows {
                    println!(
                        "{:<12} {:<22} {:<12} {:<10} {:<6} {:<30}",
                        row.created_at.format("%d/%m/%Y"),
                        truncate(&row.department, 20),
                        truncate(&row.classified_type, 10),
                        truncate(&row.sentiment, 8),
                        truncate(&row.criticality, 5),
                        truncate(&row.feedback, 28)
                    );
                }
            }
        }

        Commands::Dashboard { company, filters } => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let session = require_session()?;
            let company = require_company_access(&db, &session, &company)?;
            let filters = filters.into_filters()?;
            tui::run_dashboard(&db, &company, filters)?;
        }

        Commands::Export { command } => {
            let db = Database::open()?;
            db.ensure_initialized()?;
            let session = require_session()?;
            match command {
                ExportCommands::Report {
                    company,
                    output,
                    filters,
                } => {
                    let company = require_company_access(&db, &session, &company)?;
                    let filters = filters.into_filters()?;
                    let output = output
                        .unwrap_or_else(|| PathBuf::from(format!("relatorio-{}.pdf", company.slug)));

                    let mut exporter = ReportExporter::from_env();
                    match exporter.export(&company, &filters, &output)? {
                        ExportOutcome::Saved(path) => {
                            println!("Report saved to {}", path.display());
                        }
                        ExportOutcome::Accepted => {
                            println!("Report requested; the webhook will process it asynchronously.");
                        }
                    }
                    exporter.acknowledge();
                }

                ExportCommands::Csv {
                    company,
                    output,
                    filters,
                } => {
                    let company = require_company_access(&db, &session, &company)?;
                    let filters = filters.into_filters()?;
                    let rows = db.list_analyzed(&company.slug, &filters)?;
                    if rows.is_empty() {
                        println!("No feedbacks match the current filters.");
                    } else {
                        let output = output.unwrap_or_else(|| {
                            PathBuf::from(format!("feedbacks-{}.csv", company.slug))
                        });
                        let count = report::write_feedbacks_csv(&rows, &output)?;
                        println!("Exported {} feedback(s) to {}", count, output.display());
                    }
                }
            }
        }

        Commands::Contact {
            name,
            email,
            company,
            message,
        } => {
            contact::send_contact(&ContactPayload {
                name,
                email,
                company,
                message,
            })?;
            println!("Message sent. We will get back to you soon.");
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Ltda"), "acme-ltda");
        assert_eq!(slugify("  Nova & Boa  "), "nova-boa");
        assert_eq!(slugify("ABC123"), "abc123");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Comunicação", 20), "Comunicação");
        assert_eq!(truncate("Comunicação interna", 10), "Comunic...");
    }

    #[test]
    fn test_filter_args_days_preset() {
        let args = FilterArgs {
            days: Some(7),
            from: None,
            to: None,
            categories: vec![],
            criticalities: vec![],
            sentiments: vec![],
            themes: vec![],
            departments: vec![],
        };
        let filters = args.into_filters().unwrap();
        assert_eq!(filters.preset, PeriodPreset::Days7);
    }

    #[test]
    fn test_filter_args_rejects_bad_days() {
        let args = FilterArgs {
            days: Some(14),
            from: None,
            to: None,
            categories: vec![],
            criticalities: vec![],
            sentiments: vec![],
            themes: vec![],
            departments: vec![],
        };
        assert!(args.into_filters().is_err());
    }

    #[test]
    fn test_filter_args_explicit_range_is_custom_and_inclusive() {
        let args = FilterArgs {
            days: None,
            from: Some("2026-03-01".to_string()),
            to: Some("2026-03-05".to_string()),
            categories: vec![],
            criticalities: vec![],
            sentiments: vec![],
            themes: vec![],
            departments: vec![],
        };
        let filters = args.into_filters().unwrap();
        assert_eq!(filters.preset, PeriodPreset::Custom);
        let range = filters.effective_range();
        assert_eq!(range.start.unwrap().time(), NaiveTime::MIN);
        let end = range.end.unwrap();
        assert_eq!(end.date(), NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
        assert_eq!(end.and_utc().timestamp_subsec_millis(), 999);
    }

    #[test]
    fn test_filter_args_rejects_inverted_range() {
        let args = FilterArgs {
            days: None,
            from: Some("2026-03-10".to_string()),
            to: Some("2026-03-01".to_string()),
            categories: vec![],
            criticalities: vec![],
            sentiments: vec![],
            themes: vec![],
            departments: vec![],
        };
        assert!(args.into_filters().is_err());
    }

    #[test]
    fn test_filter_args_rejects_unknown_keys() {
        let args = FilterArgs {
            days: None,
            from: None,
            to: None,
            categories: vec!["denuncia".to_string()],
            criticalities: vec![],
            sentiments: vec![],
            themes: vec![],
            departments: vec![],
        };
        assert!(args.into_filters().is_err());

        let args = FilterArgs {
            days: None,
            from: None,
            to: None,
            categories: vec![],
            criticalities: vec![],
            sentiments: vec![],
            themes: vec![],
            departments: vec!["Jurídico".to_string()],
        };
        assert!(args.into_filters().is_err());
    }
}
