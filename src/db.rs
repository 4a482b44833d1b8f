use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection};
use std::path::PathBuf;

use crate::filters::FilterState;
use crate::models::{AnalysisRecord, AnalyzedFeedback, Company, CompanyUser, Feedback};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "voicebox") {
            Ok(proj_dirs.data_dir().join("voicebox.db"))
        } else {
            Ok(PathBuf::from("voicebox.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                max_dashboard_users INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now','localtime'))
            );

            CREATE TABLE IF NOT EXISTS company_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('owner', 'member')),
                created_at TEXT NOT NULL DEFAULT (datetime('now','localtime'))
            );

            CREATE TABLE IF NOT EXISTS feedback_raw (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_slug TEXT NOT NULL,
                department TEXT NOT NULL,
                feedback_type TEXT,
                feedback TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now','localtime'))
            );

            CREATE TABLE IF NOT EXISTS feedback_analysis (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                feedback_id INTEGER NOT NULL UNIQUE REFERENCES feedback_raw(id),
                company_slug TEXT NOT NULL,
                sentiment TEXT NOT NULL,
                classified_type TEXT NOT NULL,
                criticality TEXT NOT NULL,
                main_theme TEXT,
                executive_summary TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now','localtime'))
            );

            CREATE INDEX IF NOT EXISTS idx_users_company ON company_users(company_id);
            CREATE INDEX IF NOT EXISTS idx_raw_slug ON feedback_raw(company_slug);
            CREATE INDEX IF NOT EXISTS idx_analysis_slug ON feedback_analysis(company_slug, created_at);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='feedback_raw'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'voicebox init' first."));
        }
        Ok(())
    }

    // --- Company operations ---

    pub fn create_company(
        &mut self,
        name: &str,
        slug: &str,
        max_dashboard_users: i64,
        owner_email: &str,
    ) -> Result<i64> {
        if self.get_company_by_slug(slug)?.is_some() {
            return Err(anyhow!("Company slug '{}' already exists", slug));
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO companies (name, slug, max_dashboard_users) VALUES (?1, ?2, ?3)",
            params![name, slug, max_dashboard_users],
        )?;
        let company_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO company_users (company_id, email, name, role) VALUES (?1, ?2, ?3, 'owner')",
            params![company_id, owner_email, local_part(owner_email)],
        )?;
        tx.commit()?;
        Ok(company_id)
    }

    pub fn list_companies(&self) -> Result<Vec<Company>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, slug, max_dashboard_users, created_at FROM companies ORDER BY name",
        )?;
        let rows = stmt.query_map([], Self::row_to_company)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list companies")
    }

    pub fn get_company_by_slug(&self, slug: &str) -> Result<Option<Company>> {
        let result = self.conn.query_row(
            "SELECT id, name, slug, max_dashboard_users, created_at
             FROM companies WHERE slug = ?1",
            [slug],
            Self::row_to_company,
        );
        match result {
            Ok(company) => Ok(Some(company)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Maps a dashboard user's email to the company it belongs to.
    pub fn find_company_for_email(&self, email: &str) -> Result<Option<Company>> {
        let result = self.conn.query_row(
            "SELECT c.id, c.name, c.slug, c.max_dashboard_users, c.created_at
             FROM companies c
             JOIN company_users u ON u.company_id = c.id
             WHERE LOWER(u.email) = LOWER(?1)",
            [email],
            Self::row_to_company,
        );
        match result {
            Ok(company) => Ok(Some(company)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_company(row: &rusqlite::Row) -> rusqlite::Result<Company> {
        Ok(Company {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            max_dashboard_users: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Access list operations ---

    pub fn list_company_users(&self, company_id: i64) -> Result<Vec<CompanyUser>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_id, email, name, role, created_at
             FROM company_users WHERE company_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([company_id], Self::row_to_user)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list company users")
    }

    pub fn get_company_user(&self, company_id: i64, email: &str) -> Result<Option<CompanyUser>> {
        let result = self.conn.query_row(
            "SELECT id, company_id, email, name, role, created_at
             FROM company_users WHERE company_id = ?1 AND LOWER(email) = LOWER(?2)",
            params![company_id, email],
            Self::row_to_user,
        );
        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rejects duplicates and enforces the company's dashboard-seat limit.
    pub fn add_company_user(&self, company: &Company, email: &str) -> Result<i64> {
        if self.get_company_user(company.id, email)?.is_some() {
            return Err(anyhow!("'{}' already has dashboard access", email));
        }

        let used = self.list_company_users(company.id)?.len() as i64;
        if used >= company.max_dashboard_users {
            return Err(anyhow!(
                "Dashboard seat limit reached ({}/{})",
                used,
                company.max_dashboard_users
            ));
        }

        self.conn.execute(
            "INSERT INTO company_users (company_id, email, name, role) VALUES (?1, ?2, ?3, 'member')",
            params![company.id, email, local_part(email)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn remove_company_user(&self, company_id: i64, email: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM company_users WHERE company_id = ?1 AND LOWER(email) = LOWER(?2)",
            params![company_id, email],
        )?;
        Ok(removed > 0)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<CompanyUser> {
        Ok(CompanyUser {
            id: row.get(0)?,
            company_id: row.get(1)?,
            email: row.get(2)?,
            name: row.get(3)?,
            role: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // --- Feedback operations ---

    pub fn insert_feedback(
        &self,
        company_slug: &str,
        department: &str,
        feedback_type: Option<&str>,
        feedback: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO feedback_raw (company_slug, department, feedback_type, feedback, processed)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![company_slug, department, feedback_type, feedback],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_feedback(&self, id: i64) -> Result<Option<Feedback>> {
        let result = self.conn.query_row(
            "SELECT id, company_slug, department, feedback_type, feedback, processed, created_at
             FROM feedback_raw WHERE id = ?1",
            [id],
            |row| {
                Ok(Feedback {
                    id: row.get(0)?,
                    company_slug: row.get(1)?,
                    department: row.get(2)?,
                    feedback_type: row.get(3)?,
                    feedback: row.get(4)?,
                    processed: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        );
        match result {
            Ok(feedback) => Ok(Some(feedback)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores one record of the external pipeline's output and marks the raw
    /// row processed. Fails if the referenced feedback does not exist.
    pub fn insert_analysis(&mut self, record: &AnalysisRecord) -> Result<i64> {
        let feedback = self
            .get_feedback(record.feedback_id)?
            .ok_or_else(|| anyhow!("Feedback #{} not found", record.feedback_id))?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO feedback_analysis
                 (feedback_id, company_slug, sentiment, classified_type, criticality, main_theme, executive_summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.feedback_id,
                feedback.company_slug,
                record.sentiment,
                record.classified_type,
                record.criticality,
                record.main_theme,
                record.executive_summary,
            ],
        )?;
        let analysis_id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE feedback_raw SET processed = 1 WHERE id = ?1",
            [record.feedback_id],
        )?;
        tx.commit()?;
        Ok(analysis_id)
    }

    /// The dashboard query: mandatory slug equality, optional inclusive date
    /// bounds from the effective range, and an IN predicate per non-empty
    /// filter array. An empty array places no restriction on that dimension.
    pub fn list_analyzed(
        &self,
        company_slug: &str,
        filters: &FilterState,
    ) -> Result<Vec<AnalyzedFeedback>> {
        let mut sql = format!("{} WHERE a.company_slug = ?", ANALYZED_SELECT);
        let mut values: Vec<String> = vec![company_slug.to_string()];

        let range = filters.effective_range();
        if let Some(start) = range.start {
            sql.push_str(" AND a.created_at >= ?");
            values.push(sql_timestamp(start));
        }
        if let Some(end) = range.end {
            sql.push_str(" AND a.created_at <= ?");
            values.push(sql_timestamp(end));
        }

        push_in_clause(&mut sql, &mut values, "a.classified_type", &filters.categories);
        push_in_clause(&mut sql, &mut values, "a.criticality", &filters.criticalities);
        push_in_clause(&mut sql, &mut values, "a.sentiment", &filters.sentiments);
        push_in_clause(&mut sql, &mut values, "a.main_theme", &filters.themes);
        push_in_clause(&mut sql, &mut values, "r.department", &filters.departments);

        sql.push_str(" ORDER BY a.created_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::row_to_analyzed)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to query analyzed feedbacks")
    }

    /// Distinct themes the analysis produced for a company, for filter pick lists.
    pub fn list_themes(&self, company_slug: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT main_theme FROM feedback_analysis
             WHERE company_slug = ?1 AND main_theme IS NOT NULL ORDER BY main_theme",
        )?;
        let rows = stmt.query_map([company_slug], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list themes")
    }

    fn row_to_analyzed(row: &rusqlite::Row) -> rusqlite::Result<AnalyzedFeedback> {
        Ok(AnalyzedFeedback {
            id: row.get(0)?,
            feedback_id: row.get(1)?,
            company_slug: row.get(2)?,
            department: row.get(3)?,
            feedback: row.get(4)?,
            sentiment: row.get(5)?,
            classified_type: row.get(6)?,
            criticality: row.get(7)?,
            main_theme: row.get(8)?,
            executive_summary: row.get(9)?,
            created_at: row.get::<_, NaiveDateTime>(10)?,
        })
    }
}

const ANALYZED_SELECT: &str = "SELECT a.id, a.feedback_id, a.company_slug, r.department, r.feedback,
        a.sentiment, a.classified_type, a.criticality, a.main_theme, a.executive_summary, a.created_at
 FROM feedback_analysis a
 JOIN feedback_raw r ON a.feedback_id = r.id";

fn push_in_clause(sql: &mut String, values: &mut Vec<String>, column: &str, selected: &[String]) {
    if selected.is_empty() {
        return;
    }
    let placeholders = vec!["?"; selected.len()].join(", ");
    sql.push_str(&format!(" AND {} IN ({})", column, placeholders));
    values.extend(selected.iter().cloned());
}

/// Matches the lexicographic ordering of sqlite's datetime() text values;
/// the fraction is only printed when non-zero so midnight bounds still
/// compare equal to stored second-precision timestamps.
fn sql_timestamp(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

fn local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{DateRange, PeriodPreset};
    use chrono::{NaiveDate, NaiveTime};

    fn test_db() -> Database {
        let conn = Connection::open_in_memory().unwrap();
        let db = Database {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init().unwrap();
        db
    }

    fn seed_company(db: &mut Database) -> Company {
        db.create_company("Acme Ltda", "acme", 3, "dona@acme.com").unwrap();
        db.get_company_by_slug("acme").unwrap().unwrap()
    }

    fn seed_analyzed(db: &mut Database, sentiment: &str, classified_type: &str, date: &str) -> i64 {
        let id = db
            .insert_feedback("acme", "Financeiro", None, "um feedback qualquer")
            .unwrap();
        db.insert_analysis(&AnalysisRecord {
            feedback_id: id,
            sentiment: sentiment.to_string(),
            classified_type: classified_type.to_string(),
            criticality: "media".to_string(),
            main_theme: Some("Comunicação".to_string()),
            executive_summary: None,
        })
        .unwrap();
        // Pin the analysis timestamp so date-bound tests are deterministic.
        db.conn
            .execute(
                "UPDATE feedback_analysis SET created_at = ?1 WHERE feedback_id = ?2",
                params![date, id],
            )
            .unwrap();
        id
    }

    #[test]
    fn test_company_round_trip_and_not_found() {
        let mut db = test_db();
        let company = seed_company(&mut db);
        assert_eq!(company.name, "Acme Ltda");
        assert_eq!(company.max_dashboard_users, 3);
        assert!(db.get_company_by_slug("nope").unwrap().is_none());
        assert!(db.find_company_for_email("dona@acme.com").unwrap().is_some());
        assert!(db.find_company_for_email("DONA@ACME.COM").unwrap().is_some());
        assert!(db.find_company_for_email("x@x.com").unwrap().is_none());
    }

    #[test]
    fn test_seat_limit_and_duplicate_invite() {
        let mut db = test_db();
        let company = seed_company(&mut db);

        db.add_company_user(&company, "ana@acme.com").unwrap();
        assert!(db.add_company_user(&company, "ANA@acme.com").is_err());
        db.add_company_user(&company, "bia@acme.com").unwrap();
        // owner + 2 members == limit of 3
        assert!(db.add_company_user(&company, "caio@acme.com").is_err());

        assert!(db.remove_company_user(company.id, "bia@acme.com").unwrap());
        assert!(!db.remove_company_user(company.id, "bia@acme.com").unwrap());
        db.add_company_user(&company, "caio@acme.com").unwrap();
    }

    #[test]
    fn test_insert_analysis_marks_processed() {
        let mut db = test_db();
        seed_company(&mut db);
        let id = db
            .insert_feedback("acme", "Outro", Some("elogio"), "muito bom trabalhar aqui")
            .unwrap();
        assert!(!db.get_feedback(id).unwrap().unwrap().processed);

        db.insert_analysis(&AnalysisRecord {
            feedback_id: id,
            sentiment: "positivo".to_string(),
            classified_type: "elogio".to_string(),
            criticality: "baixa".to_string(),
            main_theme: None,
            executive_summary: Some("Elogio geral".to_string()),
        })
        .unwrap();

        assert!(db.get_feedback(id).unwrap().unwrap().processed);
        let mut filters = FilterState::default();
        filters.set_date_range(DateRange::default());
        let rows = db.list_analyzed("acme", &filters).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sentiment, "positivo");
        assert_eq!(rows[0].department, "Outro");
    }

    #[test]
    fn test_insert_analysis_unknown_feedback_fails() {
        let mut db = test_db();
        seed_company(&mut db);
        let result = db.insert_analysis(&AnalysisRecord {
            feedback_id: 999,
            sentiment: "neutro".to_string(),
            classified_type: "sugestao".to_string(),
            criticality: "baixa".to_string(),
            main_theme: None,
            executive_summary: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_filter_arrays_mean_no_restriction() {
        let mut db = test_db();
        seed_company(&mut db);
        seed_analyzed(&mut db, "positivo", "elogio", "2026-03-01 10:00:00");
        seed_analyzed(&mut db, "negativo", "problema", "2026-03-02 10:00:00");

        let mut filters = FilterState::default();
        filters.set_date_range(DateRange::default()); // custom, unbounded
        let rows = db.list_analyzed("acme", &filters).unwrap();
        assert_eq!(rows.len(), 2);
        // newest first
        assert_eq!(rows[0].classified_type, "problema");
    }

    #[test]
    fn test_in_predicates_narrow_each_dimension() {
        let mut db = test_db();
        seed_company(&mut db);
        seed_analyzed(&mut db, "positivo", "elogio", "2026-03-01 10:00:00");
        seed_analyzed(&mut db, "negativo", "problema", "2026-03-02 10:00:00");
        seed_analyzed(&mut db, "negativo", "reclamacao", "2026-03-03 10:00:00");

        let mut filters = FilterState::default();
        filters.set_date_range(DateRange::default());
        filters.toggle_sentiment("negativo");
        let rows = db.list_analyzed("acme", &filters).unwrap();
        assert_eq!(rows.len(), 2);

        filters.toggle_category("problema");
        filters.toggle_category("elogio");
        let rows = db.list_analyzed("acme", &filters).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].classified_type, "problema");
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let mut db = test_db();
        seed_company(&mut db);
        seed_analyzed(&mut db, "positivo", "elogio", "2026-03-01 00:00:00");
        seed_analyzed(&mut db, "neutro", "sugestao", "2026-03-05 23:59:59");
        seed_analyzed(&mut db, "negativo", "problema", "2026-03-06 00:00:01");

        let mut filters = FilterState::default();
        filters.set_date_range(DateRange {
            start: Some(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_time(NaiveTime::MIN)),
            end: Some(
                NaiveDate::from_ymd_opt(2026, 3, 5)
                    .unwrap()
                    .and_hms_milli_opt(23, 59, 59, 999)
                    .unwrap(),
            ),
        });
        let rows = db.list_analyzed("acme", &filters).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.classified_type != "problema"));
    }

    #[test]
    fn test_wrong_slug_matches_nothing() {
        let mut db = test_db();
        seed_company(&mut db);
        seed_analyzed(&mut db, "positivo", "elogio", "2026-03-01 10:00:00");

        let mut filters = FilterState::default();
        filters.set_preset(PeriodPreset::Days90);
        let rows = db.list_analyzed("outra", &filters).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_list_themes_distinct() {
        let mut db = test_db();
        seed_company(&mut db);
        seed_analyzed(&mut db, "positivo", "elogio", "2026-03-01 10:00:00");
        seed_analyzed(&mut db, "neutro", "sugestao", "2026-03-02 10:00:00");
        let themes = db.list_themes("acme").unwrap();
        assert_eq!(themes, vec!["Comunicação".to_string()]);
    }
}
