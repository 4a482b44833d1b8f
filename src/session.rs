//! Explicit session state passed to gated operations, persisted in the data
//! directory. The identity provider itself (OAuth flows) is outside this
//! tool; logging in records which dashboard user is acting.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::db::Database;
use crate::models::Company;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    pub logged_in_at: String,
}

impl Session {
    fn path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "voicebox") {
            Ok(proj_dirs.data_dir().join("session.json"))
        } else {
            Ok(PathBuf::from("session.json"))
        }
    }

    pub fn login(email: &str) -> Result<Session> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(anyhow!("'{}' is not a valid email address", email));
        }
        let session = Session {
            email: email.trim().to_string(),
            logged_in_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&session)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        Ok(session)
    }

    pub fn load() -> Result<Option<Session>> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let session = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt session file: {}", path.display()))?;
        Ok(Some(session))
    }

    /// Returns true if there was a session to clear.
    pub fn logout() -> Result<bool> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove session file: {}", path.display()))?;
        Ok(true)
    }
}

pub fn require_session() -> Result<Session> {
    Session::load()?.ok_or_else(|| anyhow!("Not logged in. Run 'voicebox login <email>' first."))
}

/// The company gate: the session's email must resolve to a company user of
/// exactly the requested company. Anything else is unauthorized, never
/// partial data.
pub fn require_company_access(db: &Database, session: &Session, slug: &str) -> Result<Company> {
    let company = db
        .find_company_for_email(&session.email)?
        .ok_or_else(|| anyhow!("'{}' has no dashboard access", session.email))?;

    if company.slug != slug {
        return Err(anyhow!(
            "'{}' is not authorized for company '{}'",
            session.email,
            slug
        ));
    }

    Ok(company)
}
