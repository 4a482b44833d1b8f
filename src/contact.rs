//! Contact-form webhook client. Unlike the report export there is no local
//! fallback: a missing URL is a configuration error.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;

pub const CONTACT_URL_ENV: &str = "VOICEBOX_CONTACT_WEBHOOK_URL";
pub const CONTACT_API_KEY_ENV: &str = "VOICEBOX_CONTACT_API_KEY";

#[derive(Debug, Clone, Serialize)]
pub struct ContactPayload {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub message: String,
}

pub fn send_contact(payload: &ContactPayload) -> Result<()> {
    validate(payload)?;

    let url = env::var(CONTACT_URL_ENV)
        .with_context(|| format!("{} environment variable not set", CONTACT_URL_ENV))?;
    let api_key = env::var(CONTACT_API_KEY_ENV).unwrap_or_default();

    let client = reqwest::blocking::Client::new();
    let response = client
        .post(&url)
        .header("x-api-key", api_key)
        .json(payload)
        .send()
        .context("Failed to reach contact webhook")?;

    if !response.status().is_success() {
        let body = response.text().unwrap_or_default();
        return Err(anyhow!("Failed to send contact message: {}", body));
    }

    Ok(())
}

fn validate(payload: &ContactPayload) -> Result<()> {
    if payload.name.trim().is_empty() {
        return Err(anyhow!("Name is required"));
    }
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err(anyhow!("'{}' is not a valid email address", payload.email));
    }
    if payload.message.trim().is_empty() {
        return Err(anyhow!("Message is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ContactPayload {
        ContactPayload {
            name: "Maria".to_string(),
            email: "maria@empresa.com".to_string(),
            company: Some("Empresa".to_string()),
            message: "Quero saber mais.".to_string(),
        }
    }

    #[test]
    fn test_valid_payload_passes() {
        assert!(validate(&payload()).is_ok());
    }

    #[test]
    fn test_rejects_blank_fields() {
        let mut p = payload();
        p.name = "  ".to_string();
        assert!(validate(&p).is_err());

        let mut p = payload();
        p.message = String::new();
        assert!(validate(&p).is_err());
    }

    #[test]
    fn test_rejects_invalid_email() {
        let mut p = payload();
        p.email = "sem-arroba".to_string();
        assert!(validate(&p).is_err());
    }

    #[test]
    fn test_payload_wire_shape() {
        let json = serde_json::to_value(payload()).unwrap();
        assert_eq!(json["name"], "Maria");
        assert_eq!(json["email"], "maria@empresa.com");
        assert_eq!(json["company"], "Empresa");
        assert_eq!(json["message"], "Quero saber mais.");
    }
}
