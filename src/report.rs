//! Dashboard report export: serializes the current filters, posts them to
//! the report webhook and saves whatever comes back, or falls back to a
//! locally generated HTML summary when no webhook is configured. Also the
//! CSV export of filtered rows.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::filters::FilterState;
use crate::models::{AnalyzedFeedback, Company};

pub const REPORT_WEBHOOK_ENV: &str = "VOICEBOX_REPORT_WEBHOOK_URL";

// --- Webhook payload ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub company_slug: String,
    pub company_name: String,
    pub filters: ExportFilters,
    pub requested_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilters {
    pub period_preset: String,
    pub date_range: ExportDateRange,
    pub categories: Vec<String>,
    pub criticalities: Vec<String>,
    pub sentiments: Vec<String>,
    pub themes: Vec<String>,
    pub departments: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportDateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

pub fn build_payload(company: &Company, filters: &FilterState) -> ExportPayload {
    let range = filters.effective_range();
    ExportPayload {
        company_slug: company.slug.clone(),
        company_name: company.name.clone(),
        filters: ExportFilters {
            period_preset: filters.preset.key().to_string(),
            date_range: ExportDateRange {
                start: range.start.map(iso_timestamp),
                end: range.end.map(iso_timestamp),
            },
            categories: filters.categories.clone(),
            criticalities: filters.criticalities.clone(),
            sentiments: filters.sentiments.clone(),
            themes: filters.themes.clone(),
            departments: filters.departments.clone(),
        },
        requested_at: Local::now().to_rfc3339(),
    }
}

fn iso_timestamp(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

// --- Export state machine ---

/// Idle -> Requesting -> (Success | Failed) -> Idle. One attempt, no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Requesting,
    Success,
    Failed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// A report file landed on disk.
    Saved(PathBuf),
    /// The webhook accepted the request for asynchronous processing.
    Accepted,
}

pub struct ReportExporter {
    client: reqwest::blocking::Client,
    webhook_url: Option<String>,
    state: ExportState,
}

impl ReportExporter {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            webhook_url: webhook_url.filter(|url| !url.trim().is_empty()),
            state: ExportState::Idle,
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var(REPORT_WEBHOOK_ENV).ok())
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Returns the state machine to Idle once the caller has surfaced the
    /// outcome. There is deliberately no retry path.
    pub fn acknowledge(&mut self) {
        self.state = ExportState::Idle;
    }

    pub fn export(
        &mut self,
        company: &Company,
        filters: &FilterState,
        output: &Path,
    ) -> Result<ExportOutcome> {
        self.state = ExportState::Requesting;
        let result = self.run(company, filters, output);
        self.state = if result.is_ok() {
            ExportState::Success
        } else {
            ExportState::Failed
        };
        result
    }

    fn run(&self, company: &Company, filters: &FilterState, output: &Path) -> Result<ExportOutcome> {
        let url = match &self.webhook_url {
            Some(url) => url.clone(),
            None => {
                // Deliberate fallback, not an error: no webhook configured
                // means a local HTML summary and no network at all.
                return export_local(company, filters, output);
            }
        };

        let payload = build_payload(company, filters);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .context("Failed to reach report webhook")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("Report webhook returned {}: {}", status, body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/pdf") {
            let bytes = response.bytes().context("Failed to read PDF response")?;
            std::fs::write(output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            return Ok(ExportOutcome::Saved(output.to_path_buf()));
        }

        if content_type.contains("application/json") {
            let body: serde_json::Value =
                response.json().context("Failed to parse webhook JSON response")?;
            return self.handle_json_response(&body, output);
        }

        // Unknown content type: assume the body is the PDF anyway.
        let bytes = response.bytes().context("Failed to read report response")?;
        std::fs::write(output, &bytes)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        Ok(ExportOutcome::Saved(output.to_path_buf()))
    }

    fn handle_json_response(
        &self,
        body: &serde_json::Value,
        output: &Path,
    ) -> Result<ExportOutcome> {
        if let Some(pdf_url) = body.get("pdfUrl").and_then(|v| v.as_str()) {
            self.download_pdf(pdf_url, output)?;
            return Ok(ExportOutcome::Saved(output.to_path_buf()));
        }

        if let Some(encoded) = body.get("pdfBase64").and_then(|v| v.as_str()) {
            let bytes = BASE64
                .decode(encoded)
                .context("Webhook returned invalid base64 PDF")?;
            std::fs::write(output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            return Ok(ExportOutcome::Saved(output.to_path_buf()));
        }

        if let Some(message) = body.get("error").and_then(|v| v.as_str()) {
            return Err(anyhow!("Report webhook error: {}", message));
        }

        // JSON without a PDF: acknowledgment of asynchronous processing.
        Ok(ExportOutcome::Accepted)
    }

    fn download_pdf(&self, url: &str, output: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to download PDF from {}", url))?;
        if !response.status().is_success() {
            return Err(anyhow!("PDF download returned {}", response.status()));
        }
        let bytes = response.bytes().context("Failed to read PDF body")?;
        std::fs::write(output, &bytes)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        Ok(())
    }
}

// --- Local fallback (no webhook configured) ---

fn export_local(company: &Company, filters: &FilterState, output: &Path) -> Result<ExportOutcome> {
    let html = local_report_html(&company.name, filters);
    let path = output.with_extension("html");
    std::fs::write(&path, html)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(ExportOutcome::Saved(path))
}

fn local_report_html(company_name: &str, filters: &FilterState) -> String {
    let range = filters.effective_range();
    let period = format!(
        "{} até {}",
        format_range_end(range.start),
        format_range_end(range.end)
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
  <meta charset="UTF-8">
  <title>Relatório - {company}</title>
  <style>
    body {{ font-family: Arial, sans-serif; padding: 40px; max-width: 800px; margin: 0 auto; }}
    h1 {{ color: #1E5FA8; }}
    table {{ width: 100%; border-collapse: collapse; margin-top: 10px; }}
    th, td {{ padding: 8px; text-align: left; border-bottom: 1px solid #ddd; }}
    th {{ background: #1E5FA8; color: white; }}
  </style>
</head>
<body>
  <h1>Relatório de Feedbacks</h1>
  <p><strong>Empresa:</strong> {company}</p>
  <p><strong>Gerado em:</strong> {generated}</p>
  <h2>Filtros Aplicados</h2>
  <table>
    <tr><th>Filtro</th><th>Valor</th></tr>
    <tr><td>Período</td><td>{period}</td></tr>
    <tr><td>Categorias</td><td>{categories}</td></tr>
    <tr><td>Criticidades</td><td>{criticalities}</td></tr>
    <tr><td>Sentimentos</td><td>{sentiments}</td></tr>
    <tr><td>Setores</td><td>{departments}</td></tr>
    <tr><td>Temas</td><td>{themes}</td></tr>
  </table>
  <p><em>Configure o webhook de relatórios para obter o relatório completo.</em></p>
</body>
</html>
"#,
        company = escape_html(company_name),
        generated = Local::now().format("%d/%m/%Y %H:%M"),
        period = escape_html(&period),
        categories = escape_html(&join_or_all(&filters.categories, "Todas")),
        criticalities = escape_html(&join_or_all(&filters.criticalities, "Todas")),
        sentiments = escape_html(&join_or_all(&filters.sentiments, "Todos")),
        departments = escape_html(&join_or_all(&filters.departments, "Todos")),
        themes = escape_html(&join_or_all(&filters.themes, "Todos")),
    )
}

fn format_range_end(end: Option<NaiveDateTime>) -> String {
    match end {
        Some(dt) => dt.format("%d/%m/%Y").to_string(),
        None => "N/A".to_string(),
    }
}

fn join_or_all(values: &[String], all_label: &str) -> String {
    if values.is_empty() {
        all_label.to_string()
    } else {
        values.join(", ")
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// --- CSV export ---

const CSV_BOM: &str = "\u{FEFF}";
const CSV_HEADERS: [&str; 8] = [
    "Data",
    "Setor",
    "Tema",
    "Categoria",
    "Sentimento",
    "Criticidade",
    "Resumo",
    "Feedback Original",
];

pub fn write_feedbacks_csv(rows: &[AnalyzedFeedback], output: &Path) -> Result<usize> {
    std::fs::write(output, csv_content(rows))
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(rows.len())
}

/// Semicolon-delimited, BOM-prefixed so spreadsheet apps pick up UTF-8.
pub fn csv_content(rows: &[AnalyzedFeedback]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(CSV_HEADERS.join(";"));

    for row in rows {
        let fields = [
            row.created_at.format("%d/%m/%Y").to_string(),
            escape_csv_field(&row.department),
            escape_csv_field(row.main_theme.as_deref().unwrap_or("")),
            escape_csv_field(&row.classified_type),
            escape_csv_field(&row.sentiment),
            escape_csv_field(&row.criticality),
            escape_csv_field(row.executive_summary.as_deref().unwrap_or("")),
            escape_csv_field(&row.feedback),
        ];
        lines.push(fields.join(";"));
    }

    format!("{}{}", CSV_BOM, lines.join("\n"))
}

/// Doubles internal quotes, wraps only when the value contains the
/// delimiter, a quote, or a newline. Plain fields pass through unchanged.
fn escape_csv_field(field: &str) -> String {
    if field.is_empty() {
        return String::new();
    }
    let escaped = field.replace('"', "\"\"");
    if escaped.contains(';') || escaped.contains('"') || escaped.contains('\n') {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{DateRange, PeriodPreset};
    use chrono::{NaiveDate, NaiveTime};

    fn company() -> Company {
        Company {
            id: 1,
            name: "Acme Ltda".to_string(),
            slug: "acme".to_string(),
            max_dashboard_users: 3,
            created_at: "2026-01-01 00:00:00".to_string(),
        }
    }

    fn analyzed(feedback: &str, summary: Option<&str>) -> AnalyzedFeedback {
        AnalyzedFeedback {
            id: 1,
            feedback_id: 1,
            company_slug: "acme".to_string(),
            department: "Financeiro".to_string(),
            feedback: feedback.to_string(),
            sentiment: "negativo".to_string(),
            classified_type: "problema".to_string(),
            criticality: "alta".to_string(),
            main_theme: Some("Processos".to_string()),
            executive_summary: summary.map(|s| s.to_string()),
            created_at: NaiveDate::from_ymd_opt(2026, 3, 15)
                .unwrap()
                .and_time(NaiveTime::MIN),
        }
    }

    #[test]
    fn test_escape_plain_field_unchanged() {
        assert_eq!(escape_csv_field("sem problemas"), "sem problemas");
        assert_eq!(escape_csv_field(""), "");
    }

    #[test]
    fn test_escape_delimiter_and_quotes() {
        assert_eq!(escape_csv_field("a;b"), "\"a;b\"");
        assert_eq!(escape_csv_field("disse \"oi\""), "\"disse \"\"oi\"\"\"");
        assert_eq!(escape_csv_field("linha\nquebrada"), "\"linha\nquebrada\"");
    }

    #[test]
    fn test_csv_content_bom_header_and_row() {
        let rows = vec![analyzed("tudo certo; quase", None)];
        let content = csv_content(&rows);
        assert!(content.starts_with('\u{FEFF}'));

        let mut lines = content.trim_start_matches('\u{FEFF}').lines();
        assert_eq!(
            lines.next().unwrap(),
            "Data;Setor;Tema;Categoria;Sentimento;Criticidade;Resumo;Feedback Original"
        );
        assert_eq!(
            lines.next().unwrap(),
            "15/03/2026;Financeiro;Processos;problema;negativo;alta;;\"tudo certo; quase\""
        );
    }

    #[test]
    fn test_payload_wire_shape() {
        let mut filters = FilterState::default();
        filters.set_preset(PeriodPreset::Days7);
        filters.toggle_sentiment("negativo");

        let payload = build_payload(&company(), &filters);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["companySlug"], "acme");
        assert_eq!(json["companyName"], "Acme Ltda");
        assert_eq!(json["filters"]["periodPreset"], "7");
        assert_eq!(json["filters"]["sentiments"][0], "negativo");
        assert!(json["filters"]["dateRange"]["start"].is_string());
        assert!(json["requestedAt"].is_string());
    }

    #[test]
    fn test_payload_open_range_serializes_null() {
        let mut filters = FilterState::default();
        filters.set_date_range(DateRange::default());
        let payload = build_payload(&company(), &filters);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["filters"]["periodPreset"], "custom");
        assert!(json["filters"]["dateRange"]["start"].is_null());
        assert!(json["filters"]["dateRange"]["end"].is_null());
    }

    #[test]
    fn test_unconfigured_webhook_writes_local_html() {
        let mut exporter = ReportExporter::new(None);
        assert_eq!(exporter.state(), ExportState::Idle);

        let output = std::env::temp_dir().join(format!("voicebox-test-{}.pdf", std::process::id()));
        let outcome = exporter
            .export(&company(), &FilterState::default(), &output)
            .unwrap();
        assert_eq!(exporter.state(), ExportState::Success);

        let path = match outcome {
            ExportOutcome::Saved(path) => path,
            ExportOutcome::Accepted => panic!("local export must produce a file"),
        };
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("html"));
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("Acme Ltda"));
        assert!(html.contains("Filtros Aplicados"));
        std::fs::remove_file(&path).ok();

        exporter.acknowledge();
        assert_eq!(exporter.state(), ExportState::Idle);
    }

    #[test]
    fn test_blank_webhook_url_counts_as_unconfigured() {
        let exporter = ReportExporter::new(Some("  ".to_string()));
        assert!(exporter.webhook_url.is_none());
    }
}
