use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fallback color for category keys the analysis pipeline produced but the
/// dashboard does not know about.
pub const DEFAULT_CHART_COLOR: &str = "#CBD5E1";

/// Departments a submitter can pick. "Outro" must stay last.
pub const DEPARTMENTS: [&str; 8] = [
    "Administrativo/Gestão",
    "Financeiro",
    "Recursos Humanos (RH)",
    "Comercial/Marketing",
    "Operacional/Produção",
    "Tecnologia da Informação (TI)",
    "Logística/Transportes",
    "Outro",
];

/// Polarity assigned by the external analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positivo,
    Neutro,
    Negativo,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positivo, Sentiment::Neutro, Sentiment::Negativo];

    pub const fn key(self) -> &'static str {
        match self {
            Sentiment::Positivo => "positivo",
            Sentiment::Neutro => "neutro",
            Sentiment::Negativo => "negativo",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Sentiment::Positivo => "Positivo",
            Sentiment::Neutro => "Neutro",
            Sentiment::Negativo => "Negativo",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Sentiment::Positivo => "#22C55E",
            Sentiment::Neutro => "#94A3B8",
            Sentiment::Negativo => "#EF4444",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.key() == key)
    }
}

/// Feedback category assigned by the external analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Elogio,
    Sugestao,
    Problema,
    Reclamacao,
}

impl FeedbackType {
    pub const ALL: [FeedbackType; 4] = [
        FeedbackType::Elogio,
        FeedbackType::Sugestao,
        FeedbackType::Problema,
        FeedbackType::Reclamacao,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            FeedbackType::Elogio => "elogio",
            FeedbackType::Sugestao => "sugestao",
            FeedbackType::Problema => "problema",
            FeedbackType::Reclamacao => "reclamacao",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            FeedbackType::Elogio => "Elogio",
            FeedbackType::Sugestao => "Sugestão",
            FeedbackType::Problema => "Problema",
            FeedbackType::Reclamacao => "Reclamação",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            FeedbackType::Elogio => "#1E5FA8",
            FeedbackType::Sugestao => "#3B82F6",
            FeedbackType::Problema => "#60A5FA",
            FeedbackType::Reclamacao => "#93C5FD",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.key() == key)
    }
}

/// Ordinal severity tag on an analysis row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Alta,
    Media,
    Baixa,
}

impl Criticality {
    pub const ALL: [Criticality; 3] = [Criticality::Alta, Criticality::Media, Criticality::Baixa];

    pub const fn key(self) -> &'static str {
        match self {
            Criticality::Alta => "alta",
            Criticality::Media => "media",
            Criticality::Baixa => "baixa",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Criticality::Alta => "Alta",
            Criticality::Media => "Média",
            Criticality::Baixa => "Baixa",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Criticality::Alta => "#EF4444",
            Criticality::Media => "#FACC15",
            Criticality::Baixa => "#22C55E",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.key() == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub max_dashboard_users: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyUser {
    pub id: i64,
    pub company_id: i64,
    pub email: String,
    pub name: String,
    pub role: String, // "owner", "member"
    pub created_at: String,
}

/// Raw anonymous submission. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub company_slug: String,
    pub department: String,
    pub feedback_type: Option<String>, // self-reported, optional
    pub feedback: String,
    pub processed: bool,
    pub created_at: String,
}

/// Analysis row joined with the raw submission it references.
/// Classified fields stay raw strings so unknown keys coming from the
/// pipeline still render (with fallback label/color) instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedFeedback {
    pub id: i64,
    pub feedback_id: i64,
    pub company_slug: String,
    pub department: String,
    pub feedback: String,
    pub sentiment: String,
    pub classified_type: String,
    pub criticality: String,
    pub main_theme: Option<String>,
    pub executive_summary: Option<String>,
    pub created_at: NaiveDateTime,
}

/// One record of the external pipeline's output file.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRecord {
    pub feedback_id: i64,
    pub sentiment: String,
    pub classified_type: String,
    pub criticality: String,
    #[serde(default)]
    pub main_theme: Option<String>,
    #[serde(default)]
    pub executive_summary: Option<String>,
}
