use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored report template. The body may contain `{placeholder}` tokens that
/// the renderer resolves against the query registry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    pub template_id: i64,
    pub template_name: String,
    pub template_text: String,
    pub created_at: DateTime<Utc>,
}

/// Output formats accepted by the renderer. Matching is exact; anything
/// unrecognized falls back to plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Markdown,
    Html,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "markdown" => OutputFormat::Markdown,
            "html" => OutputFormat::Html,
            _ => OutputFormat::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
        }
    }
}

/// Scalar extracted from the first row of a placeholder query.
///
/// SQLite columns are dynamically typed, so the renderer branches on what the
/// row actually holds: a number (INTEGER and REAL collapse to f64 for
/// display), a text value, or SQL NULL. A query returning no row at all is
/// `None` at the call site.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Null,
}
