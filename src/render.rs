//! Template rendering: placeholder extraction, query resolution, and output
//! formatting.

use crate::db::Pool;
use crate::model::{OutputFormat, Scalar};
use crate::registry::{self, QueryRegistry};
use crate::scope::scope_to_user;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{instrument, warn};

/// Substituted when a placeholder has no registry entry or its query yields
/// no value.
pub const NOT_AVAILABLE: &str = "N/A";

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^}]*)\}").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// Hydration lives in two places: the current `users` column and the legacy
/// `derived_metrics` snapshot. The registry entry stays single-sourced; the
/// resolver falls back to the legacy table only when the primary yields
/// nothing.
const HYDRATION_KEY: &str = "water_intake";
const HYDRATION_FALLBACK_SQL: &str =
    "SELECT ROUND(AVG(water_intake), 2) AS val FROM derived_metrics";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template {0} not found")]
    TemplateNotFound(i64),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Renders stored templates against a loaded query registry snapshot.
pub struct TemplateRenderer {
    pool: Pool,
    registry: QueryRegistry,
}

impl TemplateRenderer {
    /// Build a renderer with a snapshot of the current `queries` table.
    pub async fn new(pool: Pool) -> Result<Self, sqlx::Error> {
        let registry = QueryRegistry::load(&pool).await?;
        Ok(Self { pool, registry })
    }

    /// Replace the registry snapshot with the current table contents.
    pub async fn reload(&mut self) -> Result<(), sqlx::Error> {
        self.registry = QueryRegistry::load(&self.pool).await?;
        Ok(())
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    /// Render a template: each unique placeholder is resolved exactly once,
    /// then every occurrence is substituted and the output format applied.
    #[instrument(skip(self))]
    pub async fn render(
        &self,
        template_id: i64,
        format: OutputFormat,
        user_id: Option<i64>,
    ) -> Result<String, RenderError> {
        let template = registry::get_template(&self.pool, template_id)
            .await?
            .ok_or(RenderError::TemplateNotFound(template_id))?;

        let names: BTreeSet<&str> = PLACEHOLDER_RE
            .captures_iter(&template.template_text)
            .map(|caps| caps.get(1).expect("group 1 always present").as_str())
            .collect();

        let mut content = template.template_text.clone();
        for name in names {
            let value = self.resolve(name, user_id).await;
            // Plain string replace so resolved content is never re-scanned
            // for tokens.
            content = content.replace(&format!("{{{name}}}"), &value);
        }

        Ok(match format {
            OutputFormat::Text => content.trim().to_string(),
            OutputFormat::Markdown => to_markdown(&template.template_name, &content),
            OutputFormat::Html => to_html(&content),
        })
    }

    /// Resolve one placeholder to its display string. Failures stay local:
    /// a missing key or empty result becomes the sentinel, a failing query an
    /// inline `ERR:` tag.
    pub async fn resolve(&self, name: &str, user_id: Option<i64>) -> String {
        let Some(sql) = self.registry.get(name) else {
            return NOT_AVAILABLE.to_string();
        };

        let mut outcome = match self.run_scalar(sql, user_id).await {
            Ok(v) => v,
            Err(err) => {
                warn!(placeholder = name, %err, "placeholder query failed");
                return format!("ERR: {err}");
            }
        };

        if name == HYDRATION_KEY && !has_value(&outcome) {
            outcome = match self.run_scalar(HYDRATION_FALLBACK_SQL, user_id).await {
                Ok(v) => v,
                Err(err) => return format!("ERR: {err}"),
            };
        }

        match outcome {
            None | Some(Scalar::Null) => NOT_AVAILABLE.to_string(),
            Some(Scalar::Number(n)) => format_number(n),
            Some(Scalar::Text(s)) => s,
        }
    }

    async fn run_scalar(
        &self,
        sql: &str,
        user_id: Option<i64>,
    ) -> Result<Option<Scalar>, sqlx::Error> {
        let (stmt, bind) = match user_id {
            Some(uid) => {
                let scoped = scope_to_user(sql, uid);
                (scoped.sql, scoped.bind)
            }
            None => (sql.to_string(), None),
        };

        let mut query = sqlx::query(&stmt);
        if let Some(uid) = bind {
            query = query.bind(uid);
        }
        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(extract_scalar(&row)?)),
            None => Ok(None),
        }
    }
}

fn has_value(outcome: &Option<Scalar>) -> bool {
    matches!(outcome, Some(Scalar::Number(_)) | Some(Scalar::Text(_)))
}

/// Pull the scalar out of a result row: the column aliased `val` when present,
/// otherwise the first column. Branches on the stored SQLite type.
fn extract_scalar(row: &SqliteRow) -> Result<Scalar, sqlx::Error> {
    let idx = row
        .columns()
        .iter()
        .position(|c| c.name() == "val")
        .unwrap_or(0);

    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Scalar::Null);
    }
    let type_name = raw.type_info().name().to_string();
    match type_name.as_str() {
        "INTEGER" => Ok(Scalar::Number(row.try_get::<i64, _>(idx)? as f64)),
        "REAL" => Ok(Scalar::Number(row.try_get::<f64, _>(idx)?)),
        _ => Ok(Scalar::Text(row.try_get::<String, _>(idx)?)),
    }
}

/// Round to two decimals and print without trailing precision noise
/// (`24.50` → `24.5`, `42.00` → `42`).
fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}")
}

fn emphasize_numbers(text: &str, open: &str, close: &str) -> String {
    NUMBER_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{open}{}{close}", &caps[0])
        })
        .into_owned()
}

/// Markdown output: report heading, bold numbers, blank-line paragraphs.
fn to_markdown(title: &str, body: &str) -> String {
    let emphasized = emphasize_numbers(body.trim(), "**", "**");
    format!("# {}\n\n{}", title, emphasized.replace('\n', "\n\n"))
}

/// HTML output: non-empty lines become paragraphs; a body with no such lines
/// collapses to a single paragraph with explicit line breaks.
fn to_html(body: &str) -> String {
    let emphasized = emphasize_numbers(body.trim(), "<strong>", "</strong>");
    let paragraphs: Vec<String> = emphasized
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("<p>{}</p>", line.trim()))
        .collect();
    if paragraphs.is_empty() {
        format!("<p>{}</p>", emphasized.replace('\n', "<br>"))
    } else {
        paragraphs.join("\n")
    }
}
