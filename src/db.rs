use anyhow::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// A dynamically typed bind value for statements assembled at runtime
/// (bulk inserts, partial updates).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Integer(v)
    }
}

impl From<Option<f64>> for SqlParam {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(n) => SqlParam::Real(n),
            None => SqlParam::Null,
        }
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

pub(crate) fn bind_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    param: &SqlParam,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match param {
        SqlParam::Integer(v) => query.bind(*v),
        SqlParam::Real(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Null => query.bind(None::<f64>),
    }
}

/// Bulk-insert rows into `table`. Each row must match `columns` in length.
#[instrument(skip_all, fields(table = table, rows = rows.len()))]
pub async fn insert_many(
    pool: &Pool,
    table: &str,
    columns: &[&str],
    rows: &[Vec<SqlParam>],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    insert_many_tx(&mut tx, table, columns, rows).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn insert_many_tx(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    columns: &[&str],
    rows: &[Vec<SqlParam>],
) -> Result<(), sqlx::Error> {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    );
    for row in rows {
        let mut query = sqlx::query(&sql);
        for param in row {
            query = bind_param(query, param);
        }
        query.execute(&mut **tx).await?;
    }
    Ok(())
}

/// Delete all rows from the given tables.
#[instrument(skip_all)]
pub async fn truncate_tables(pool: &Pool, tables: &[&str]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    truncate_tables_tx(&mut tx, tables).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn truncate_tables_tx(
    tx: &mut Transaction<'_, Sqlite>,
    tables: &[&str],
) -> Result<(), sqlx::Error> {
    for table in tables {
        let sql = format!("DELETE FROM {}", table);
        sqlx::query(&sql).execute(&mut **tx).await?;
    }
    Ok(())
}
