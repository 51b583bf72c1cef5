//! Database layer for the local SQLite mirror.
//!
//! This module handles:
//! - Connection pool management with WAL mode
//! - Schema migrations tracked in `_migrations`
//! - Idempotent column evolution for tables created by older versions

pub mod pool;

use std::path::Path;
use thiserror::Error;

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// File name used when no explicit database path is configured.
pub const DEFAULT_DB_FILE: &str = "mr-insights.db";

/// Ordered list of file-based migrations.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_initial_schema",
    include_str!("migrations/0001_initial_schema.sql"),
)];

/// Nullable columns added after the initial schema shipped.
///
/// These are applied on every startup; a column that already exists is skipped.
const EVOLVED_COLUMNS: &[(&str, &str, &str)] = &[
    ("merge_requests", "first_comment_at", "INTEGER"),
    ("merge_requests", "approved_at", "INTEGER"),
    ("merge_requests", "squad", "TEXT"),
];

/// Initialize the database: create the file if needed and run migrations.
///
/// Safe to call repeatedly against the same file.
pub async fn initialize(db_path: &Path) -> Result<pool::DbPool, DbError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::Migration(format!("Failed to create database directory: {}", e))
            })?;
        }
    }

    let pool = pool::create_pool(db_path).await?;

    run_migrations(&pool).await?;
    evolve_schema(&pool).await?;

    Ok(pool)
}

/// Run all pending file-based migrations.
async fn run_migrations(pool: &pool::DbPool) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    for (name, sql) in MIGRATIONS {
        let applied: Option<(i64,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

        if applied.is_some() {
            continue;
        }

        log::info!("Applying migration {}", name);
        for statement in parse_sql_statements(sql) {
            sqlx::query(&statement).execute(&mut *conn).await?;
        }

        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Add late columns and the indexes that depend on them.
async fn evolve_schema(pool: &pool::DbPool) -> Result<(), DbError> {
    for (table, column, decl) in EVOLVED_COLUMNS {
        add_column_if_missing(pool, table, column, decl).await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_merge_requests_project_squad
         ON merge_requests (project_id, squad)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Add a nullable column to an existing table.
///
/// Returns `true` when the column was added and `false` when it was already
/// present. Any other failure is propagated.
pub async fn add_column_if_missing(
    pool: &pool::DbPool,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<bool, DbError> {
    let statement = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);

    match sqlx::query(&statement).execute(pool).await {
        Ok(_) => {
            log::info!("Added column {}.{}", table, column);
            Ok(true)
        }
        Err(sqlx::Error::Database(db_err))
            if db_err.message().contains("duplicate column name") =>
        {
            log::debug!("Column {}.{} already present", table, column);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Parse SQL statements from a migration file.
///
/// This handles:
/// - Comments (lines starting with --)
/// - Semicolons inside parentheses (e.g., `strftime('%s', 'now')`)
/// - Multi-line statements
fn parse_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current_statement = String::new();
    let mut paren_depth: i32 = 0;

    for line in sql.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("--") {
            continue;
        }

        let line_without_comment = match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        };

        for ch in line_without_comment.chars() {
            match ch {
                '(' => {
                    paren_depth += 1;
                    current_statement.push(ch);
                }
                ')' => {
                    paren_depth = (paren_depth - 1).max(0);
                    current_statement.push(ch);
                }
                ';' if paren_depth == 0 => {
                    let stmt = current_statement.trim().to_string();
                    if !stmt.is_empty() {
                        statements.push(stmt);
                    }
                    current_statement.clear();
                }
                _ => current_statement.push(ch),
            }
        }

        if !current_statement.is_empty() {
            current_statement.push(' ');
        }
    }

    let final_stmt = current_statement.trim().to_string();
    if !final_stmt.is_empty() {
        statements.push(final_stmt);
    }

    statements
}
