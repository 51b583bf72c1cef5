//! GitLab project model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Mirrored GitLab project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Project {
    /// GitLab project ID.
    pub id: i64,

    /// Short project name (e.g., "Backend").
    pub name: String,

    /// Path with namespace (e.g., "acme/backend").
    pub path_with_namespace: String,

    /// Creation timestamp (Unix), if GitLab reported one.
    pub created_at: Option<i64>,
}

/// Look up a project by ID.
pub async fn get_project(
    pool: &sqlx::SqlitePool,
    project_id: i64,
) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT id, name, path_with_namespace, created_at FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await
}

/// Upsert a project (insert or overwrite on conflict).
pub async fn upsert_project(pool: &sqlx::SqlitePool, project: &Project) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO projects (id, name, path_with_namespace, created_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           path_with_namespace = excluded.path_with_namespace,
           created_at = excluded.created_at",
    )
    .bind(project.id)
    .bind(&project.name)
    .bind(&project.path_with_namespace)
    .bind(project.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// List all mirrored projects ordered by path.
pub async fn list_projects(pool: &sqlx::SqlitePool) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT id, name, path_with_namespace, created_at FROM projects ORDER BY path_with_namespace",
    )
    .fetch_all(pool)
    .await
}
