//! Squad classification of merge requests.
//!
//! Squads are assigned out of band, by author. The sync engine never writes
//! this column; it only carries the stored value forward.

use crate::db::pool::DbPool;
use crate::error::AppError;
use std::path::Path;

/// One `username,squad` line of a mapping file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquadMapping {
    pub author_username: String,
    pub squad: String,
}

/// Parse a mapping file body.
///
/// Blank lines and lines starting with `#` are skipped. Anything else must be
/// `username,squad` with both parts non-empty.
pub fn parse_mappings(content: &str) -> Result<Vec<SquadMapping>, AppError> {
    let mut mappings = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parsed = line
            .split_once(',')
            .map(|(user, squad)| (user.trim(), squad.trim()))
            .filter(|(user, squad)| !user.is_empty() && !squad.is_empty());

        match parsed {
            Some((user, squad)) => mappings.push(SquadMapping {
                author_username: user.to_string(),
                squad: squad.to_string(),
            }),
            None => {
                return Err(AppError::invalid_input_field(
                    format!("Line {}: expected `username,squad`, got {:?}", index + 1, line),
                    "file",
                ))
            }
        }
    }

    Ok(mappings)
}

/// Set the squad on every merge request by `author_username` in a project.
/// Returns the number of rows changed.
pub async fn assign_squad_by_author(
    pool: &DbPool,
    project_id: i64,
    author_username: &str,
    squad: &str,
) -> Result<u64, AppError> {
    if squad.trim().is_empty() {
        return Err(AppError::invalid_input_field("Squad must not be empty", "squad"));
    }

    let result = sqlx::query(
        "UPDATE merge_requests SET squad = ? WHERE project_id = ? AND author_username = ?",
    )
    .bind(squad.trim())
    .bind(project_id)
    .bind(author_username)
    .execute(pool)
    .await
    .map_err(|e| AppError::database_with_op(e.to_string(), "assign_squad"))?;

    Ok(result.rows_affected())
}

/// Apply every mapping in a file. Returns the total number of rows changed.
pub async fn assign_squads_from_file(
    pool: &DbPool,
    project_id: i64,
    path: &Path,
) -> Result<u64, AppError> {
    let content = tokio::fs::read_to_string(path).await?;
    let mappings = parse_mappings(&content)?;

    let mut total = 0;
    for mapping in &mappings {
        let changed =
            assign_squad_by_author(pool, project_id, &mapping.author_username, &mapping.squad)
                .await?;
        log::debug!(
            "{} -> {}: {} merge request(s)",
            mapping.author_username,
            mapping.squad,
            changed
        );
        total += changed;
    }

    log::info!(
        "Applied {} squad mapping(s) from {}, {} merge request(s) updated",
        mappings.len(),
        path.display(),
        total
    );
    Ok(total)
}

/// Remove the squad from one merge request.
pub async fn clear_squad(pool: &DbPool, project_id: i64, mr_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE merge_requests SET squad = NULL WHERE project_id = ? AND id = ?")
        .bind(project_id)
        .bind(mr_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "clear_squad"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found_with_id("merge_request", mr_id.to_string()));
    }
    Ok(())
}
