//! Review latency aggregates over the mirrored merge requests.
//!
//! All figures are minutes since `created_at`, grouped by squad. Closed and
//! unclassified merge requests never count. Values are not rounded here.

use crate::db::pool::DbPool;
use crate::error::AppError;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Selection applied to every analytics query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsFilter {
    pub project_id: i64,

    /// First day included, `YYYY-MM-DD`.
    pub start_date: Option<String>,

    /// Last day included, `YYYY-MM-DD`.
    pub end_date: Option<String>,

    /// Restrict to one squad.
    pub squad: Option<String>,
}

/// Per-squad latency aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SquadStats {
    pub squad: String,
    pub total_mrs: i64,
    pub merged_mrs: i64,

    /// Mean minutes to the first human comment; `None` if no merge request has one.
    pub avg_time_to_first_comment: Option<f64>,
    pub avg_time_to_approval: Option<f64>,
    pub avg_time_to_merge: Option<f64>,
}

/// Number of merge requests per squad whose first comment came too late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct LateCommentCount {
    pub squad: String,
    pub late_comments: i64,
}

/// `created_at` bounds in Unix seconds, start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CreatedRange {
    start: Option<i64>,
    end: Option<i64>,
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::invalid_input_field(
            format!("Invalid date {:?}, expected YYYY-MM-DD", value),
            field,
        )
    })
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Turn the filter's dates into a range. `Ok(None)` means the range is empty.
fn created_range(filter: &StatsFilter) -> Result<Option<CreatedRange>, AppError> {
    let start = filter
        .start_date
        .as_deref()
        .map(|s| parse_date(s, "start_date"))
        .transpose()?;
    let end = filter
        .end_date
        .as_deref()
        .map(|s| parse_date(s, "end_date"))
        .transpose()?;

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Ok(None);
        }
    }

    let end = match end {
        Some(date) => Some(
            date.checked_add_days(Days::new(1))
                .map(midnight_utc)
                .ok_or_else(|| AppError::invalid_input_field("End date out of range", "end_date"))?,
        ),
        None => None,
    };

    Ok(Some(CreatedRange {
        start: start.map(midnight_utc),
        end,
    }))
}

const SCOPE: &str = r#"
    project_id = ?
    AND state != 'closed'
    AND squad IS NOT NULL
    AND (? IS NULL OR created_at >= ?)
    AND (? IS NULL OR created_at < ?)
    AND (? IS NULL OR squad = ?)
"#;

/// Latency aggregates per squad, ordered by squad.
pub async fn query_stats(pool: &DbPool, filter: &StatsFilter) -> Result<Vec<SquadStats>, AppError> {
    let Some(range) = created_range(filter)? else {
        return Ok(Vec::new());
    };

    let query = format!(
        r#"
        SELECT
            squad,
            COUNT(*) AS total_mrs,
            SUM(CASE WHEN state = 'merged' THEN 1 ELSE 0 END) AS merged_mrs,
            AVG((first_comment_at - created_at) / 60.0) AS avg_time_to_first_comment,
            AVG((approved_at - created_at) / 60.0) AS avg_time_to_approval,
            AVG((merged_at - created_at) / 60.0) AS avg_time_to_merge
        FROM merge_requests
        WHERE {}
        GROUP BY squad
        ORDER BY squad
        "#,
        SCOPE
    );

    let rows = sqlx::query_as::<_, SquadStats>(&query)
        .bind(filter.project_id)
        .bind(range.start)
        .bind(range.start)
        .bind(range.end)
        .bind(range.end)
        .bind(filter.squad.as_deref())
        .bind(filter.squad.as_deref())
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "query_stats"))?;

    Ok(rows)
}

/// Count, per squad, merge requests whose first human comment arrived more
/// than `threshold_minutes` after creation. Squads with no late comment are
/// omitted.
pub async fn query_late_comments(
    pool: &DbPool,
    filter: &StatsFilter,
    threshold_minutes: f64,
) -> Result<Vec<LateCommentCount>, AppError> {
    if !threshold_minutes.is_finite() {
        return Err(AppError::invalid_input_field(
            "Threshold must be a finite number of minutes",
            "threshold",
        ));
    }

    let Some(range) = created_range(filter)? else {
        return Ok(Vec::new());
    };

    let query = format!(
        r#"
        SELECT squad, COUNT(*) AS late_comments
        FROM merge_requests
        WHERE {}
            AND first_comment_at IS NOT NULL
            AND (first_comment_at - created_at) / 60.0 > ?
        GROUP BY squad
        ORDER BY squad
        "#,
        SCOPE
    );

    let rows = sqlx::query_as::<_, LateCommentCount>(&query)
        .bind(filter.project_id)
        .bind(range.start)
        .bind(range.start)
        .bind(range.end)
        .bind(range.end)
        .bind(filter.squad.as_deref())
        .bind(filter.squad.as_deref())
        .bind(threshold_minutes)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "query_late_comments"))?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::merge_request::{upsert_merge_request, MergeRequest};
    use crate::models::project::{upsert_project, Project};
    use tempfile::tempdir;

    // 2024-01-15T00:00:00Z
    const DAY: i64 = 1_705_276_800;

    fn mr(id: i64, state: &str, squad: Option<&str>, created_at: i64) -> MergeRequest {
        MergeRequest {
            id,
            project_id: 1,
            iid: id,
            title: format!("MR {}", id),
            web_url: String::new(),
            state: state.to_string(),
            author_id: 1,
            author_username: "alice".to_string(),
            created_at,
            updated_at: created_at,
            first_comment_at: None,
            approved_at: None,
            merged_at: None,
            squad: squad.map(str::to_string),
            cached_at: 0,
        }
    }

    async fn setup(mrs: &[MergeRequest]) -> (tempfile::TempDir, DbPool) {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        upsert_project(
            &pool,
            &Project {
                id: 1,
                name: "api".to_string(),
                path_with_namespace: "acme/api".to_string(),
                created_at: None,
            },
        )
        .await
        .unwrap();
        for m in mrs {
            upsert_merge_request(&pool, m).await.unwrap();
        }
        (dir, pool)
    }

    fn filter() -> StatsFilter {
        StatsFilter {
            project_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_created_range_is_inclusive() {
        let range = created_range(&StatsFilter {
            start_date: Some("2024-01-15".to_string()),
            end_date: Some("2024-01-15".to_string()),
            ..filter()
        })
        .unwrap()
        .unwrap();
        assert_eq!(range.start, Some(DAY));
        assert_eq!(range.end, Some(DAY + 86_400));
    }

    #[test]
    fn test_created_range_rejects_bad_dates() {
        let err = created_range(&StatsFilter {
            end_date: Some("15/01/2024".to_string()),
            ..filter()
        })
        .unwrap_err();
        match err {
            AppError::InvalidInput { field, .. } => assert_eq!(field.as_deref(), Some("end_date")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_start_after_end_is_empty() {
        let range = created_range(&StatsFilter {
            start_date: Some("2024-02-01".to_string()),
            end_date: Some("2024-01-01".to_string()),
            ..filter()
        })
        .unwrap();
        assert!(range.is_none());
    }

    #[tokio::test]
    async fn test_stats_per_squad() {
        let mut a = mr(1, "merged", Some("payments"), DAY);
        a.first_comment_at = Some(DAY + 600);
        a.approved_at = Some(DAY + 1_200);
        a.merged_at = Some(DAY + 3_600);
        let mut b = mr(2, "opened", Some("payments"), DAY);
        b.first_comment_at = Some(DAY + 1_800);
        let c = mr(3, "opened", Some("search"), DAY);
        let d = mr(4, "closed", Some("search"), DAY);
        let e = mr(5, "opened", None, DAY);

        let (_dir, pool) = setup(&[a, b, c, d, e]).await;
        let stats = query_stats(&pool, &filter()).await.unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].squad, "payments");
        assert_eq!(stats[0].total_mrs, 2);
        assert_eq!(stats[0].merged_mrs, 1);
        assert_eq!(stats[0].avg_time_to_first_comment, Some(20.0));
        assert_eq!(stats[0].avg_time_to_approval, Some(20.0));
        assert_eq!(stats[0].avg_time_to_merge, Some(60.0));

        assert_eq!(stats[1].squad, "search");
        assert_eq!(stats[1].total_mrs, 1);
        assert_eq!(stats[1].avg_time_to_first_comment, None);
    }

    #[tokio::test]
    async fn test_stats_date_and_squad_filters() {
        let early = mr(1, "opened", Some("payments"), DAY - 1);
        let first = mr(2, "opened", Some("payments"), DAY);
        let last = mr(3, "opened", Some("payments"), DAY + 86_399);
        let next = mr(4, "opened", Some("payments"), DAY + 86_400);
        let other = mr(5, "opened", Some("search"), DAY + 10);

        let (_dir, pool) = setup(&[early, first, last, next, other]).await;
        let one_day = StatsFilter {
            start_date: Some("2024-01-15".to_string()),
            end_date: Some("2024-01-15".to_string()),
            ..filter()
        };

        let stats = query_stats(&pool, &one_day).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].total_mrs, 2);

        let payments_only = StatsFilter {
            squad: Some("payments".to_string()),
            ..one_day
        };
        let stats = query_stats(&pool, &payments_only).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].squad, "payments");
    }

    #[tokio::test]
    async fn test_late_comments_threshold_is_strict() {
        let mut on_time = mr(1, "opened", Some("payments"), DAY);
        on_time.first_comment_at = Some(DAY + 600);
        let mut late = mr(2, "opened", Some("payments"), DAY);
        late.first_comment_at = Some(DAY + 601);
        let silent = mr(3, "opened", Some("payments"), DAY);

        let (_dir, pool) = setup(&[on_time, late, silent]).await;

        let counts = query_late_comments(&pool, &filter(), 10.0).await.unwrap();
        assert_eq!(
            counts,
            vec![LateCommentCount {
                squad: "payments".to_string(),
                late_comments: 1
            }]
        );

        let counts = query_late_comments(&pool, &filter(), 9.99).await.unwrap();
        assert_eq!(counts[0].late_comments, 2);
    }

    #[tokio::test]
    async fn test_late_comments_rejects_nan() {
        let (_dir, pool) = setup(&[]).await;
        assert!(query_late_comments(&pool, &filter(), f64::NAN).await.is_err());
    }
}
