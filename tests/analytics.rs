//! Latency analytics over data written by a real sync run.

mod common;

use common::*;
use mr_insights::services::analytics::{query_late_comments, query_stats, StatsFilter};
use mr_insights::services::squads::assign_squad_by_author;
use mr_insights::services::sync_engine::{SyncConfig, SyncEngine};

/// Sync a small project and label its authors:
///
/// | iid | author | squad    | state  | first comment | approval | merge |
/// |-----|--------|----------|--------|---------------|----------|-------|
/// | 1   | alice  | payments | merged | 10 min        | 30 min   | 60    |
/// | 2   | alice  | payments | opened | none          | none     |       |
/// | 3   | bob    | payments | closed | 100 min       |          |       |
/// | 4   | carol  | search   | opened | 45 min        |          |       |
/// | 5   | dave   | (none)   | opened | 5 min         |          |       |
async fn seeded() -> (tempfile::TempDir, mr_insights::db::pool::DbPool) {
    let (dir, pool) = test_pool().await;
    let source = FakeSource::with_project();

    let mut closed = merge_request(3, "bob", 120);
    closed.state = "closed".to_string();
    source.set_merge_requests(
        PROJECT_ID,
        vec![
            merged(merge_request(1, "alice", 0), 60),
            merge_request(2, "alice", 0),
            closed,
            merge_request(4, "carol", 50),
            merge_request(5, "dave", 10),
        ],
    );
    source.set_notes(1, vec![note(1, 2, true), note(2, 10, false)]);
    source.set_notes(3, vec![note(3, 100, false)]);
    source.set_notes(4, vec![note(4, 45, false)]);
    source.set_notes(5, vec![note(5, 5, false)]);
    source.set_approvals(1, &[at(30).as_str()]);

    let engine = SyncEngine::new(pool.clone(), source, SyncConfig::default());
    let report = engine.sync_project(&project(PROJECT_ID, "acme/api")).await.unwrap();
    assert_eq!(report.inserted, 5);

    assign_squad_by_author(&pool, PROJECT_ID, "alice", "payments").await.unwrap();
    assign_squad_by_author(&pool, PROJECT_ID, "bob", "payments").await.unwrap();
    assign_squad_by_author(&pool, PROJECT_ID, "carol", "search").await.unwrap();

    (dir, pool)
}

fn all() -> StatsFilter {
    StatsFilter {
        project_id: PROJECT_ID,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_stats_skip_missing_timestamps_and_closed() {
    let (_dir, pool) = seeded().await;
    let stats = query_stats(&pool, &all()).await.unwrap();

    let squads: Vec<&str> = stats.iter().map(|s| s.squad.as_str()).collect();
    assert_eq!(squads, vec!["payments", "search"]);

    let payments = &stats[0];
    assert_eq!(payments.total_mrs, 2);
    assert_eq!(payments.merged_mrs, 1);
    // iid 2 has no comment and iid 3 is closed; neither pulls the mean.
    assert_eq!(payments.avg_time_to_first_comment, Some(10.0));
    assert_eq!(payments.avg_time_to_approval, Some(30.0));
    assert_eq!(payments.avg_time_to_merge, Some(60.0));

    let search = &stats[1];
    assert_eq!(search.total_mrs, 1);
    assert_eq!(search.merged_mrs, 0);
    assert_eq!(search.avg_time_to_first_comment, Some(45.0));
    assert_eq!(search.avg_time_to_approval, None);
    assert_eq!(search.avg_time_to_merge, None);
}

#[tokio::test]
async fn test_late_comment_threshold_boundary() {
    let (_dir, pool) = seeded().await;

    // Exactly on the threshold is not late.
    let at_ten = query_late_comments(&pool, &all(), 10.0).await.unwrap();
    assert_eq!(at_ten.len(), 1);
    assert_eq!(at_ten[0].squad, "search");
    assert_eq!(at_ten[0].late_comments, 1);

    let below_ten = query_late_comments(&pool, &all(), 9.99).await.unwrap();
    assert_eq!(below_ten[0].squad, "payments");
    assert_eq!(below_ten[0].late_comments, 1);
    assert_eq!(below_ten[1].late_comments, 1);

    // The closed merge request's 100 minute comment never counts.
    let very_late = query_late_comments(&pool, &all(), 60.0).await.unwrap();
    assert!(very_late.is_empty());
}

#[tokio::test]
async fn test_filters_by_squad_and_date() {
    let (_dir, pool) = seeded().await;

    let search_only = StatsFilter {
        squad: Some("search".to_string()),
        ..all()
    };
    let stats = query_stats(&pool, &search_only).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].squad, "search");

    let on_day = StatsFilter {
        start_date: Some("2024-01-15".to_string()),
        end_date: Some("2024-01-15".to_string()),
        ..all()
    };
    assert_eq!(query_stats(&pool, &on_day).await.unwrap().len(), 2);

    let day_after = StatsFilter {
        start_date: Some("2024-01-16".to_string()),
        ..all()
    };
    assert!(query_stats(&pool, &day_after).await.unwrap().is_empty());

    let inverted = StatsFilter {
        start_date: Some("2024-01-16".to_string()),
        end_date: Some("2024-01-15".to_string()),
        ..all()
    };
    assert!(query_stats(&pool, &inverted).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_date_is_rejected() {
    let (_dir, pool) = seeded().await;
    let bad = StatsFilter {
        start_date: Some("2024-13-01".to_string()),
        ..all()
    };
    let err = query_stats(&pool, &bad).await.unwrap_err();
    assert!(err.to_string().contains("2024-13-01"));
}
