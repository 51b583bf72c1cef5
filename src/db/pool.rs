//! SQLite connection pool.
//!
//! The sync engine writes one merge request at a time, so the pool is small.
//! WAL mode lets analytics queries read while a sync run is writing.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

const MAX_CONNECTIONS: u32 = 4;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the mirror database at `db_path`.
///
/// Takes the path directly rather than a `sqlite:` URL so paths containing
/// `?` or `#` are not misread as URL parts.
fn connect_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
}

/// Open a pool on `db_path`, creating the file if missing. The parent
/// directory must already exist.
pub async fn create_pool(db_path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options(db_path))
        .await?;

    let mode = journal_mode(&pool).await?;
    if !mode.eq_ignore_ascii_case("wal") {
        // Network filesystems can refuse WAL; everything still works, only
        // readers block behind a running sync.
        log::warn!("SQLite journal mode for {} is {}, not wal", db_path.display(), mode);
    }

    Ok(pool)
}

async fn journal_mode(pool: &DbPool) -> Result<String, sqlx::Error> {
    let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(pool).await?;
    Ok(mode)
}
