pub mod models;
pub mod repositories;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS boards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        nsfw INTEGER NOT NULL DEFAULT 0,
        next_post_no INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS threads (
        id INTEGER PRIMARY KEY,
        board_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        bumped_at TEXT,
        sticky INTEGER NOT NULL DEFAULT 0,
        locked INTEGER NOT NULL DEFAULT 0,
        archived INTEGER NOT NULL DEFAULT 0,
        archived_at TEXT,
        reply_count INTEGER NOT NULL DEFAULT 0,
        image_count INTEGER NOT NULL DEFAULT 0,
        op_post_id INTEGER,
        FOREIGN KEY (board_id) REFERENCES boards(id)
    );

    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        thread_id INTEGER NOT NULL,
        board_post_no INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        content TEXT NOT NULL DEFAULT '',
        content_html TEXT,
        is_op INTEGER NOT NULL DEFAULT 0,
        author_name TEXT NOT NULL DEFAULT 'Anonymous',
        tripcode TEXT,
        capcode TEXT,
        subject TEXT,
        email TEXT,
        country_code TEXT,
        country_name TEXT,
        poster_id TEXT,
        media_url TEXT,
        thumb_url TEXT,
        media_filename TEXT,
        media_size INTEGER,
        media_dimensions TEXT,
        media_hash TEXT,
        media_id TEXT,
        spoiler_image INTEGER NOT NULL DEFAULT 0,
        UNIQUE (thread_id, board_post_no),
        FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS media_objects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        hash_sha256 TEXT NOT NULL UNIQUE,
        mime_type TEXT,
        file_size INTEGER,
        width INTEGER,
        height INTEGER,
        storage_key TEXT,
        thumb_key TEXT,
        original_filename TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_threads_board ON threads(board_id);
    CREATE INDEX IF NOT EXISTS idx_posts_thread ON posts(thread_id);
    CREATE INDEX IF NOT EXISTS idx_posts_board_post_no ON posts(board_post_no);
"#;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn ensure_migrations(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })
    }

    pub fn with_repositories<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let repos = repositories::SqliteRepositories::new(conn);
            f(repos)
        })
    }

    /// Runs `f` inside a transaction: committed when it returns Ok,
    /// rolled back when it returns Err. One thread-harvest's writes go
    /// through a single call so no partial thread is ever left visible.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let result = f(repositories::SqliteRepositories::new(conn));
            match result {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    // dropping the transaction rolls it back
                    drop(tx);
                    Err(err)
                }
            }
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))?;
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::models::ThreadRecord;
    use super::repositories::{BoardRepository, ThreadRepository};
    use super::*;
    use crate::utils::now_utc_iso;

    fn setup_db() -> Database {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn);
        db.ensure_migrations().expect("migrations");
        db
    }

    fn sample_thread(id: i64, board_id: i64) -> ThreadRecord {
        ThreadRecord {
            id,
            board_id,
            created_at: now_utc_iso(),
            updated_at: Some(now_utc_iso()),
            bumped_at: None,
            sticky: false,
            locked: false,
            archived: false,
            archived_at: None,
            reply_count: 0,
            image_count: 0,
            op_post_id: None,
        }
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = setup_db();
        let board_id = db
            .with_repositories(|repos| repos.boards().ensure("g", "Technology", false))
            .expect("board");

        let result: Result<()> = db.with_transaction(|repos| {
            repos.threads().upsert(&sample_thread(100, board_id))?;
            anyhow::bail!("simulated failure")
        });
        assert!(result.is_err());

        let exists = db
            .with_repositories(|repos| repos.threads().exists(100))
            .expect("probe");
        assert!(!exists, "rolled-back thread must not be visible");
    }

    #[test]
    fn transaction_commits_on_success() {
        let db = setup_db();
        let board_id = db
            .with_repositories(|repos| repos.boards().ensure("g", "Technology", false))
            .expect("board");

        db.with_transaction(|repos| {
            repos.threads().upsert(&sample_thread(100, board_id))?;
            Ok(())
        })
        .expect("commit");

        let exists = db
            .with_repositories(|repos| repos.threads().exists(100))
            .expect("probe");
        assert!(exists);
    }
}
