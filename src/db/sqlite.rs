// src/db/sqlite.rs
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};

use super::{assemble_view, PollRow, PollStore};
use crate::error::Result;
use crate::models::{Ballot, NewPoll, OptionTally, PollId, PollView, VoteOutcome, VoteReceipt};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS polls (
        id INTEGER PRIMARY KEY,
        question TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS options (
        id INTEGER PRIMARY KEY,
        poll_id INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        option_text TEXT NOT NULL,
        vote_count INTEGER NOT NULL DEFAULT 0 CHECK (vote_count >= 0),
        UNIQUE (id, poll_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        id INTEGER PRIMARY KEY,
        poll_id INTEGER NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        option_id INTEGER NOT NULL,
        cast_at TEXT NOT NULL,
        CONSTRAINT _user_poll_uc UNIQUE (poll_id, user_id),
        FOREIGN KEY (option_id, poll_id) REFERENCES options(id, poll_id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_options_poll ON options (poll_id, position)",
    "CREATE INDEX IF NOT EXISTS idx_votes_option ON votes (option_id)",
];

/// SQLite-backed store, for single-node deployments and tests.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        // Each connection to an in-memory database sees its own empty
        // database, so the pool must hold exactly one and never recycle it.
        let pool = if in_memory {
            if max_connections > 1 {
                warn!(max_connections, "in-memory SQLite uses a single connection");
            }
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(opts)
                .await?
        };

        Ok(Self { pool })
    }

    /// A fresh private database with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        let store = Self::connect("sqlite::memory:", 1).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl PollStore for SqliteStore {
    async fn migrate(&self) -> Result<()> {
        for &statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_poll(&self, poll: &NewPoll) -> Result<PollId> {
        // Write-first, like `record_vote`.
        let mut tx = self.pool.begin().await?;

        let (poll_id,): (PollId,) =
            sqlx::query_as("INSERT INTO polls (question, created_at) VALUES (?, ?) RETURNING id")
                .bind(&poll.question)
                .bind(Utc::now())
                .fetch_one(&mut *tx)
                .await?;

        for (position, text) in poll.options.iter().enumerate() {
            sqlx::query("INSERT INTO options (poll_id, position, option_text) VALUES (?, ?, ?)")
                .bind(poll_id)
                .bind(position as i64)
                .bind(text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(poll_id)
    }

    async fn load_poll(&self, id: PollId) -> Result<Option<PollView>> {
        let rows: Vec<PollRow> = sqlx::query_as(
            r#"
            SELECT p.question, o.id, o.option_text, o.vote_count
            FROM polls p
            LEFT JOIN options o ON o.poll_id = p.id
            WHERE p.id = ?
            ORDER BY o.position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assemble_view(rows))
    }

    async fn record_vote(&self, ballot: &Ballot) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await?;

        // The first statement must write. A deferred transaction that reads
        // first holds a WAL snapshot, and upgrading it to a writer after
        // another commit fails with SQLITE_BUSY_SNAPSHOT without consulting
        // the busy handler. Starting with the increment takes the write lock
        // up front, and the increment is undone by rollback on every early
        // return below.
        let bumped = sqlx::query(
            "UPDATE options SET vote_count = vote_count + 1 WHERE id = ? AND poll_id = ?",
        )
        .bind(ballot.option_id)
        .bind(ballot.poll_id)
        .execute(&mut *tx)
        .await?;
        if bumped.rows_affected() == 0 {
            return Ok(VoteOutcome::OptionNotFound);
        }

        let cast_at = Utc::now();
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO votes (poll_id, user_id, option_id, cast_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (poll_id, user_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(ballot.poll_id)
        .bind(&ballot.user_id)
        .bind(ballot.option_id)
        .bind(cast_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((vote_id,)) = inserted else {
            debug!(poll_id = ballot.poll_id, "duplicate ballot, rolling back");
            return Ok(VoteOutcome::Duplicate);
        };

        tx.commit().await?;

        Ok(VoteOutcome::Recorded(VoteReceipt {
            vote_id,
            poll_id: ballot.poll_id,
            option_id: ballot.option_id,
            cast_at,
        }))
    }

    async fn tally(&self, poll_id: PollId) -> Result<Vec<OptionTally>> {
        let rows = sqlx::query_as::<_, OptionTally>(
            r#"
            SELECT o.id, o.vote_count AS recorded, COUNT(v.id) AS counted
            FROM options o
            LEFT JOIN votes v ON v.option_id = o.id
            WHERE o.poll_id = ?
            GROUP BY o.id, o.vote_count, o.position
            ORDER BY o.position
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
