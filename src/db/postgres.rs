// src/db/postgres.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::debug;

use super::{assemble_view, PollRow, PollStore};
use crate::error::Result;
use crate::models::{Ballot, NewPoll, OptionTally, PollId, PollView, VoteOutcome, VoteReceipt};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS polls (
        id BIGSERIAL PRIMARY KEY,
        question TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS options (
        id BIGSERIAL PRIMARY KEY,
        poll_id BIGINT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        option_text TEXT NOT NULL,
        vote_count BIGINT NOT NULL DEFAULT 0 CHECK (vote_count >= 0),
        UNIQUE (id, poll_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        id BIGSERIAL PRIMARY KEY,
        poll_id BIGINT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        option_id BIGINT NOT NULL,
        cast_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT _user_poll_uc UNIQUE (poll_id, user_id),
        FOREIGN KEY (option_id, poll_id) REFERENCES options(id, poll_id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_options_poll ON options (poll_id, position)",
    "CREATE INDEX IF NOT EXISTS idx_votes_option ON votes (option_id)",
];

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn migrate(&self) -> Result<()> {
        for &statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_poll(&self, poll: &NewPoll) -> Result<PollId> {
        let mut tx = self.pool.begin().await?;

        let (poll_id,): (PollId,) =
            sqlx::query_as("INSERT INTO polls (question, created_at) VALUES ($1, $2) RETURNING id")
                .bind(&poll.question)
                .bind(Utc::now())
                .fetch_one(&mut *tx)
                .await?;

        for (position, text) in poll.options.iter().enumerate() {
            sqlx::query("INSERT INTO options (poll_id, position, option_text) VALUES ($1, $2, $3)")
                .bind(poll_id)
                .bind(position as i32)
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
            WHERE p.id = $1
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

        let option: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM options WHERE id = $1 AND poll_id = $2")
                .bind(ballot.option_id)
                .bind(ballot.poll_id)
                .fetch_optional(&mut *tx)
                .await?;
        if option.is_none() {
            return Ok(VoteOutcome::OptionNotFound);
        }

        // A concurrent insert for the same voter waits on the unique index
        // and then takes the DO NOTHING branch.
        let inserted: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            INSERT INTO votes (poll_id, user_id, option_id, cast_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT _user_poll_uc DO NOTHING
            RETURNING id, cast_at
            "#,
        )
        .bind(ballot.poll_id)
        .bind(&ballot.user_id)
        .bind(ballot.option_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((vote_id, cast_at)) = inserted else {
            debug!(poll_id = ballot.poll_id, "duplicate ballot, rolling back");
            return Ok(VoteOutcome::Duplicate);
        };

        sqlx::query("UPDATE options SET vote_count = vote_count + 1 WHERE id = $1")
            .bind(ballot.option_id)
            .execute(&mut *tx)
            .await?;

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
            WHERE o.poll_id = $1
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
