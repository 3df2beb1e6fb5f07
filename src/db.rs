// src/db.rs
//! Persistence for polls, options and the vote ledger.
//!
//! Every implementation must keep the `(poll_id, user_id)` uniqueness
//! constraint on `votes` and the composite `(option_id, poll_id)` foreign key
//! in the schema itself. The ledger relies on the store to turn a racing
//! duplicate insert into "nothing inserted", not on a prior read.

mod postgres;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Ballot, NewPoll, OptionTally, PollId, PollOption, PollView, VoteOutcome};

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait PollStore: Send + Sync {
    /// Create the tables if they are missing. Safe to run on every start.
    async fn migrate(&self) -> Result<()>;

    /// Insert a poll and all of its options in one transaction.
    async fn insert_poll(&self, poll: &NewPoll) -> Result<PollId>;

    /// Read a poll and its options from a single statement.
    async fn load_poll(&self, id: PollId) -> Result<Option<PollView>>;

    /// Record a ballot.
    ///
    /// Inside one transaction: confirm the option belongs to the poll, insert
    /// the vote unless `(poll_id, user_id)` already exists, and increment the
    /// option counter only when the insert produced a row.
    async fn record_vote(&self, ballot: &Ballot) -> Result<VoteOutcome>;

    /// Stored counter next to the number of vote rows, per option.
    async fn tally(&self, poll_id: PollId) -> Result<Vec<OptionTally>>;

    async fn health_check(&self) -> Result<()>;
}

pub type SharedStore = Arc<dyn PollStore>;

/// Open the store named by `DATABASE_URL` and bring its schema up to date.
pub async fn connect(config: &Config) -> Result<SharedStore> {
    let url = config.database_url.as_str();

    let store: SharedStore = if url.starts_with("postgres://") || url.starts_with("postgresql://")
    {
        info!("Connecting to Postgres");
        Arc::new(PgStore::connect(url, config.max_connections).await?)
    } else if url.starts_with("sqlite:") {
        info!("Opening SQLite database");
        Arc::new(SqliteStore::connect(url, config.max_connections).await?)
    } else {
        return Err(AppError::Config(
            "DATABASE_URL must start with postgres://, postgresql:// or sqlite:".to_string(),
        ));
    };

    store.migrate().await?;
    Ok(store)
}

/// Rows of `polls LEFT JOIN options`, already ordered by option position.
type PollRow = (String, Option<i64>, Option<String>, Option<i64>);

fn assemble_view(rows: Vec<PollRow>) -> Option<PollView> {
    let question = rows.first()?.0.clone();

    let options = rows
        .into_iter()
        .filter_map(|(_, id, text, votes)| {
            Some(PollOption {
                id: id?,
                option_text: text?,
                vote_count: votes?,
            })
        })
        .collect();

    Some(PollView { question, options })
}

/// Errors worth retrying a vote transaction for: lock contention and
/// serialization failures, never constraint or decode errors.
pub fn is_transient(err: &AppError) -> bool {
    match err {
        AppError::Storage(sqlx::Error::PoolTimedOut) => true,
        AppError::Storage(sqlx::Error::Database(db)) => matches!(
            db.code().as_deref(),
            // postgres: serialization_failure, deadlock_detected
            Some("40001") | Some("40P01")
            // sqlite: SQLITE_BUSY, SQLITE_LOCKED and their extended codes
            | Some("5") | Some("6") | Some("261") | Some("517") | Some("262")
        ),
        _ => false,
    }
}
