// src/ledger.rs
//! The vote ledger.
//!
//! A vote is accepted at most once per `(poll_id, user_id)`. The guarantee
//! comes from the store: [`PollStore::record_vote`] runs the option check, the
//! insert-or-nothing against the `_user_poll_uc` constraint and the counter
//! increment in one transaction, and the increment is only committed when the
//! insert produced a row. When two requests race for the same voter, the
//! second insert finds the constraint taken and reports [`VoteOutcome::Duplicate`].
//!
//! This module adds input checks and a bounded retry for transactions that
//! fail on lock contention. Nothing here reads the ledger before writing it.
//!
//! [`PollStore::record_vote`]: crate::db::PollStore::record_vote

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::db::{is_transient, SharedStore};
use crate::error::{AppError, Result};
use crate::models::{Ballot, OptionId, PollId, VoteOutcome, VoteReceipt};

const RETRY_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Clone)]
pub struct VoteLedger {
    store: SharedStore,
    retry_limit: u32,
}

impl VoteLedger {
    /// `retry_limit` is the total number of attempts per vote; `Config::load`
    /// guarantees it is at least 1.
    pub fn new(store: SharedStore, retry_limit: u32) -> Self {
        Self {
            store,
            retry_limit,
        }
    }

    pub async fn cast_vote(
        &self,
        poll_id: PollId,
        user_id: &str,
        option_id: OptionId,
    ) -> Result<VoteReceipt> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id must not be empty".to_string()));
        }

        let ballot = Ballot {
            poll_id,
            user_id: user_id.to_string(),
            option_id,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.store.record_vote(&ballot).await {
                Ok(VoteOutcome::Recorded(receipt)) => {
                    info!(
                        poll_id,
                        option_id,
                        vote_id = receipt.vote_id,
                        "Vote recorded"
                    );
                    return Ok(receipt);
                }
                Ok(VoteOutcome::OptionNotFound) => {
                    warn!(poll_id, option_id, "Vote rejected: option not in poll");
                    return Err(AppError::OptionNotFound);
                }
                Ok(VoteOutcome::Duplicate) => {
                    debug!(poll_id, "Vote rejected: already voted");
                    return Err(AppError::DuplicateVote);
                }
                Err(e) if is_transient(&e) => {
                    if attempt >= self.retry_limit {
                        warn!(poll_id, attempts = attempt, error = %e, "Vote transaction gave up");
                        return Err(AppError::Conflict { attempts: attempt });
                    }
                    warn!(poll_id, attempt, error = %e, "Vote transaction contended, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::db::{PollStore, SqliteStore};
    use crate::models::{NewPoll, OptionTally, PollView};

    /// Fails `record_vote` with `error` for the first `failures` calls.
    struct FlakyStore {
        inner: SqliteStore,
        failures: AtomicU32,
        calls: AtomicU32,
        error: fn() -> sqlx::Error,
    }

    #[async_trait]
    impl PollStore for FlakyStore {
        async fn migrate(&self) -> Result<()> {
            self.inner.migrate().await
        }

        async fn insert_poll(&self, poll: &NewPoll) -> Result<PollId> {
            self.inner.insert_poll(poll).await
        }

        async fn load_poll(&self, id: PollId) -> Result<Option<PollView>> {
            self.inner.load_poll(id).await
        }

        async fn record_vote(&self, ballot: &Ballot) -> Result<VoteOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(AppError::Storage((self.error)()));
            }
            self.inner.record_vote(ballot).await
        }

        async fn tally(&self, poll_id: PollId) -> Result<Vec<OptionTally>> {
            self.inner.tally(poll_id).await
        }

        async fn health_check(&self) -> Result<()> {
            self.inner.health_check().await
        }
    }

    async fn flaky(failures: u32, error: fn() -> sqlx::Error) -> (Arc<FlakyStore>, PollId) {
        let inner = SqliteStore::in_memory().await.unwrap();
        let poll_id = inner
            .insert_poll(&NewPoll {
                question: "Tabs or spaces?".to_string(),
                options: vec!["Tabs".to_string(), "Spaces".to_string()],
            })
            .await
            .unwrap();

        let store = Arc::new(FlakyStore {
            inner,
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            error,
        });
        (store, poll_id)
    }

    #[tokio::test]
    async fn test_rejects_empty_voter() {
        let (store, poll_id) = flaky(0, || sqlx::Error::PoolTimedOut).await;
        let ledger = VoteLedger::new(store.clone(), 3);

        let err = ledger.cast_vote(poll_id, "  ", 1).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retries_transient_failures_within_budget() {
        let (store, poll_id) = flaky(2, || sqlx::Error::PoolTimedOut).await;
        let ledger = VoteLedger::new(store.clone(), 3);

        let receipt = ledger.cast_vote(poll_id, "alice", 2).await.unwrap();
        assert_eq!(receipt.option_id, 2);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);

        let tally = store.tally(poll_id).await.unwrap();
        assert_eq!(tally[1].recorded, 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_surfaces_conflict() {
        let (store, poll_id) = flaky(5, || sqlx::Error::PoolTimedOut).await;
        let ledger = VoteLedger::new(store.clone(), 3);

        let err = ledger.cast_vote(poll_id, "alice", 2).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { attempts: 3 }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);

        let tally = store.tally(poll_id).await.unwrap();
        assert!(tally.iter().all(|t| t.recorded == 0 && t.counted == 0));
    }

    #[tokio::test]
    async fn test_single_attempt_budget_is_not_padded() {
        let (store, poll_id) = flaky(1, || sqlx::Error::PoolTimedOut).await;
        let ledger = VoteLedger::new(store.clone(), 1);

        let err = ledger.cast_vote(poll_id, "alice", 2).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { attempts: 1 }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hard_storage_error_is_not_retried() {
        let (store, poll_id) = flaky(1, || sqlx::Error::RowNotFound).await;
        let ledger = VoteLedger::new(store.clone(), 3);

        let err = ledger.cast_vote(poll_id, "alice", 2).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_option_is_checked_before_duplicate() {
        let (store, poll_id) = flaky(0, || sqlx::Error::PoolTimedOut).await;
        let ledger = VoteLedger::new(store.clone(), 3);

        ledger.cast_vote(poll_id, "alice", 2).await.unwrap();

        // Same voter, bogus option: the option check wins.
        let err = ledger.cast_vote(poll_id, "alice", 99).await.unwrap_err();
        assert!(matches!(err, AppError::OptionNotFound));

        let err = ledger.cast_vote(poll_id, "alice", 1).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateVote));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_duplicate_is_logged_quietly_without_voter() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("vibe_poll=debug"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (store, poll_id) = flaky(0, || sqlx::Error::PoolTimedOut).await;
        let ledger = VoteLedger::new(store.clone(), 3);
        ledger.cast_vote(poll_id, "alice", 2).await.unwrap();
        let err = ledger.cast_vote(poll_id, "alice", 1).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateVote));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("already voted"))
            .unwrap_or_else(|| panic!("no rejection logged in {output:?}"));
        assert!(line.contains("DEBUG"), "{line}");
        assert!(!output.contains("alice"), "{output}");
    }
}
