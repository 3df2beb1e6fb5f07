// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PollId = i64;
pub type OptionId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOption {
    pub id: OptionId,
    #[serde(rename = "text")]
    pub option_text: String,
    #[serde(rename = "votes")]
    pub vote_count: i64,
}

/// A poll as read back from the store, options in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollView {
    pub question: String,
    pub options: Vec<PollOption>,
}

/// A validated poll waiting to be inserted.
#[derive(Debug, Clone)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
}

/// A single voter's choice, not yet recorded.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub poll_id: PollId,
    pub user_id: String,
    pub option_id: OptionId,
}

/// Acknowledgement for a committed vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteReceipt {
    pub vote_id: i64,
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub cast_at: DateTime<Utc>,
}

/// What the store did with a ballot inside its transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded(VoteReceipt),
    OptionNotFound,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OptionTally {
    pub id: OptionId,
    /// The running counter on the option row.
    pub recorded: i64,
    /// Committed vote rows pointing at the option.
    pub counted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyAudit {
    pub poll_id: PollId,
    pub consistent: bool,
    pub options: Vec<OptionTally>,
}

impl TallyAudit {
    pub fn new(poll_id: PollId, options: Vec<OptionTally>) -> Self {
        let consistent = options.iter().all(|o| o.recorded == o.counted);
        Self {
            poll_id,
            consistent,
            options,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePollResponse {
    pub message: &'static str,
    pub poll_id: PollId,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub user_id: String,
    pub option_id: OptionId,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
