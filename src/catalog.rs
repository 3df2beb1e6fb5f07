// src/catalog.rs
use tracing::info;

use crate::config::PollLimits;
use crate::db::SharedStore;
use crate::error::{AppError, Result};
use crate::models::{NewPoll, PollId, PollView, TallyAudit};

/// Creation and retrieval of polls.
#[derive(Clone)]
pub struct PollCatalog {
    store: SharedStore,
    limits: PollLimits,
}

impl PollCatalog {
    pub fn new(store: SharedStore, limits: PollLimits) -> Self {
        Self { store, limits }
    }

    pub async fn create_poll(&self, question: &str, options: &[String]) -> Result<PollId> {
        let poll = validate_new_poll(question, options, self.limits)?;
        let poll_id = self.store.insert_poll(&poll).await?;

        info!(poll_id, options = poll.options.len(), "Poll created");
        Ok(poll_id)
    }

    pub async fn get_poll(&self, id: PollId) -> Result<PollView> {
        self.store.load_poll(id).await?.ok_or(AppError::PollNotFound)
    }

    /// Compare every option's counter against the vote rows behind it.
    pub async fn audit_tallies(&self, id: PollId) -> Result<TallyAudit> {
        let options = self.store.tally(id).await?;
        // Polls are never stored without options, so no rows means no poll.
        if options.is_empty() {
            return Err(AppError::PollNotFound);
        }
        Ok(TallyAudit::new(id, options))
    }
}

/// Trim and check a poll request. Option order is preserved.
pub fn validate_new_poll(
    question: &str,
    options: &[String],
    limits: PollLimits,
) -> Result<NewPoll> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question must not be empty".to_string()));
    }

    if options.len() < limits.min_options {
        let noun = if limits.min_options == 1 { "option" } else { "options" };
        return Err(AppError::Validation(format!(
            "A poll needs at least {} {noun}",
            limits.min_options
        )));
    }
    if let Some(max) = limits.max_options {
        if options.len() > max {
            return Err(AppError::Validation(format!(
                "A poll allows at most {max} options"
            )));
        }
    }

    let options = options
        .iter()
        .map(|text| text.trim())
        .enumerate()
        .map(|(i, text)| {
            if text.is_empty() {
                Err(AppError::Validation(format!("Option {} must not be empty", i + 1)))
            } else {
                Ok(text.to_string())
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NewPoll {
        question: question.to_string(),
        options,
    })
}
