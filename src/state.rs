// src/state.rs
use std::sync::Arc;

use crate::catalog::PollCatalog;
use crate::config::Config;
use crate::db::SharedStore;
use crate::ledger::VoteLedger;

pub struct AppState {
    pub catalog: PollCatalog,
    pub ledger: VoteLedger,
    pub store: SharedStore,
}

impl AppState {
    pub fn new(store: SharedStore, config: &Config) -> Arc<Self> {
        Arc::new(Self {
            catalog: PollCatalog::new(store.clone(), config.limits),
            ledger: VoteLedger::new(store.clone(), config.vote_retry_limit),
            store,
        })
    }
}
