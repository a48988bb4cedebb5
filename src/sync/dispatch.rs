//! Single-flight run guard.
//!
//! At most one import runs per account at any time. A trigger arriving while
//! a run is in flight is reported as such instead of being queued; the caller
//! can simply retry later.

use crate::ledger::{Account, ImportSummary};
use crate::sync::orchestrator::ImportOrchestrator;
use crate::sync::ImportError;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Terminal status of one import trigger.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(ImportSummary),
    /// Another run for the same account is still in flight.
    AlreadyRunning,
    /// The source rejected the account's API credentials.
    CredentialsRejected(String),
    InternalError(String),
}

impl RunOutcome {
    /// Stable status code for callers that report outcomes externally.
    pub fn status_code(&self) -> &'static str {
        match self {
            RunOutcome::Completed(_) => "completed",
            RunOutcome::AlreadyRunning => "already_running",
            RunOutcome::CredentialsRejected(_) => "credentials_rejected",
            RunOutcome::InternalError(_) => "internal_error",
        }
    }
}

/// Dispatches import runs while holding the per-account in-flight set.
pub struct RunDispatcher {
    running: Mutex<HashSet<i64>>,
}

impl RunDispatcher {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Trigger an import for the account, unless one is already in flight.
    ///
    /// Every failure mode maps to a `RunOutcome`; this method never returns
    /// an error, so callers report a status unconditionally.
    pub async fn run(&self, orchestrator: &ImportOrchestrator, account: &Account) -> RunOutcome {
        if !self.running.lock().await.insert(account.id) {
            info!("Import for account {} already in flight", account.name);
            return RunOutcome::AlreadyRunning;
        }

        let result = orchestrator.run_import(account).await;
        self.running.lock().await.remove(&account.id);

        match result {
            Ok(summary) => {
                info!(
                    "Import for account {} completed: {} entries",
                    account.name, summary.count_imported
                );
                RunOutcome::Completed(summary)
            }
            Err(ImportError::CredentialsInvalid(msg)) => {
                error!("Import for account {} rejected: {}", account.name, msg);
                RunOutcome::CredentialsRejected(msg)
            }
            Err(err) => {
                error!("Import for account {} failed: {}", account.name, err);
                RunOutcome::InternalError(err.to_string())
            }
        }
    }
}

impl Default for RunDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
