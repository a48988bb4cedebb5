//!
//! Ledger entry persistence and the batch writer.
//!
//! The repository abstracts where entries live; the file-backed
//! implementation rewrites one JSON document per account, so a batch commit
//! lands entirely or not at all. The writer deduplicates within a run on the
//! `(source, external id)` pair for sources that have native identifiers;
//! sources without them rely entirely on the watermark time filter.

use crate::ledger::{Account, LedgerEntry};
use crate::sync::{ImportError, WatermarkRepository};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Repository for ledger entry persistence
#[async_trait::async_trait]
pub trait LedgerRepository: Send + Sync {
	/// All persisted entries for an account, most recent first.
	async fn list(&self, account_id: i64) -> Result<Vec<LedgerEntry>, ImportError>;

	/// Append a batch atomically, assigning identities. Returns the number
	/// of entries written.
	async fn append_batch(
		&self,
		account_id: i64,
		entries: Vec<LedgerEntry>,
	) -> Result<usize, ImportError>;
}

/// File-based implementation of LedgerRepository
pub struct FileLedgerRepository {
	data_dir: PathBuf,
}

impl FileLedgerRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn ledger_filename(&self, account_id: i64) -> PathBuf {
		self.data_dir.join(format!("ledger_{}.json", account_id))
	}

	async fn load(&self, account_id: i64) -> Result<Vec<LedgerEntry>, ImportError> {
		let filename = self.ledger_filename(account_id);
		if !filename.exists() {
			return Ok(Vec::new());
		}

		let content = tokio::fs::read_to_string(&filename)
			.await
			.map_err(|e| ImportError::Storage(format!("Failed to read ledger file: {}", e)))?;
		serde_json::from_str(&content)
			.map_err(|e| ImportError::Storage(format!("Failed to parse ledger file: {}", e)))
	}
}

#[async_trait::async_trait]
impl LedgerRepository for FileLedgerRepository {
	async fn list(&self, account_id: i64) -> Result<Vec<LedgerEntry>, ImportError> {
		let mut entries = self.load(account_id).await?;
		// Display ordering: most recent first.
		entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
		Ok(entries)
	}

	async fn append_batch(
		&self,
		account_id: i64,
		entries: Vec<LedgerEntry>,
	) -> Result<usize, ImportError> {
		let mut stored = self.load(account_id).await?;

		let mut next_id = stored
			.iter()
			.filter_map(|entry| entry.id)
			.max()
			.map(|id| id + 1)
			.unwrap_or(1);

		let count = entries.len();
		for mut entry in entries {
			entry.id = Some(next_id);
			next_id += 1;
			stored.push(entry);
		}

		// One write per batch: the whole document lands or nothing does.
		let filename = self.ledger_filename(account_id);
		let content = serde_json::to_string_pretty(&stored)?;
		tokio::fs::write(&filename, content)
			.await
			.map_err(|e| ImportError::Storage(format!("Failed to write ledger file: {}", e)))?;

		debug!("Appended {} entries to {:?}", count, filename);
		Ok(count)
	}
}

/// Commits normalized entries and advances the watermark.
pub struct LedgerWriter {
	repository: Arc<dyn LedgerRepository>,
	watermarks: Arc<dyn WatermarkRepository>,
}

impl LedgerWriter {
	pub fn new(
		repository: Arc<dyn LedgerRepository>,
		watermarks: Arc<dyn WatermarkRepository>,
	) -> Self {
		Self {
			repository,
			watermarks,
		}
	}

	/// Commit one run's entries for an account.
	///
	/// Entries sharing a `(source, external id)` pair with another entry in
	/// the batch or with an already-stored entry are dropped defensively.
	/// After a successful commit the account's watermark is advanced to the
	/// run's start time, even when nothing was imported.
	pub async fn commit(
		&self,
		entries: Vec<LedgerEntry>,
		account: &Account,
		run_started_at: DateTime<Utc>,
	) -> Result<usize, ImportError> {
		let mut seen: HashSet<(String, String)> = self
			.repository
			.list(account.id)
			.await?
			.into_iter()
			.filter_map(|entry| {
				entry
					.external_id
					.map(|external_id| (entry.source, external_id))
			})
			.collect();

		let mut deduped = Vec::with_capacity(entries.len());
		for entry in entries {
			if let Some(external_id) = &entry.external_id {
				let key = (entry.source.clone(), external_id.clone());
				if !seen.insert(key) {
					debug!(
						"Skipping duplicate entry {}:{:?}",
						entry.source, entry.external_id
					);
					continue;
				}
			}
			deduped.push(entry);
		}

		let count = self.repository.append_batch(account.id, deduped).await?;
		self.watermarks
			.record(account.id, run_started_at, count)
			.await?;

		info!("Committed {} entries for account {}", count, account.name);
		Ok(count)
	}
}
