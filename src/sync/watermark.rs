//!
//! Per-account sync watermark.
//!
//! The watermark records how far an account's history has already been
//! imported. Every run filters out raw records whose native timestamp is at
//! or before the watermark, and every successful run advances it, including
//! zero-import runs, so a long history of already-seen records is never
//! rescanned.
//!
//! The boundary is exclusive at the watermark instant itself: a record
//! timestamped exactly at the stored watermark is excluded forever. This
//! mirrors the historical behavior of the importer and is a known tradeoff;
//! a record sharing the exact instant with a previous run's boundary record
//! is permanently dropped.

use crate::sync::ImportError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// One watermark row per account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncWatermark {
	pub account_id: i64,
	/// Timestamp the account was last checked through.
	pub last_run_at: DateTime<Utc>,
	/// Records imported by that run.
	pub imported_count: usize,
}

/// Epoch-zero sentinel returned before the first successful run.
pub fn epoch() -> DateTime<Utc> {
	Utc.timestamp_opt(0, 0).unwrap()
}

/// Repository for watermark persistence
#[async_trait::async_trait]
pub trait WatermarkRepository: Send + Sync {
	/// Timestamp of the most recent successful run, or the epoch sentinel.
	async fn latest(&self, account_id: i64) -> Result<DateTime<Utc>, ImportError>;

	/// Record a completed run. The stored timestamp is monotonically
	/// non-decreasing across calls.
	async fn record(
		&self,
		account_id: i64,
		run_timestamp: DateTime<Utc>,
		imported_count: usize,
	) -> Result<(), ImportError>;
}

/// File-based implementation of WatermarkRepository
pub struct FileWatermarkRepository {
	data_dir: PathBuf,
}

impl FileWatermarkRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn watermark_filename(&self, account_id: i64) -> PathBuf {
		self.data_dir.join(format!("watermark_{}.json", account_id))
	}
}

#[async_trait::async_trait]
impl WatermarkRepository for FileWatermarkRepository {
	async fn latest(&self, account_id: i64) -> Result<DateTime<Utc>, ImportError> {
		let filename = self.watermark_filename(account_id);
		if !filename.exists() {
			return Ok(epoch());
		}

		let content = tokio::fs::read_to_string(&filename).await.map_err(|e| {
			ImportError::Storage(format!("Failed to read watermark file: {}", e))
		})?;
		let watermark: SyncWatermark = serde_json::from_str(&content).map_err(|e| {
			ImportError::Storage(format!("Failed to parse watermark file: {}", e))
		})?;

		Ok(watermark.last_run_at)
	}

	async fn record(
		&self,
		account_id: i64,
		run_timestamp: DateTime<Utc>,
		imported_count: usize,
	) -> Result<(), ImportError> {
		// Never move the watermark backwards.
		let last_run_at = self.latest(account_id).await?.max(run_timestamp);

		let watermark = SyncWatermark {
			account_id,
			last_run_at,
			imported_count,
		};

		let filename = self.watermark_filename(account_id);
		let content = serde_json::to_string_pretty(&watermark)?;
		tokio::fs::write(&filename, content).await.map_err(|e| {
			ImportError::Storage(format!("Failed to write watermark file: {}", e))
		})?;

		info!(
			"Recorded watermark for account {} at {} ({} imported)",
			account_id, last_run_at, imported_count
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[tokio::test]
	async fn latest_returns_epoch_sentinel_before_first_run() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileWatermarkRepository::new(dir.path().to_path_buf());

		assert_eq!(repo.latest(42).await.unwrap(), epoch());
	}

	#[tokio::test]
	async fn record_then_latest_roundtrips() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileWatermarkRepository::new(dir.path().to_path_buf());
		let at = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();

		repo.record(42, at, 3).await.unwrap();
		assert_eq!(repo.latest(42).await.unwrap(), at);
	}

	#[tokio::test]
	async fn watermark_is_monotonically_non_decreasing() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileWatermarkRepository::new(dir.path().to_path_buf());
		let at = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();

		repo.record(42, at, 3).await.unwrap();
		// A run with an earlier start time must not move the watermark back.
		repo.record(42, at - Duration::hours(1), 0).await.unwrap();
		assert_eq!(repo.latest(42).await.unwrap(), at);

		// Zero-import runs still advance the checked-through time.
		let later = at + Duration::hours(2);
		repo.record(42, later, 0).await.unwrap();
		assert_eq!(repo.latest(42).await.unwrap(), later);
	}

	#[tokio::test]
	async fn accounts_have_independent_watermarks() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileWatermarkRepository::new(dir.path().to_path_buf());
		let at = Utc.with_ymd_and_hms(2018, 1, 16, 6, 0, 0).unwrap();

		repo.record(1, at, 5).await.unwrap();
		assert_eq!(repo.latest(2).await.unwrap(), epoch());
	}
}
