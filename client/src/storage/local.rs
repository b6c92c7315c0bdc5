//! Local storage: every guess in one JSON array under `arvore_palpites`,
//! kept as a file in the configured data directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use shared::{is_winning_position, GuessId, GuessInput, GuessRecord, GuessStats};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::storage::connection::ReadyState;
use crate::storage::traits::{CreatedGuess, DriverId, GuessStorage};

pub const STORAGE_KEY: &str = "arvore_palpites";

pub struct LocalDriver {
    path: PathBuf,
    ready: ReadyState<()>,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl LocalDriver {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{STORAGE_KEY}.json")),
            ready: ReadyState::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_ready(&self) -> StorageResult<()> {
        self.ready
            .get_or_try_init(|| async {
                if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(dir).await.map_err(|e| {
                        StorageError::Write(format!("cannot create {}: {e}", dir.display()))
                    })?;
                }
                debug!("Local storage at {}", self.path.display());
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Read the stored array. A missing file is an empty store. Entries that
    /// do not decode are skipped, and a payload that is not a JSON array reads
    /// as empty. Either way the raw file is first copied to `backup_path`, so
    /// the next save cannot destroy what was skipped.
    async fn load(&self) -> StorageResult<Vec<GuessRecord>> {
        self.ensure_ready().await?;
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Read(format!("cannot read {}: {e}", self.path.display()))),
        };

        match parse_records(&bytes) {
            Ok((records, 0)) => Ok(records),
            Ok((records, skipped)) => {
                warn!(skipped, "Skipping unreadable local guesses in {}", self.path.display());
                self.keep_backup(&bytes).await?;
                Ok(records)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring corrupt local guesses in {}", self.path.display());
                self.keep_backup(&bytes).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Where the raw payload goes when some of it could not be read
    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.corrupt")
    }

    async fn keep_backup(&self, bytes: &[u8]) -> StorageResult<()> {
        let backup = self.backup_path();
        tokio::fs::write(&backup, bytes)
            .await
            .map_err(|e| StorageError::Write(format!("cannot write {}: {e}", backup.display())))
    }

    /// Replace the stored array through a temp file and rename
    async fn save(&self, records: &[GuessRecord]) -> StorageResult<()> {
        let payload = serde_json::to_vec(records)
            .map_err(|e| StorageError::Serialization(format!("cannot encode guesses: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| StorageError::Write(format!("cannot write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::Write(format!("cannot replace {}: {e}", self.path.display())))
    }
}

/// Decode the stored array entry by entry, returning the readable records
/// and how many entries were skipped
fn parse_records(bytes: &[u8]) -> StorageResult<(Vec<GuessRecord>, usize)> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok((Vec::new(), 0));
    }
    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let total = entries.len();
    let records: Vec<GuessRecord> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(index, error = %e, "Unreadable local guess");
                None
            }
        })
        .collect();

    let skipped = total - records.len();
    Ok((records, skipped))
}

/// Millisecond timestamp ids, bumped past the highest stored id so two
/// guesses saved within the same millisecond stay distinct
fn next_id(records: &[GuessRecord]) -> GuessId {
    let now = Utc::now().timestamp_millis();
    match records.iter().map(|r| r.id).max() {
        Some(max) if max >= now => max + 1,
        _ => now,
    }
}

fn newest_first(records: &mut [GuessRecord]) {
    records.sort_by(|a, b| b.registered_at.cmp(&a.registered_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl GuessStorage for LocalDriver {
    fn id(&self) -> DriverId {
        DriverId::Local
    }

    async fn initialize(&self) -> StorageResult<()> {
        self.ensure_ready().await
    }

    fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    async fn create(&self, input: &GuessInput) -> StorageResult<CreatedGuess> {
        input.validate()?;
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await?;
        let is_winner = is_winning_position(records.len() as u64);
        let id = next_id(&records);

        records.push(GuessRecord::from_input(id, input.clone().normalized(), Utc::now(), is_winner));
        self.save(&records).await?;
        info!(id, is_winner, "Guess saved to local storage");

        Ok(CreatedGuess { id, is_winner })
    }

    async fn list_all(&self) -> StorageResult<Vec<GuessRecord>> {
        let mut records = self.load().await?;
        newest_first(&mut records);
        Ok(records)
    }

    async fn aggregate(&self) -> StorageResult<GuessStats> {
        let records = self.load().await?;
        Ok(GuessStats::tally(&records))
    }

    async fn get_winner(&self) -> StorageResult<Option<GuessRecord>> {
        let records = self.load().await?;
        Ok(records.into_iter().find(|r| r.is_winner))
    }

    async fn clear_all(&self) -> StorageResult<()> {
        self.ensure_ready().await?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Write(format!("cannot remove {}: {e}", self.path.display()))),
        }
        info!("Local guesses cleared");
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        self.ensure_ready().await
    }
}
