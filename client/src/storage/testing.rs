//! Scripted driver for exercising the coordinator without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shared::{is_winning_position, GuessInput, GuessRecord, GuessStats};

use crate::error::{StorageError, StorageResult};
use crate::storage::traits::{CreatedGuess, DriverId, GuessStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Keeps records in memory
    Healthy,
    /// Every call fails with a connection error
    Failing,
    /// Every call sleeps far past any test time bound
    Hanging,
    /// Creation is refused as invalid
    Rejecting,
    /// Every call reports missing credentials
    Misconfigured,
}

pub struct MockDriver {
    behavior: MockBehavior,
    records: Mutex<Vec<GuessRecord>>,
    calls: AtomicUsize,
    pings: AtomicUsize,
}

impl MockDriver {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            records: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        }
    }

    /// Data operations attempted, probes excluded
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> StorageResult<()> {
        match self.behavior {
            MockBehavior::Healthy | MockBehavior::Rejecting => Ok(()),
            MockBehavior::Failing => Err(StorageError::Connection("connection refused".into())),
            MockBehavior::Hanging => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(StorageError::Connection("gave up".into()))
            }
            MockBehavior::Misconfigured => Err(StorageError::Configuration("no credentials".into())),
        }
    }

    async fn begin(&self) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }
}

#[async_trait]
impl GuessStorage for MockDriver {
    fn id(&self) -> DriverId {
        DriverId::Api
    }

    async fn initialize(&self) -> StorageResult<()> {
        self.gate().await
    }

    fn is_ready(&self) -> bool {
        self.behavior == MockBehavior::Healthy
    }

    async fn create(&self, input: &GuessInput) -> StorageResult<CreatedGuess> {
        self.begin().await?;
        if self.behavior == MockBehavior::Rejecting {
            return Err(StorageError::Validation("Sexo deve ser \"menina\" ou \"menino\"".into()));
        }
        let mut records = self.records.lock().unwrap();
        let id = records.len() as i64 + 1;
        let is_winner = is_winning_position(records.len() as u64);
        records.push(GuessRecord::from_input(id, input.clone(), Utc::now(), is_winner));
        Ok(CreatedGuess { id, is_winner })
    }

    async fn list_all(&self) -> StorageResult<Vec<GuessRecord>> {
        self.begin().await?;
        let mut records = self.records.lock().unwrap().clone();
        records.reverse();
        Ok(records)
    }

    async fn aggregate(&self) -> StorageResult<GuessStats> {
        self.begin().await?;
        Ok(GuessStats::tally(&self.records.lock().unwrap()))
    }

    async fn get_winner(&self) -> StorageResult<Option<GuessRecord>> {
        self.begin().await?;
        Ok(self.records.lock().unwrap().iter().find(|r| r.is_winner).cloned())
    }

    async fn clear_all(&self) -> StorageResult<()> {
        self.begin().await?;
        self.records.lock().unwrap().clear();
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }
}
