//! # Storage Traits
//!
//! The driver contract shared by every storage medium, so the coordinator
//! can work against any of them without knowing which one it holds.

use std::fmt;

use async_trait::async_trait;
use shared::{GuessId, GuessInput, GuessRecord, GuessStats};

use crate::error::StorageResult;

/// Which driver served an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverId {
    Api,
    Cloud,
    Local,
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverId::Api => "api",
            DriverId::Cloud => "cloud",
            DriverId::Local => "local",
        };
        write!(f, "{name}")
    }
}

/// Result of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Reachable,
    Unreachable,
}

impl Availability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Availability::Reachable)
    }
}

/// What a driver reports back after storing a guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedGuess {
    pub id: GuessId,
    pub is_winner: bool,
}

/// Trait defining the interface for guess storage operations
///
/// Operations initialize the driver on first use, so calling
/// [`GuessStorage::initialize`] up front is optional.
#[async_trait]
pub trait GuessStorage: Send + Sync {
    fn id(&self) -> DriverId;

    /// Establish the connection. Repeated calls after success are no-ops and
    /// concurrent callers wait on the same attempt.
    async fn initialize(&self) -> StorageResult<()>;

    fn is_ready(&self) -> bool;

    /// Store one guess, deciding its winner flag
    async fn create(&self, input: &GuessInput) -> StorageResult<CreatedGuess>;

    /// All guesses, newest registration first
    async fn list_all(&self) -> StorageResult<Vec<GuessRecord>>;

    async fn aggregate(&self) -> StorageResult<GuessStats>;

    async fn get_winner(&self) -> StorageResult<Option<GuessRecord>>;

    /// Delete every guess
    async fn clear_all(&self) -> StorageResult<()>;

    /// Cheapest read the medium offers; used for liveness checks
    async fn ping(&self) -> StorageResult<()>;
}
