//! Chooses which driver serves each operation and falls back to local
//! storage when the network backend fails.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use shared::{GuessId, GuessInput, GuessRecord, GuessStats};
use tracing::{error, info, warn};

use crate::config::{ReadPolicy, Timeouts};
use crate::domain::environment::EnvironmentContext;
use crate::domain::prober::AvailabilityProber;
use crate::error::StorageResult;
use crate::io::export;
use crate::storage::{Availability, DriverId, GuessStorage};

/// Result of a submission, including which driver stored it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOutcome {
    pub id: GuessId,
    pub is_winner: bool,
    pub driver: DriverId,
}

/// A value together with the driver that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub value: T,
    pub driver: DriverId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    List,
    Aggregate,
    Winner,
    Clear,
}

impl Operation {
    fn is_write(self) -> bool {
        matches!(self, Operation::Create | Operation::Clear)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::List => "list",
            Operation::Aggregate => "aggregate",
            Operation::Winner => "winner",
            Operation::Clear => "clear",
        };
        write!(f, "{name}")
    }
}

pub struct StorageCoordinator {
    environment: EnvironmentContext,
    primary: Option<Arc<dyn GuessStorage>>,
    local: Arc<dyn GuessStorage>,
    prober: AvailabilityProber,
    timeouts: Timeouts,
    read_policy: ReadPolicy,
    /// Set once the primary reports a configuration error
    primary_disabled: AtomicBool,
}

impl StorageCoordinator {
    pub fn new(
        environment: EnvironmentContext,
        primary: Option<Arc<dyn GuessStorage>>,
        local: Arc<dyn GuessStorage>,
        timeouts: Timeouts,
        read_policy: ReadPolicy,
    ) -> Self {
        Self {
            environment,
            primary,
            local,
            prober: AvailabilityProber::new(timeouts.probe),
            timeouts,
            read_policy,
            primary_disabled: AtomicBool::new(false),
        }
    }

    pub fn environment(&self) -> &EnvironmentContext {
        &self.environment
    }

    /// The network driver, unless the hosting context rules it out or it
    /// was disabled earlier in the session
    fn active_primary(&self) -> Option<&Arc<dyn GuessStorage>> {
        if self.environment.is_static() || self.primary_disabled.load(Ordering::Relaxed) {
            return None;
        }
        self.primary.as_ref()
    }

    /// The driver the next operation will try first
    pub fn select(&self) -> DriverId {
        self.active_primary()
            .map(|p| p.id())
            .unwrap_or_else(|| self.local.id())
    }

    /// Probe the primary driver, if one is in play
    pub async fn probe(&self) -> Option<(DriverId, Availability)> {
        let primary = self.active_primary()?;
        Some((primary.id(), self.prober.probe(primary.as_ref()).await))
    }

    /// Run `call` against the primary with the operation's time bound, then
    /// against local storage if the primary could not serve it. Validation
    /// failures are returned as-is.
    async fn dispatch<T, F, Fut>(&self, op: Operation, call: F) -> StorageResult<Served<T>>
    where
        F: Fn(Arc<dyn GuessStorage>) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        if let Some(primary) = self.active_primary() {
            if let Some(value) = self.try_primary(op, primary, &call).await? {
                return Ok(Served {
                    value,
                    driver: primary.id(),
                });
            }
        }

        let local = self.local.clone();
        match call(local).await {
            Ok(value) => Ok(Served {
                value,
                driver: self.local.id(),
            }),
            Err(e) => {
                error!(op = %op, error = %e, "Local storage failed");
                Err(e)
            }
        }
    }

    /// `Ok(None)` means the primary could not serve and local storage should
    async fn try_primary<T, F, Fut>(
        &self,
        op: Operation,
        primary: &Arc<dyn GuessStorage>,
        call: &F,
    ) -> StorageResult<Option<T>>
    where
        F: Fn(Arc<dyn GuessStorage>) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let driver = primary.id();

        if !op.is_write() && self.read_policy == ReadPolicy::ProbeFirst {
            if let Availability::Unreachable = self.prober.probe(primary.as_ref()).await {
                warn!(%driver, op = %op, "Primary unreachable, using local storage");
                return Ok(None);
            }
        }

        let budget = self.budget(op);
        match tokio::time::timeout(budget, call(primary.clone())).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(e)) if !e.is_fallback_eligible() => Err(e),
            Ok(Err(e)) => {
                if e.is_configuration() {
                    self.primary_disabled.store(true, Ordering::Relaxed);
                    warn!(%driver, error = %e, "Primary misconfigured, using local storage for the rest of the session");
                } else {
                    warn!(%driver, op = %op, error = %e, "Primary failed, using local storage");
                }
                Ok(None)
            }
            Err(_) => {
                warn!(%driver, op = %op, "Primary timed out after {:?}, using local storage", budget);
                Ok(None)
            }
        }
    }

    fn budget(&self, op: Operation) -> Duration {
        if op.is_write() {
            self.timeouts.write
        } else {
            self.timeouts.read
        }
    }

    /// Validate and store a guess
    pub async fn create(&self, input: GuessInput) -> StorageResult<CreateOutcome> {
        input.validate()?;
        let input = Arc::new(input.normalized());
        info!(driver = %self.select(), "Saving guess from {}", input.name);

        let served = self
            .dispatch(Operation::Create, |driver| {
                let input = input.clone();
                async move { driver.create(&input).await }
            })
            .await?;

        if served.value.is_winner {
            info!(id = served.value.id, "🎉 Guess #{} is the winner", shared::WINNER_POSITION);
        }
        Ok(CreateOutcome {
            id: served.value.id,
            is_winner: served.value.is_winner,
            driver: served.driver,
        })
    }

    pub async fn list_all(&self) -> StorageResult<Served<Vec<GuessRecord>>> {
        self.dispatch(Operation::List, |driver| async move { driver.list_all().await })
            .await
    }

    pub async fn aggregate(&self) -> StorageResult<Served<GuessStats>> {
        self.dispatch(Operation::Aggregate, |driver| async move { driver.aggregate().await })
            .await
    }

    pub async fn get_winner(&self) -> StorageResult<Served<Option<GuessRecord>>> {
        self.dispatch(Operation::Winner, |driver| async move { driver.get_winner().await })
            .await
    }

    /// Irreversible; callers confirm before getting here
    pub async fn clear_all(&self) -> StorageResult<Served<()>> {
        info!(driver = %self.select(), "Clearing all guesses");
        self.dispatch(Operation::Clear, |driver| async move { driver.clear_all().await })
            .await
    }

    /// Write the current list to `palpites_<today>.json` inside `dir`
    pub async fn export(&self, dir: &Path) -> StorageResult<Served<PathBuf>> {
        let listed = self.list_all().await?;
        let path = export::write_export(dir, &listed.value, Local::now().date_naive()).await?;
        info!("Exported {} guesses to {}", listed.value.len(), path.display());
        Ok(Served {
            value: path,
            driver: listed.driver,
        })
    }
}
