//! Client-side storage for the gender-reveal guest book.
//!
//! Guesses are saved through one of three drivers: the site's REST API, a
//! hosted cloud database, or a local JSON file. [`StorageCoordinator`]
//! decides which one serves each operation from where the site is hosted,
//! and falls back to local storage whenever the network backend fails.

use std::sync::Arc;

use tracing::info;

pub mod config;
pub mod domain;
pub mod error;
pub mod io;
pub mod storage;

pub use config::{ClientConfig, PrimaryBackend, ReadPolicy, Timeouts};
pub use domain::{AvailabilityProber, CreateOutcome, EnvironmentContext, HostingKind, Served, StorageCoordinator};
pub use error::{StorageError, StorageResult};
pub use storage::{ApiDriver, Availability, CloudDriver, CredentialSource, DriverId, GuessStorage, LocalDriver};

/// Build the coordinator described by `config`.
///
/// Only local storage is prepared eagerly; network drivers connect on
/// first use so an unreachable backend never blocks startup.
pub async fn initialize_client(config: &ClientConfig) -> StorageResult<StorageCoordinator> {
    let environment = EnvironmentContext::from_origin(&config.origin);

    let local = Arc::new(LocalDriver::new(&config.data_dir));
    local.initialize().await?;

    let primary: Option<Arc<dyn GuessStorage>> = if environment.is_static() {
        info!("Static hosting detected ({}), using local storage only", environment.origin());
        None
    } else {
        match config.primary {
            PrimaryBackend::Api => Some(Arc::new(ApiDriver::new(environment.origin(), config.timeouts))),
            PrimaryBackend::Cloud => {
                let credentials =
                    CredentialSource::from_parts(config.supabase_url.clone(), config.supabase_anon_key.clone());
                Some(Arc::new(CloudDriver::new(credentials, config.timeouts)))
            }
        }
    };

    if primary.is_some() {
        info!("Using {} backend with local fallback at {}", config.primary, local.path().display());
    }

    Ok(StorageCoordinator::new(
        environment,
        primary,
        local,
        config.timeouts,
        config.read_policy,
    ))
}
