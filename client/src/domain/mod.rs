pub mod coordinator;
pub mod environment;
pub mod prober;

pub use coordinator::{CreateOutcome, Served, StorageCoordinator};
pub use environment::{EnvironmentContext, HostingKind};
pub use prober::AvailabilityProber;
