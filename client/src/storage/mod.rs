//! Storage drivers for guess records.
//!
//! Each medium (the REST API, the hosted cloud database and the local JSON
//! file) implements [`GuessStorage`]; the coordinator picks between them.

pub mod api;
pub mod cloud;
pub mod connection;
pub mod local;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use api::ApiDriver;
pub use cloud::{CloudCredentials, CloudDriver, CredentialSource};
pub use connection::ReadyState;
pub use local::LocalDriver;
pub use traits::{Availability, CreatedGuess, DriverId, GuessStorage};
