//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The services
//! depend only on these traits, not on concrete implementations.

mod credentials;
mod one_time_codes;
mod repository;

pub use credentials::CredentialHasher;
pub use one_time_codes::OneTimeCodes;
pub use repository::{ChangeSet, Repository};
