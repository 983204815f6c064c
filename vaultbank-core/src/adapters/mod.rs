//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB and process memory for the Repository port
//! - Argon2id (with legacy SHA-256 fallback) for CredentialHasher
//! - RFC 6238 TOTP for OneTimeCodes

pub mod credentials;
pub mod duckdb;
pub mod memory;
pub mod totp;

pub use credentials::{Argon2Credentials, Sha256Credentials};
pub use duckdb::DuckDbRepository;
pub use memory::MemoryRepository;
pub use totp::TotpCodes;
