//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod admin;
pub mod audit;
mod auth;
mod doctor;
mod ledger;
pub mod locks;
pub mod migration;

pub use admin::AdminService;
pub use audit::{Actor, AuditEntry, AuditEvent, AuditLog, AuditTrail};
pub use auth::AuthService;
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use ledger::{LedgerService, Reconciliation};
pub use locks::AccountLocks;
pub use migration::{MigrationResult, MigrationService};
