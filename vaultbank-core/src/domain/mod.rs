//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod session;
mod transaction;
pub mod result;

pub use account::{Account, AccountNumber, AccountView, DEFAULT_MAX_ATTEMPTS};
pub use session::{AdminSession, Enrollment, Login, Session};
pub use transaction::{NewTransaction, Transaction, TransactionKind};
