//! Group expense sharing: members log shared expenses in a group and query
//! who owes whom.

pub mod auth;
pub mod balance;
pub mod config;
pub mod duplicate;
pub mod error;
pub mod ledger;
pub mod mongo;
pub mod routes;
pub mod schemas;
pub mod telemetry;

pub use balance::{compute_balances, group_balances, Balances, GroupBalances};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{InMemoryLedger, LedgerStore};
