//! Exactly-once ledger of attack, check-down and service events.
//!
//! Producers record events with [ActionStore::create]; at most one live row
//! exists per (type, team, challenge, game box, attacker, round). The scoring
//! pipeline reads pending events with [ActionStore::get_empty_score] and
//! finalizes them with [ActionStore::set_score], which is idempotent unless a
//! replacement is requested.
//!
//! SQLite and Postgres are both supported. Each reports a violated unique
//! index differently; [classify] folds both into
//! [LedgerError::DuplicateAction].

mod backend;
pub use backend::{BackendConfig, StoreConfig};
pub mod classify;
pub use classify::Dialect;
pub mod config;
pub use config::{BackendKind, ConfigError, LedgerConfig, ValidatedConfig};
mod directory;
pub use directory::{DirectoryError, GameBoxDirectory, GameBoxRegistry};
mod error;
pub use error::{LedgerError, StorageError};
mod metrics;
pub use metrics::{LedgerMetrics, LedgerMetricsSnapshot};
mod nonblocking;
pub use nonblocking::AsyncActionStore;
mod store;
pub use store::ActionStore;

pub use bastion_types as types;
