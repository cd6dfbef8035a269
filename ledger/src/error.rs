use bastion_types::{GameBoxId, Round, TypeError};
use thiserror::Error;

use crate::classify::ErrorCode;
use crate::directory::DirectoryError;

/// Failure reported by a storage engine, or by decoding one of its rows.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("column {column} holds {value}, which does not fit its type")]
    OutOfRange { column: &'static str, value: i64 },
    #[error("column {column} is invalid")]
    Decode {
        column: &'static str,
        #[source]
        source: TypeError,
    },
}

impl StorageError {
    /// Engine-specific code carried by the error, if the engine reported one.
    pub fn code(&self) -> Option<ErrorCode<'_>> {
        match self {
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(inner, _)) => {
                Some(ErrorCode::Numeric(inner.extended_code))
            }
            StorageError::Postgres(err) => err.code().map(|state| ErrorCode::SqlState(state.code())),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("game box {game_box_id} does not exist")]
    GameBoxNotFound { game_box_id: GameBoxId },
    #[error("game box directory: {0}")]
    Directory(#[source] DirectoryError),
    /// The key is already recorded. Callers treat this as "done", not as a fault.
    #[error("duplicate action")]
    DuplicateAction,
    #[error("score must be a finite number (got {0})")]
    InvalidScore(f64),
    #[error("action does not exist (round={round}, game_box={game_box_id})")]
    ActionNotExists { round: Round, game_box_id: GameBoxId },
    #[error("get action: {source}")]
    Lookup {
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("blocking ledger task failed: {0}")]
    Join(String),
}

impl LedgerError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicateAction)
    }
}

impl From<DirectoryError> for LedgerError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(game_box_id) => LedgerError::GameBoxNotFound { game_box_id },
            other => LedgerError::Directory(other),
        }
    }
}
