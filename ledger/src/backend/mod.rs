use bastion_types::{
    Action, ActionFilter, ActionKey, ActionType, ChallengeId, GameBoxId, Round, TeamId,
};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::classify::{classify_insert_error, Dialect, InsertErrorClass};
use crate::error::{LedgerError, StorageError};

mod postgres;
mod sqlite;

pub(crate) const ACTION_COLUMNS: &str = "id, created_at_ms, updated_at_ms, deleted_at_ms, \
     action_type, team_id, challenge_id, game_box_id, attacker_team_id, round, score";

#[derive(Clone)]
pub enum BackendConfig {
    Sqlite {
        path: PathBuf,
        busy_timeout: Duration,
    },
    Postgres {
        url: String,
    },
}

impl BackendConfig {
    pub fn dialect(&self) -> Dialect {
        match self {
            BackendConfig::Sqlite { .. } => Dialect::Sqlite,
            BackendConfig::Postgres { .. } => Dialect::Postgres,
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::Sqlite { path, busy_timeout } => f
                .debug_struct("Sqlite")
                .field("path", path)
                .field("busy_timeout", busy_timeout)
                .finish(),
            BackendConfig::Postgres { url } => f
                .debug_struct("Postgres")
                .field("url", &crate::config::redact_url(url))
                .finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// Connections kept open between operations; more are opened on demand.
    pub max_idle_connections: usize,
}

impl StoreConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sqlite {
                path: path.into(),
                busy_timeout: Duration::from_millis(crate::config::DEFAULT_BUSY_TIMEOUT_MS),
            },
            max_idle_connections: crate::config::DEFAULT_MAX_IDLE_CONNECTIONS,
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig::Postgres { url: url.into() },
            max_idle_connections: crate::config::DEFAULT_MAX_IDLE_CONNECTIONS,
        }
    }
}

/// Which rows a read selects. Filter fields are applied exactly as given.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ActionQuery {
    pub filter: ActionFilter,
    pub unscored_only: bool,
}

impl ActionQuery {
    /// Caller-facing filter: zero identifiers mean "any".
    pub fn matching(filter: &ActionFilter) -> Self {
        Self {
            filter: filter.normalized(),
            unscored_only: false,
        }
    }

    pub fn exact(filter: ActionFilter) -> Self {
        Self {
            filter,
            unscored_only: false,
        }
    }

    pub fn unscored(round: Round, action_type: ActionType) -> Self {
        Self {
            filter: ActionFilter {
                action_type: Some(action_type),
                round: Some(round),
                ..ActionFilter::default()
            },
            unscored_only: true,
        }
    }

    /// Builds the WHERE clause; `placeholder` renders the n-th (1-based)
    /// parameter in the engine's syntax.
    pub fn where_clause(&self, placeholder: impl Fn(usize) -> String) -> (String, Vec<i64>) {
        let filter = &self.filter;
        let columns: [(&str, Option<i64>); 6] = [
            ("action_type", filter.action_type.map(ActionType::as_i64)),
            ("team_id", filter.team_id.map(|v| i64::from(v.get()))),
            ("challenge_id", filter.challenge_id.map(|v| i64::from(v.get()))),
            ("game_box_id", filter.game_box_id.map(|v| i64::from(v.get()))),
            (
                "attacker_team_id",
                filter.attacker_team_id.map(|v| i64::from(v.get())),
            ),
            ("round", filter.round.map(|v| i64::from(v.get()))),
        ];

        let mut clauses = vec!["deleted_at_ms IS NULL".to_string()];
        let mut values = Vec::new();
        for (column, value) in columns {
            if let Some(value) = value {
                values.push(value);
                clauses.push(format!("{column} = {}", placeholder(values.len())));
            }
        }
        if self.unscored_only {
            clauses.push("score = 0".to_string());
        }
        (clauses.join(" AND "), values)
    }
}

pub(crate) fn key_values(key: &ActionKey) -> [i64; 6] {
    [
        key.action_type.as_i64(),
        i64::from(key.team_id.get()),
        i64::from(key.challenge_id.get()),
        i64::from(key.game_box_id.get()),
        i64::from(key.attacker_team_id.get()),
        i64::from(key.round.get()),
    ]
}

/// Row as read from either engine, before range checks.
pub(crate) struct RawAction {
    pub id: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub deleted_at_ms: Option<i64>,
    pub action_type: i64,
    pub team_id: i64,
    pub challenge_id: i64,
    pub game_box_id: i64,
    pub attacker_team_id: i64,
    pub round: i64,
    pub score: f64,
}

fn to_u32(column: &'static str, value: i64) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::OutOfRange { column, value })
}

impl RawAction {
    pub fn into_action(self) -> Result<Action, StorageError> {
        let action_type = ActionType::try_from(self.action_type).map_err(|source| {
            StorageError::Decode {
                column: "action_type",
                source,
            }
        })?;
        Ok(Action {
            id: self.id,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
            deleted_at_ms: self.deleted_at_ms,
            action_type,
            team_id: TeamId(to_u32("team_id", self.team_id)?),
            challenge_id: ChallengeId(to_u32("challenge_id", self.challenge_id)?),
            game_box_id: GameBoxId(to_u32("game_box_id", self.game_box_id)?),
            attacker_team_id: TeamId(to_u32("attacker_team_id", self.attacker_team_id)?),
            round: Round(to_u32("round", self.round)?),
            score: self.score,
        })
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub(crate) enum Conn {
    Sqlite(rusqlite::Connection),
    Postgres(::postgres::Client),
}

impl Conn {
    fn open(config: &BackendConfig) -> Result<Self, StorageError> {
        match config {
            BackendConfig::Sqlite { path, busy_timeout } => {
                Ok(Conn::Sqlite(sqlite::open(path, *busy_timeout)?))
            }
            BackendConfig::Postgres { url } => Ok(Conn::Postgres(postgres::open(url)?)),
        }
    }

    fn is_reusable(&self) -> bool {
        match self {
            Conn::Sqlite(_) => true,
            Conn::Postgres(client) => !client.is_closed(),
        }
    }

    fn migrate(&mut self) -> Result<(), StorageError> {
        match self {
            Conn::Sqlite(conn) => sqlite::init_schema(conn),
            Conn::Postgres(client) => postgres::init_schema(client),
        }
    }

    pub fn select(&mut self, query: &ActionQuery) -> Result<Vec<Action>, StorageError> {
        match self {
            Conn::Sqlite(conn) => sqlite::select_actions(conn, query),
            Conn::Postgres(client) => postgres::select_actions(client, query),
        }
    }

    fn begin(&mut self) -> Result<Tx<'_>, StorageError> {
        match self {
            Conn::Sqlite(conn) => Ok(Tx::Sqlite(sqlite::begin(conn)?)),
            Conn::Postgres(client) => Ok(Tx::Postgres(client.transaction()?)),
        }
    }
}

/// An open transaction on one pooled connection.
pub(crate) enum Tx<'c> {
    Sqlite(rusqlite::Transaction<'c>),
    Postgres(::postgres::Transaction<'c>),
}

impl Tx<'_> {
    pub fn dialect(&self) -> Dialect {
        match self {
            Tx::Sqlite(_) => Dialect::Sqlite,
            Tx::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Id of the live action occupying `key`, if any.
    pub fn find_key(&mut self, key: &ActionKey) -> Result<Option<i64>, StorageError> {
        match self {
            Tx::Sqlite(tx) => sqlite::find_key(tx, key),
            Tx::Postgres(tx) => postgres::find_key(tx, key),
        }
    }

    /// Inserts an unscored action. A violated uniqueness index is reported as
    /// [LedgerError::DuplicateAction]; any other failure is passed through.
    pub fn insert_action(&mut self, key: &ActionKey, now_ms: i64) -> Result<Action, LedgerError> {
        let inserted = match self {
            Tx::Sqlite(tx) => sqlite::insert_action(tx, key, now_ms),
            Tx::Postgres(tx) => postgres::insert_action(tx, key, now_ms),
        };
        match inserted {
            Ok(id) => Ok(Action {
                id,
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
                deleted_at_ms: None,
                action_type: key.action_type,
                team_id: key.team_id,
                challenge_id: key.challenge_id,
                game_box_id: key.game_box_id,
                attacker_team_id: key.attacker_team_id,
                round: key.round,
                score: 0.0,
            }),
            Err(err) => match classify_insert_error(self.dialect(), &err) {
                InsertErrorClass::Duplicate => {
                    debug!(dialect = %self.dialect(), error = %err, "unique index rejected action insert");
                    Err(LedgerError::DuplicateAction)
                }
                InsertErrorClass::Other => Err(LedgerError::Storage(err)),
            },
        }
    }

    pub fn select(&mut self, query: &ActionQuery) -> Result<Vec<Action>, StorageError> {
        match self {
            Tx::Sqlite(tx) => sqlite::select_actions(tx, query),
            Tx::Postgres(tx) => postgres::select_actions(tx, query),
        }
    }

    /// Sets the score of action `id` when it is unscored, or unconditionally
    /// when `replace` is set. Returns whether a row changed.
    pub fn update_score(
        &mut self,
        id: i64,
        score: f64,
        replace: bool,
        now_ms: i64,
    ) -> Result<bool, StorageError> {
        match self {
            Tx::Sqlite(tx) => sqlite::update_score(tx, id, score, replace, now_ms),
            Tx::Postgres(tx) => postgres::update_score(tx, id, score, replace, now_ms),
        }
    }

    pub fn delete_all(&mut self) -> Result<u64, StorageError> {
        match self {
            Tx::Sqlite(tx) => sqlite::delete_all(tx),
            Tx::Postgres(tx) => postgres::delete_all(tx),
        }
    }

    fn commit(self) -> Result<(), StorageError> {
        match self {
            Tx::Sqlite(tx) => tx.commit()?,
            Tx::Postgres(tx) => tx.commit()?,
        }
        Ok(())
    }

    fn rollback(self) -> Result<(), StorageError> {
        match self {
            Tx::Sqlite(tx) => tx.rollback()?,
            Tx::Postgres(tx) => tx.rollback()?,
        }
        Ok(())
    }
}

/// Idle connection list for one backend.
pub(crate) struct Pool {
    config: BackendConfig,
    max_idle: usize,
    idle: Mutex<Vec<Conn>>,
}

impl Pool {
    /// Opens the first connection and applies the schema.
    pub fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        let pool = Self {
            config: config.backend.clone(),
            max_idle: config.max_idle_connections.max(1),
            idle: Mutex::new(Vec::new()),
        };
        pool.get()?.migrate()?;
        Ok(pool)
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect()
    }

    pub fn get(&self) -> Result<PooledConn<'_>, StorageError> {
        let idle = self.lock_idle().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => Conn::open(&self.config)?,
        };
        Ok(PooledConn {
            pool: self,
            conn: Some(conn),
        })
    }

    /// Runs `work` inside one transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Tx<'_>) -> Result<T, E>,
    {
        let mut conn = self.get()?;
        let mut tx = conn.begin()?;
        match work(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "ledger transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    fn release(&self, conn: Conn) {
        if !conn.is_reusable() {
            return;
        }
        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Conn>> {
        match self.idle.lock() {
            Ok(idle) => idle,
            Err(poisoned) => {
                warn!("Ledger connection pool lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Checked-out connection; returns to the pool on drop.
pub(crate) struct PooledConn<'p> {
    pool: &'p Pool,
    conn: Option<Conn>,
}

impl Deref for PooledConn<'_> {
    type Target = Conn;

    fn deref(&self) -> &Conn {
        self.conn.as_ref().expect("pooled connection present until drop")
    }
}

impl DerefMut for PooledConn<'_> {
    fn deref_mut(&mut self) -> &mut Conn {
        self.conn.as_mut().expect("pooled connection present until drop")
    }
}

impl Drop for PooledConn<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
