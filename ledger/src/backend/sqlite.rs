use bastion_types::{Action, ActionKey};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use super::{key_values, ActionQuery, RawAction, ACTION_COLUMNS};
use crate::error::StorageError;

pub(super) fn open(path: &Path, busy_timeout: Duration) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

pub(super) fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         CREATE TABLE IF NOT EXISTS actions (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             created_at_ms INTEGER NOT NULL,
             updated_at_ms INTEGER NOT NULL,
             deleted_at_ms INTEGER,
             action_type INTEGER NOT NULL,
             team_id INTEGER NOT NULL,
             challenge_id INTEGER NOT NULL,
             game_box_id INTEGER NOT NULL,
             attacker_team_id INTEGER NOT NULL,
             round INTEGER NOT NULL,
             score REAL NOT NULL DEFAULT 0
         );
         CREATE UNIQUE INDEX IF NOT EXISTS action_unique_idx ON actions(
             action_type, team_id, challenge_id, game_box_id, attacker_team_id, round
         );
         CREATE INDEX IF NOT EXISTS actions_round_type ON actions(round, action_type);",
    )?;
    Ok(())
}

/// Write transactions take the database write lock up front, so a
/// pre-check never reads a snapshot another writer is about to invalidate.
pub(super) fn begin(conn: &mut Connection) -> Result<rusqlite::Transaction<'_>, StorageError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

pub(super) fn find_key(conn: &Connection, key: &ActionKey) -> Result<Option<i64>, StorageError> {
    let id = conn
        .query_row(
            "SELECT id FROM actions
             WHERE action_type = ?1 AND team_id = ?2 AND challenge_id = ?3
               AND game_box_id = ?4 AND attacker_team_id = ?5 AND round = ?6
               AND deleted_at_ms IS NULL
             LIMIT 1",
            params_from_iter(key_values(key)),
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(id)
}

pub(super) fn insert_action(
    conn: &Connection,
    key: &ActionKey,
    now_ms: i64,
) -> Result<i64, StorageError> {
    let [action_type, team_id, challenge_id, game_box_id, attacker_team_id, round] =
        key_values(key);
    conn.execute(
        "INSERT INTO actions (created_at_ms, updated_at_ms, action_type, team_id, challenge_id,
                              game_box_id, attacker_team_id, round, score)
         VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
        params![now_ms, action_type, team_id, challenge_id, game_box_id, attacker_team_id, round],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn select_actions(
    conn: &Connection,
    query: &ActionQuery,
) -> Result<Vec<Action>, StorageError> {
    let (clause, values) = query.where_clause(|n| format!("?{n}"));
    let sql = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE {clause} ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql)?;
    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAction> {
        Ok(RawAction {
            id: row.get(0)?,
            created_at_ms: row.get(1)?,
            updated_at_ms: row.get(2)?,
            deleted_at_ms: row.get(3)?,
            action_type: row.get(4)?,
            team_id: row.get(5)?,
            challenge_id: row.get(6)?,
            game_box_id: row.get(7)?,
            attacker_team_id: row.get(8)?,
            round: row.get(9)?,
            score: row.get(10)?,
        })
    }
    let rows = stmt.query_map(params_from_iter(values), map_row)?;

    let mut actions = Vec::new();
    for row in rows {
        actions.push(row?.into_action()?);
    }
    Ok(actions)
}

pub(super) fn update_score(
    conn: &Connection,
    id: i64,
    score: f64,
    replace: bool,
    now_ms: i64,
) -> Result<bool, StorageError> {
    let changed = conn.execute(
        "UPDATE actions SET score = ?1, updated_at_ms = ?2
         WHERE id = ?3 AND deleted_at_ms IS NULL AND (score = 0 OR ?4)",
        params![score, now_ms, id, replace],
    )?;
    Ok(changed > 0)
}

pub(super) fn delete_all(conn: &Connection) -> Result<u64, StorageError> {
    let removed = conn.execute("DELETE FROM actions", [])?;
    Ok(removed as u64)
}
