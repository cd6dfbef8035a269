use ::postgres::types::ToSql;
use ::postgres::{Client, GenericClient, NoTls, Row};
use bastion_types::{Action, ActionKey};

use super::{key_values, ActionQuery, RawAction, ACTION_COLUMNS};
use crate::error::StorageError;

pub(super) fn open(url: &str) -> Result<Client, StorageError> {
    Ok(Client::connect(url, NoTls)?)
}

pub(super) fn init_schema(client: &mut Client) -> Result<(), StorageError> {
    client.batch_execute(
        "CREATE TABLE IF NOT EXISTS actions (
            id BIGSERIAL PRIMARY KEY,
            created_at_ms BIGINT NOT NULL,
            updated_at_ms BIGINT NOT NULL,
            deleted_at_ms BIGINT,
            action_type BIGINT NOT NULL,
            team_id BIGINT NOT NULL,
            challenge_id BIGINT NOT NULL,
            game_box_id BIGINT NOT NULL,
            attacker_team_id BIGINT NOT NULL,
            round BIGINT NOT NULL,
            score DOUBLE PRECISION NOT NULL DEFAULT 0
        );
        CREATE UNIQUE INDEX IF NOT EXISTS action_unique_idx ON actions (
            action_type, team_id, challenge_id, game_box_id, attacker_team_id, round
        );
        CREATE INDEX IF NOT EXISTS actions_round_type ON actions (round, action_type);",
    )?;
    Ok(())
}

fn as_params(values: &[i64]) -> Vec<&(dyn ToSql + Sync)> {
    values
        .iter()
        .map(|value| value as &(dyn ToSql + Sync))
        .collect()
}

pub(super) fn find_key<C: GenericClient>(
    client: &mut C,
    key: &ActionKey,
) -> Result<Option<i64>, StorageError> {
    let values = key_values(key);
    let row = client.query_opt(
        "SELECT id FROM actions
         WHERE action_type = $1 AND team_id = $2 AND challenge_id = $3
           AND game_box_id = $4 AND attacker_team_id = $5 AND round = $6
           AND deleted_at_ms IS NULL
         LIMIT 1",
        &as_params(&values),
    )?;
    Ok(row.map(|row| row.get::<_, i64>(0)))
}

pub(super) fn insert_action<C: GenericClient>(
    client: &mut C,
    key: &ActionKey,
    now_ms: i64,
) -> Result<i64, StorageError> {
    let [action_type, team_id, challenge_id, game_box_id, attacker_team_id, round] =
        key_values(key);
    let row = client.query_one(
        "INSERT INTO actions (created_at_ms, updated_at_ms, action_type, team_id, challenge_id,
                              game_box_id, attacker_team_id, round, score)
         VALUES ($1, $1, $2, $3, $4, $5, $6, $7, 0)
         RETURNING id",
        &[
            &now_ms,
            &action_type,
            &team_id,
            &challenge_id,
            &game_box_id,
            &attacker_team_id,
            &round,
        ],
    )?;
    Ok(row.get(0))
}

fn map_row(row: &Row) -> RawAction {
    RawAction {
        id: row.get(0),
        created_at_ms: row.get(1),
        updated_at_ms: row.get(2),
        deleted_at_ms: row.get(3),
        action_type: row.get(4),
        team_id: row.get(5),
        challenge_id: row.get(6),
        game_box_id: row.get(7),
        attacker_team_id: row.get(8),
        round: row.get(9),
        score: row.get(10),
    }
}

pub(super) fn select_actions<C: GenericClient>(
    client: &mut C,
    query: &ActionQuery,
) -> Result<Vec<Action>, StorageError> {
    let (clause, values) = query.where_clause(|n| format!("${n}"));
    let sql = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE {clause} ORDER BY id ASC");
    let rows = client.query(sql.as_str(), &as_params(&values))?;
    rows.iter()
        .map(|row| map_row(row).into_action())
        .collect()
}

pub(super) fn update_score<C: GenericClient>(
    client: &mut C,
    id: i64,
    score: f64,
    replace: bool,
    now_ms: i64,
) -> Result<bool, StorageError> {
    let changed = client.execute(
        "UPDATE actions SET score = $1, updated_at_ms = $2
         WHERE id = $3 AND deleted_at_ms IS NULL AND (score = 0 OR $4)",
        &[&score, &now_ms, &id, &replace],
    )?;
    Ok(changed > 0)
}

pub(super) fn delete_all<C: GenericClient>(client: &mut C) -> Result<u64, StorageError> {
    Ok(client.execute("DELETE FROM actions", &[])?)
}
