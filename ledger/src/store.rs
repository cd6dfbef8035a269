use bastion_types::{
    Action, ActionFilter, ActionKey, ActionType, CreateAction, Round, ScoreOutcome, ScoreUpdate,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{now_ms, ActionQuery, Pool, StoreConfig};
use crate::classify::Dialect;
use crate::directory::GameBoxDirectory;
use crate::error::LedgerError;
use crate::metrics::LedgerMetrics;

/// Handle to the action table.
///
/// Construct one at startup and share it (usually behind an [Arc]); every
/// method is a blocking call that is safe to issue from many threads at once,
/// including concurrent creates of the same key.
pub struct ActionStore<D> {
    pool: Pool,
    directory: D,
    metrics: Arc<LedgerMetrics>,
}

impl<D: GameBoxDirectory> ActionStore<D> {
    /// Connects to the configured backend and applies the schema.
    pub fn open(config: &StoreConfig, directory: D) -> Result<Self, LedgerError> {
        let pool = Pool::open(config)?;
        Ok(Self {
            pool,
            directory,
            metrics: Arc::new(LedgerMetrics::default()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<LedgerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<LedgerMetrics> {
        &self.metrics
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn dialect(&self) -> Dialect {
        self.pool.dialect()
    }

    /// Records an action exactly once per key.
    ///
    /// Fails with [LedgerError::GameBoxNotFound] before touching storage if
    /// the game box is unknown, and with [LedgerError::DuplicateAction] if the
    /// key is already taken, whether by an earlier call or a concurrent one.
    pub fn create(&self, request: CreateAction) -> Result<Action, LedgerError> {
        let request = request.normalized();
        let game_box = self.directory.resolve(request.game_box_id)?;
        let key = ActionKey {
            action_type: request.action_type,
            team_id: game_box.team_id,
            challenge_id: game_box.challenge_id,
            game_box_id: game_box.id,
            attacker_team_id: request.attacker_team_id,
            round: request.round,
        };

        let result = self.pool.transaction(|tx| {
            match tx.find_key(&key) {
                Ok(Some(_)) => {
                    self.metrics.inc_duplicate_prechecked();
                    return Err(LedgerError::DuplicateAction);
                }
                Ok(None) => {}
                Err(source) => return Err(LedgerError::Lookup { source }),
            }
            tx.insert_action(&key, now_ms()).inspect_err(|err| {
                if err.is_duplicate() {
                    self.metrics.inc_duplicate_raced();
                }
            })
        });
        self.observe(result)
            .inspect(|_| self.metrics.inc_created())
    }

    /// Every live action matching `filter`, oldest first.
    pub fn get(&self, filter: &ActionFilter) -> Result<Vec<Action>, LedgerError> {
        let query = ActionQuery::matching(filter);
        let result = self
            .pool
            .get()
            .and_then(|mut conn| conn.select(&query))
            .map_err(LedgerError::from);
        self.observe(result)
    }

    /// Actions of `action_type` in `round` still waiting for a score.
    pub fn get_empty_score(
        &self,
        round: Round,
        action_type: ActionType,
    ) -> Result<Vec<Action>, LedgerError> {
        let query = ActionQuery::unscored(round, action_type);
        let result = self
            .pool
            .get()
            .and_then(|mut conn| conn.select(&query))
            .map_err(LedgerError::from);
        self.observe(result)
    }

    /// Attaches a score to the action recorded for a game box in a round.
    ///
    /// A score that is already set is left alone unless `replace` is
    /// requested, so re-running the scoring pipeline is harmless.
    ///
    /// Without `action_type` the target is the oldest action of the box in
    /// that round; callers that record several kinds of action per box and
    /// round should name the kind.
    ///
    /// Non-finite scores are rejected with [LedgerError::InvalidScore] before
    /// storage is touched.
    pub fn set_score(&self, update: ScoreUpdate) -> Result<ScoreOutcome, LedgerError> {
        if !update.score.is_finite() {
            return Err(LedgerError::InvalidScore(update.score));
        }
        let filter = ActionFilter {
            action_type: update.action_type,
            game_box_id: Some(update.game_box_id),
            round: Some(update.round),
            ..ActionFilter::default()
        };
        let query = ActionQuery::exact(filter);

        let result = self.pool.transaction(|tx| {
            let candidates = tx
                .select(&query)
                .map_err(|source| LedgerError::Lookup { source })?;
            let Some(target) = candidates.first() else {
                return Err(LedgerError::ActionNotExists {
                    round: update.round,
                    game_box_id: update.game_box_id,
                });
            };
            if candidates.len() > 1 {
                warn!(
                    round = %update.round,
                    game_box_id = %update.game_box_id,
                    candidates = candidates.len(),
                    target = target.id,
                    "score target is ambiguous; using the oldest action"
                );
            }
            if target.is_scored() && !update.replace {
                return Ok(ScoreOutcome::Unchanged);
            }
            let written = tx.update_score(target.id, update.score, update.replace, now_ms())?;
            Ok(if written {
                ScoreOutcome::Written
            } else {
                ScoreOutcome::Unchanged
            })
        });

        let outcome = self.observe(result)?;
        match outcome {
            ScoreOutcome::Written => self.metrics.inc_score_written(),
            ScoreOutcome::Unchanged => self.metrics.inc_score_skipped(),
        }
        Ok(outcome)
    }

    /// Removes every action. Returns how many rows were deleted.
    pub fn delete_all(&self) -> Result<u64, LedgerError> {
        let result: Result<u64, LedgerError> = self.pool.transaction(|tx| Ok(tx.delete_all()?));
        let removed = self.observe(result)?;
        self.metrics.inc_reset();
        debug!(removed, "action ledger cleared");
        Ok(removed)
    }

    fn observe<T>(&self, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
        if let Err(LedgerError::Storage(_) | LedgerError::Lookup { .. }) = &result {
            self.metrics.inc_storage_error();
        }
        result
    }
}
