use bastion_types::{
    Action, ActionFilter, ActionType, CreateAction, Round, ScoreOutcome, ScoreUpdate,
};
use std::sync::Arc;

use crate::directory::GameBoxDirectory;
use crate::error::LedgerError;
use crate::store::ActionStore;

/// Runs each [ActionStore] call on the blocking pool.
pub struct AsyncActionStore<D> {
    inner: Arc<ActionStore<D>>,
}

impl<D> Clone for AsyncActionStore<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: GameBoxDirectory + 'static> AsyncActionStore<D> {
    pub fn new(store: Arc<ActionStore<D>>) -> Self {
        Self { inner: store }
    }

    pub fn blocking(&self) -> &Arc<ActionStore<D>> {
        &self.inner
    }

    async fn run<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&ActionStore<D>) -> Result<T, LedgerError> + Send + 'static,
    {
        let store = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || work(store.as_ref()))
            .await
            .map_err(|err| LedgerError::Join(err.to_string()))?
    }

    pub async fn create(&self, request: CreateAction) -> Result<Action, LedgerError> {
        self.run(move |store| store.create(request)).await
    }

    pub async fn get(&self, filter: ActionFilter) -> Result<Vec<Action>, LedgerError> {
        self.run(move |store| store.get(&filter)).await
    }

    pub async fn get_empty_score(
        &self,
        round: Round,
        action_type: ActionType,
    ) -> Result<Vec<Action>, LedgerError> {
        self.run(move |store| store.get_empty_score(round, action_type))
            .await
    }

    pub async fn set_score(&self, update: ScoreUpdate) -> Result<ScoreOutcome, LedgerError> {
        self.run(move |store| store.set_score(update)).await
    }

    pub async fn delete_all(&self) -> Result<u64, LedgerError> {
        self.run(|store| store.delete_all()).await
    }
}
