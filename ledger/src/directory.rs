use bastion_types::{GameBox, GameBoxId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("game box {0} not found")]
    NotFound(GameBoxId),
    #[error("game box directory unavailable: {0}")]
    Unavailable(String),
}

pub trait GameBoxDirectory: Send + Sync {
    fn resolve(&self, id: GameBoxId) -> Result<GameBox, DirectoryError>;
}

impl<D: GameBoxDirectory + ?Sized> GameBoxDirectory for Arc<D> {
    fn resolve(&self, id: GameBoxId) -> Result<GameBox, DirectoryError> {
        (**self).resolve(id)
    }
}

impl<D: GameBoxDirectory + ?Sized> GameBoxDirectory for &D {
    fn resolve(&self, id: GameBoxId) -> Result<GameBox, DirectoryError> {
        (**self).resolve(id)
    }
}

/// In-process directory, seeded from configuration or by the caller.
#[derive(Default)]
pub struct GameBoxRegistry {
    boxes: RwLock<HashMap<GameBoxId, GameBox>>,
}

impl GameBoxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boxes(boxes: impl IntoIterator<Item = GameBox>) -> Self {
        let registry = Self::new();
        for game_box in boxes {
            registry.insert(game_box);
        }
        registry
    }

    /// Adds or replaces a box, returning the previous entry.
    pub fn insert(&self, game_box: GameBox) -> Option<GameBox> {
        self.write().insert(game_box.id, game_box)
    }

    pub fn remove(&self, id: GameBoxId) -> Option<GameBox> {
        self.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<GameBoxId, GameBox>> {
        match self.boxes.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Game box registry lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<GameBoxId, GameBox>> {
        match self.boxes.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Game box registry lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl GameBoxDirectory for GameBoxRegistry {
    fn resolve(&self, id: GameBoxId) -> Result<GameBox, DirectoryError> {
        self.read()
            .get(&id)
            .copied()
            .ok_or(DirectoryError::NotFound(id))
    }
}
