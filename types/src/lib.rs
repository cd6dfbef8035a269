pub mod action;
pub use action::{
    Action, ActionFilter, ActionKey, ActionType, CreateAction, ScoreOutcome, ScoreUpdate,
};
pub mod game_box;
pub use game_box::GameBox;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown action type discriminant: {0}")]
    UnknownActionType(i64),
    #[error("invalid action type: {0} (valid values: been_attacked, check_down, attack, service_online)")]
    InvalidActionType(String),
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn get(self) -> u32 {
                self.0
            }

            pub const fn is_zero(self) -> bool {
                self.0 == 0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(
    /// Identifier of a competing team.
    TeamId
);
id_newtype!(ChallengeId);
id_newtype!(GameBoxId);
id_newtype!(
    /// Externally assigned, monotonically increasing scoring window.
    Round
);

impl TeamId {
    /// Attacker value recorded for events nobody caused (check-downs).
    pub const NONE: TeamId = TeamId(0);
}
