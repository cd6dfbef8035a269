use serde::{Deserialize, Serialize};

use crate::{ChallengeId, GameBoxId, TeamId};

/// A team's instance of a challenge, as far as the ledger needs to know it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameBox {
    pub id: GameBoxId,
    pub team_id: TeamId,
    pub challenge_id: ChallengeId,
}

impl GameBox {
    pub fn new(id: GameBoxId, team_id: TeamId, challenge_id: ChallengeId) -> Self {
        Self {
            id,
            team_id,
            challenge_id,
        }
    }
}
