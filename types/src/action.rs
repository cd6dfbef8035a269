use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ChallengeId, GameBoxId, Round, TeamId, TypeError};

/// Kind of scoring event recorded by the ledger.
///
/// The discriminants are persisted and must never be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    BeenAttacked = 0,
    CheckDown = 1,
    Attack = 2,
    ServiceOnline = 3,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::BeenAttacked,
        ActionType::CheckDown,
        ActionType::Attack,
        ActionType::ServiceOnline,
    ];

    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ActionType::BeenAttacked => "been_attacked",
            ActionType::CheckDown => "check_down",
            ActionType::Attack => "attack",
            ActionType::ServiceOnline => "service_online",
        }
    }

    /// Whether events of this kind carry an attacking team.
    pub const fn has_attacker(self) -> bool {
        !matches!(self, ActionType::CheckDown)
    }
}

impl TryFrom<i64> for ActionType {
    type Error = TypeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActionType::BeenAttacked),
            1 => Ok(ActionType::CheckDown),
            2 => Ok(ActionType::Attack),
            3 => Ok(ActionType::ServiceOnline),
            other => Err(TypeError::UnknownActionType(other)),
        }
    }
}

impl FromStr for ActionType {
    type Err = TypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "been_attacked" => Ok(ActionType::BeenAttacked),
            "check_down" => Ok(ActionType::CheckDown),
            "attack" => Ok(ActionType::Attack),
            "service_online" => Ok(ActionType::ServiceOnline),
            _ => Err(TypeError::InvalidActionType(value.to_string())),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniqueness tuple: at most one live action exists per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub action_type: ActionType,
    pub team_id: TeamId,
    pub challenge_id: ChallengeId,
    pub game_box_id: GameBoxId,
    pub attacker_team_id: TeamId,
    pub round: Round,
}

/// A recorded scoring event.
///
/// Identity fields never change after creation; only `score` (and
/// `updated_at_ms`) move, through the ledger's scoring path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub deleted_at_ms: Option<i64>,
    pub action_type: ActionType,
    pub team_id: TeamId,
    pub challenge_id: ChallengeId,
    pub game_box_id: GameBoxId,
    pub attacker_team_id: TeamId,
    pub round: Round,
    pub score: f64,
}

impl Action {
    pub fn key(&self) -> ActionKey {
        ActionKey {
            action_type: self.action_type,
            team_id: self.team_id,
            challenge_id: self.challenge_id,
            game_box_id: self.game_box_id,
            attacker_team_id: self.attacker_team_id,
            round: self.round,
        }
    }

    /// A zero score means the event is still waiting for the scoring pipeline.
    pub fn is_scored(&self) -> bool {
        self.score != 0.0
    }
}

/// Producer-side description of an event to record.
///
/// Team and challenge are not part of the request: they are resolved from the
/// game box when the action is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAction {
    pub action_type: ActionType,
    pub game_box_id: GameBoxId,
    #[serde(default)]
    pub attacker_team_id: TeamId,
    pub round: Round,
}

impl CreateAction {
    pub fn new(
        action_type: ActionType,
        game_box_id: GameBoxId,
        attacker_team_id: TeamId,
        round: Round,
    ) -> Self {
        Self {
            action_type,
            game_box_id,
            attacker_team_id,
            round,
        }
    }

    /// Check-downs are never attributed, whatever the caller sent.
    pub fn normalized(mut self) -> Self {
        if !self.action_type.has_attacker() {
            self.attacker_team_id = TeamId::NONE;
        }
        self
    }
}

/// Partial match over the identity columns of an action.
///
/// `None` leaves a column unconstrained. Identifier fields set to zero are
/// treated as unconstrained too, so a zero id cannot be searched for through
/// a filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFilter {
    pub action_type: Option<ActionType>,
    pub team_id: Option<TeamId>,
    pub challenge_id: Option<ChallengeId>,
    pub game_box_id: Option<GameBoxId>,
    pub attacker_team_id: Option<TeamId>,
    pub round: Option<Round>,
}

impl ActionFilter {
    pub fn action_type(mut self, value: ActionType) -> Self {
        self.action_type = Some(value);
        self
    }

    pub fn team(mut self, value: TeamId) -> Self {
        self.team_id = Some(value);
        self
    }

    pub fn challenge(mut self, value: ChallengeId) -> Self {
        self.challenge_id = Some(value);
        self
    }

    pub fn game_box(mut self, value: GameBoxId) -> Self {
        self.game_box_id = Some(value);
        self
    }

    pub fn attacker(mut self, value: TeamId) -> Self {
        self.attacker_team_id = Some(value);
        self
    }

    pub fn round(mut self, value: Round) -> Self {
        self.round = Some(value);
        self
    }

    /// Drops zero identifiers so they behave as "any".
    pub fn normalized(self) -> Self {
        Self {
            action_type: self.action_type,
            team_id: self.team_id.filter(|id| !id.is_zero()),
            challenge_id: self.challenge_id.filter(|id| !id.is_zero()),
            game_box_id: self.game_box_id.filter(|id| !id.is_zero()),
            attacker_team_id: self.attacker_team_id.filter(|id| !id.is_zero()),
            round: self.round.filter(|round| !round.is_zero()),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.normalized() == Self::default()
    }

    pub fn matches(&self, action: &Action) -> bool {
        let filter = self.normalized();
        filter.action_type.is_none_or(|v| v == action.action_type)
            && filter.team_id.is_none_or(|v| v == action.team_id)
            && filter.challenge_id.is_none_or(|v| v == action.challenge_id)
            && filter.game_box_id.is_none_or(|v| v == action.game_box_id)
            && filter
                .attacker_team_id
                .is_none_or(|v| v == action.attacker_team_id)
            && filter.round.is_none_or(|v| v == action.round)
    }
}

/// Request to attach a score to an already recorded action.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub round: Round,
    pub game_box_id: GameBoxId,
    /// Narrows the target when a box has several actions in the round.
    #[serde(default)]
    pub action_type: Option<ActionType>,
    pub score: f64,
    /// Overwrite a score that is already set.
    #[serde(default)]
    pub replace: bool,
}

impl ScoreUpdate {
    pub fn new(round: Round, game_box_id: GameBoxId, score: f64) -> Self {
        Self {
            round,
            game_box_id,
            action_type: None,
            score,
            replace: false,
        }
    }

    pub fn of_type(mut self, action_type: ActionType) -> Self {
        self.action_type = Some(action_type);
        self
    }

    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOutcome {
    Written,
    /// The target already had a score and `replace` was not requested.
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(action_type: ActionType) -> Action {
        Action {
            id: 1,
            created_at_ms: 10,
            updated_at_ms: 10,
            deleted_at_ms: None,
            action_type,
            team_id: TeamId(2),
            challenge_id: ChallengeId(3),
            game_box_id: GameBoxId(4),
            attacker_team_id: TeamId(5),
            round: Round(6),
            score: 0.0,
        }
    }

    #[test]
    fn check_down_drops_attacker() {
        let request = CreateAction::new(ActionType::CheckDown, GameBoxId(1), TeamId(7), Round(3));
        assert_eq!(request.normalized().attacker_team_id, TeamId::NONE);

        let attack = CreateAction::new(ActionType::Attack, GameBoxId(1), TeamId(7), Round(3));
        assert_eq!(attack.normalized().attacker_team_id, TeamId(7));
    }

    #[test]
    fn action_type_parses_display_names() {
        for action_type in ActionType::ALL {
            assert_eq!(action_type.to_string().parse::<ActionType>(), Ok(action_type));
        }
        assert_eq!("check-down".parse::<ActionType>(), Ok(ActionType::CheckDown));
        assert!(matches!(
            "flag".parse::<ActionType>(),
            Err(TypeError::InvalidActionType(_))
        ));
    }

    #[test]
    fn action_type_rejects_unknown_discriminant() {
        assert_eq!(ActionType::try_from(4i64), Err(TypeError::UnknownActionType(4)));
        assert_eq!(ActionType::try_from(-1i64), Err(TypeError::UnknownActionType(-1)));
    }

    #[test]
    fn action_type_serializes_snake_case() {
        let json = serde_json::to_string(&ActionType::ServiceOnline).unwrap();
        assert_eq!(json, "\"service_online\"");
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = ActionFilter::default();
        assert!(filter.is_unconstrained());
        for action_type in ActionType::ALL {
            assert!(filter.matches(&sample(action_type)));
        }
    }

    #[test]
    fn zero_identifiers_are_unconstrained() {
        let filter = ActionFilter::default()
            .team(TeamId(0))
            .game_box(GameBoxId(0))
            .round(Round(0));
        assert!(filter.is_unconstrained());
        assert!(filter.matches(&sample(ActionType::Attack)));
    }

    #[test]
    fn filter_constrains_every_column() {
        let action = sample(ActionType::Attack);
        assert!(ActionFilter::default()
            .action_type(ActionType::Attack)
            .team(TeamId(2))
            .challenge(ChallengeId(3))
            .game_box(GameBoxId(4))
            .attacker(TeamId(5))
            .round(Round(6))
            .matches(&action));
        assert!(!ActionFilter::default()
            .action_type(ActionType::BeenAttacked)
            .matches(&action));
        assert!(!ActionFilter::default().attacker(TeamId(9)).matches(&action));
        assert!(!ActionFilter::default().round(Round(7)).matches(&action));
    }

    proptest! {
        #[test]
        fn discriminants_round_trip(value in 0i64..4) {
            let action_type = ActionType::try_from(value).unwrap();
            prop_assert_eq!(action_type.as_i64(), value);
        }

        #[test]
        fn key_ignores_score(score in -1000.0f64..1000.0) {
            let mut action = sample(ActionType::Attack);
            let key = action.key();
            action.score = score;
            prop_assert_eq!(action.key(), key);
        }
    }
}
