//! The engine error taxonomy.
//!
//! Every failure a command can surface, with the context the transport needs
//! to map it to a status code. Errors never leave partial state behind: the
//! transaction that produced one rolls back wholesale.

use thiserror::Error;

use crate::ids::{BattleId, GameId, ItemId, PlayerId, TileId, TurnId};
use crate::position::FieldPlace;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // --- validation ---
    #[error("invalid request: {0}")]
    Validation(String),

    // --- state ---
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("game {0} is already finished")]
    GameAlreadyFinished(GameId),
    #[error("game already has the maximum number of players")]
    GameAlreadyFull,
    #[error("game is not accepting this operation in its current status")]
    GameNotPreparing,
    #[error("cannot start a game with no players")]
    NoPlayers,
    #[error("turn {0} has already ended")]
    TurnAlreadyEnded(TurnId),
    #[error("action not allowed at this point of the turn: {0}")]
    InvalidTurnAction(String),
    #[error("a picked tile must be placed before the turn can end")]
    UnplacedTile,
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error("turn {0} not found")]
    TurnNotFound(TurnId),
    #[error("battle {0} not found")]
    BattleNotFound(BattleId),
    #[error("tile {0} not found")]
    TileNotFound(TileId),
    #[error("no item at {0}")]
    ItemNotFound(FieldPlace),
    #[error("item {0} is not in the inventory")]
    ItemNotInInventory(ItemId),

    // --- authorization ---
    #[error("it is not this player's turn")]
    NotYourTurn,

    // --- movement ---
    #[error("cannot move from {from} to {to}")]
    InvalidMovement { from: FieldPlace, to: FieldPlace },
    #[error("cannot move again after battling this turn")]
    CannotMoveAfterBattle,
    #[error("a stunned player may only move onto an undefeated monster")]
    PlayerStunnedCanOnlyMoveToMonsters,

    // --- tile placement ---
    #[error("no rotation puts the requested side on top with the required side open")]
    NoRotationSatisfies,
    #[error("{0} is not an available placement position")]
    InvalidPlacement(FieldPlace),

    // --- draw piles ---
    #[error("no tiles left in the deck")]
    NoTilesLeftInDeck,
    #[error("no items left in the bag")]
    NoItemsLeftInBag,

    // --- concurrency / infrastructure ---
    #[error("concurrent modification of {aggregate}; retry the command")]
    OptimisticLock { aggregate: &'static str },
    #[error("command deadline exceeded")]
    DeadlineExceeded,
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::GameNotFound(_) => "game_not_found",
            Self::GameAlreadyFinished(_) => "game_already_finished",
            Self::GameAlreadyFull => "game_already_full",
            Self::GameNotPreparing => "game_not_preparing",
            Self::NoPlayers => "no_players",
            Self::TurnAlreadyEnded(_) => "turn_already_ended",
            Self::InvalidTurnAction(_) => "invalid_turn_action",
            Self::UnplacedTile => "unplaced_tile",
            Self::PlayerNotFound(_) => "player_not_found",
            Self::TurnNotFound(_) => "turn_not_found",
            Self::BattleNotFound(_) => "battle_not_found",
            Self::TileNotFound(_) => "tile_not_found",
            Self::ItemNotFound(_) => "item_not_found",
            Self::ItemNotInInventory(_) => "item_not_in_inventory",
            Self::NotYourTurn => "not_your_turn",
            Self::InvalidMovement { .. } => "invalid_movement",
            Self::CannotMoveAfterBattle => "cannot_move_after_battle",
            Self::PlayerStunnedCanOnlyMoveToMonsters => "player_stunned",
            Self::NoRotationSatisfies => "no_rotation_satisfies",
            Self::InvalidPlacement(_) => "invalid_placement",
            Self::NoTilesLeftInDeck => "no_tiles_left_in_deck",
            Self::NoItemsLeftInBag => "no_items_left_in_bag",
            Self::OptimisticLock { .. } => "optimistic_lock",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal(_) => "internal",
        }
    }

    /// The caller may retry the same command verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OptimisticLock { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lock_conflicts_retry() {
        assert!(EngineError::OptimisticLock { aggregate: "game" }.is_retryable());
        assert!(!EngineError::NotYourTurn.is_retryable());
        assert!(!EngineError::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::UnplacedTile.code(), "unplaced_tile");
        assert_eq!(
            EngineError::GameNotFound(GameId::generate()).code(),
            "game_not_found"
        );
    }

    #[test]
    fn display_carries_context() {
        let err = EngineError::InvalidMovement {
            from: FieldPlace::new(0, 0),
            to: FieldPlace::new(4, 4),
        };
        let text = err.to_string();
        assert!(text.contains("(0,0)"));
        assert!(text.contains("(4,4)"));
    }
}
