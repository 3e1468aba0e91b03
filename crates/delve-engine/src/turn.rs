//! Turn management — action log, budgets, legal-next rules, turn end.
//!
//! A turn holds an ordered action log. Only some actions consume one of the
//! four per-turn slots; a turn auto-ends when the slots run out, unless a
//! battle happened this turn (the client must be able to present the battle
//! result before the next turn starts) or a picked tile still awaits
//! placement.

use tracing::debug;

use delve_types::error::EngineError;
use delve_types::ids::{GameId, PlayerId, TileId, TurnId};
use delve_types::messages::{Command, CommandKind, CommandReply, Event};
use delve_types::state::{
    ActionDetail, GameStatus, Turn, TurnAction, TurnActionEntry, MAX_ACTIONS_PER_TURN,
};

use crate::bus::{MessageBus, TxContext};

pub fn register(bus: &mut MessageBus) {
    bus.register_command(CommandKind::StartTurn, handle_start_turn);
    bus.register_command(CommandKind::EndTurn, handle_end_turn);
}

// =============================================================================
// Preconditions
// =============================================================================

/// Shared precondition for every in-turn command: the game has an open turn,
/// it belongs to the caller, and the supplied turn id is the current one.
pub(crate) fn require_active_turn(
    ctx: &mut TxContext<'_>,
    game_id: GameId,
    player_id: PlayerId,
    turn_id: TurnId,
) -> Result<(), EngineError> {
    let game = ctx.tx.game(game_id)?;
    if game.status != GameStatus::TurnInProgress {
        return Err(EngineError::InvalidTurnAction(
            "no turn is in progress".into(),
        ));
    }
    if game.current_player_id != Some(player_id) {
        return Err(EngineError::NotYourTurn);
    }
    if game.current_turn_id != Some(turn_id) {
        return Err(EngineError::InvalidTurnAction(
            "the supplied turn is not the current one".into(),
        ));
    }
    let turn = ctx.tx.turn(turn_id)?;
    if turn.is_ended() {
        return Err(EngineError::TurnAlreadyEnded(turn_id));
    }
    Ok(())
}

/// The legal-next-action table.
pub(crate) fn allows_next(turn: &Turn, action: TurnAction) -> bool {
    if turn.is_ended() {
        return false;
    }
    match turn.last_action() {
        None => true,
        Some(
            TurnAction::Move
            | TurnAction::PickTile
            | TurnAction::RotateTile
            | TurnAction::PlaceTile
            | TurnAction::UseSpell,
        ) => true,
        Some(TurnAction::FightMonster) => {
            matches!(action, TurnAction::PickItem | TurnAction::EndTurn)
        }
        // After a pickup anything non-combat goes; the combat restriction
        // (no move onto a live monster) is enforced by the movement handler.
        Some(TurnAction::PickItem) => true,
        Some(TurnAction::HealAtFountain | TurnAction::TeleportSpell | TurnAction::EndTurn) => false,
    }
}

// =============================================================================
// Action recording
// =============================================================================

/// Append an entry to the turn log, bump the counted budget, and apply the
/// end-of-turn and auto-end rules.
pub(crate) fn record_action(
    ctx: &mut TxContext<'_>,
    game_id: GameId,
    turn_id: TurnId,
    action: TurnAction,
    tile_id: Option<TileId>,
    detail: Option<ActionDetail>,
) -> Result<(), EngineError> {
    let at = ctx.tx.now;
    let player_id = {
        let turn = ctx.tx.turn(turn_id)?;
        turn.actions.push(TurnActionEntry {
            action,
            tile_id,
            detail,
            at,
        });
        if action.counted() {
            turn.performed_actions_count += 1;
        }
        turn.player_id
    };

    if action.ends_turn() && action != TurnAction::EndTurn {
        ctx.dispatch(Command::EndTurn {
            game_id,
            player_id,
            turn_id,
        })?;
        return Ok(());
    }

    maybe_auto_end(ctx, game_id, turn_id)
}

/// Auto-end once the counted budget is spent — unless a battle happened this
/// turn or a picked tile still awaits its placement move.
pub(crate) fn maybe_auto_end(
    ctx: &mut TxContext<'_>,
    game_id: GameId,
    turn_id: TurnId,
) -> Result<(), EngineError> {
    if ctx.tx.game(game_id)?.is_finished() {
        return Ok(());
    }
    let (should_end, player_id) = {
        let turn = ctx.tx.turn(turn_id)?;
        (
            !turn.is_ended()
                && turn.performed_actions_count >= MAX_ACTIONS_PER_TURN
                && !turn.has_battle_in_turn()
                && turn.picked_tile.is_none(),
            turn.player_id,
        )
    };
    if should_end {
        debug!(%turn_id, "action budget spent; auto-ending turn");
        ctx.dispatch(Command::EndTurn {
            game_id,
            player_id,
            turn_id,
        })?;
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

fn handle_start_turn(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::StartTurn { game_id, player_id } = *command else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let now = ctx.tx.now;
    let turn = {
        let game = ctx.tx.game(game_id)?;
        if game.player_index(player_id).is_none() {
            return Err(EngineError::PlayerNotFound(player_id));
        }
        let turn = Turn::new(
            TurnId::generate(),
            game_id,
            player_id,
            game.current_turn_number + 1,
            now,
        );
        game.current_player_id = Some(player_id);
        game.current_turn_id = Some(turn.id);
        game.current_turn_number += 1;
        game.turn_ids.push(turn.id);
        game.status = GameStatus::TurnInProgress;
        turn
    };
    let turn_id = turn.id;
    let number = turn.number;
    ctx.tx.put_turn(turn_id, turn);

    ctx.emit(Event::TurnStarted {
        game_id,
        player_id,
        turn_id,
        number,
    })?;
    Ok(CommandReply::Done)
}

fn handle_end_turn(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::EndTurn {
        game_id,
        player_id,
        turn_id,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    // End-of-life no-op so racing clients and post-victory cleanup succeed.
    if ctx.tx.game(game_id)?.is_finished() {
        return Ok(CommandReply::TurnEnded { success: true });
    }

    require_active_turn(ctx, game_id, player_id, turn_id)?;

    let now = ctx.tx.now;
    {
        let turn = ctx.tx.turn(turn_id)?;
        if turn.picked_tile.is_some() {
            return Err(EngineError::UnplacedTile);
        }
        turn.actions.push(TurnActionEntry {
            action: TurnAction::EndTurn,
            tile_id: None,
            detail: None,
            at: now,
        });
        turn.end_time = Some(now);
    }

    ctx.emit(Event::TurnEnded {
        game_id,
        player_id,
        turn_id,
    })?;
    Ok(CommandReply::TurnEnded { success: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_types::state::Timestamp;

    fn turn_with(actions: &[TurnAction]) -> Turn {
        let mut turn = Turn::new(
            TurnId::generate(),
            GameId::generate(),
            PlayerId::generate(),
            1,
            0 as Timestamp,
        );
        for &action in actions {
            turn.actions.push(TurnActionEntry {
                action,
                tile_id: None,
                detail: None,
                at: 0,
            });
            if action.counted() {
                turn.performed_actions_count += 1;
            }
        }
        turn
    }

    #[test]
    fn anything_goes_on_a_fresh_turn() {
        let turn = turn_with(&[]);
        for action in [
            TurnAction::Move,
            TurnAction::PickTile,
            TurnAction::PickItem,
            TurnAction::UseSpell,
            TurnAction::EndTurn,
        ] {
            assert!(allows_next(&turn, action));
        }
    }

    #[test]
    fn after_a_battle_only_pickup_or_end() {
        let turn = turn_with(&[TurnAction::Move, TurnAction::FightMonster]);
        assert!(allows_next(&turn, TurnAction::PickItem));
        assert!(allows_next(&turn, TurnAction::EndTurn));
        assert!(!allows_next(&turn, TurnAction::Move));
        assert!(!allows_next(&turn, TurnAction::PickTile));
        assert!(!allows_next(&turn, TurnAction::UseSpell));
    }

    #[test]
    fn an_ended_turn_allows_nothing() {
        let mut turn = turn_with(&[TurnAction::Move]);
        turn.end_time = Some(1);
        assert!(!allows_next(&turn, TurnAction::Move));
        assert!(!allows_next(&turn, TurnAction::EndTurn));
    }

    #[test]
    fn battle_flag_detection() {
        assert!(!turn_with(&[TurnAction::Move]).has_battle_in_turn());
        assert!(turn_with(&[TurnAction::Move, TurnAction::FightMonster]).has_battle_in_turn());
    }
}
