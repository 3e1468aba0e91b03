//! Movement — positions, the connectivity graph, move validation.
//!
//! Edges exist where two placed tiles open onto each other; teleportation
//! gates form an additional clique. `handle_move_player` is the single
//! source of truth for move legality, with the checks in protocol order.

use tracing::debug;

use delve_types::error::EngineError;
use delve_types::messages::{Command, CommandKind, CommandReply, Event, EventEnvelope, EventKind};
use delve_types::position::{FieldPlace, Side};
use delve_types::state::{ActionDetail, Movement, TurnAction, MAX_HP};
use delve_types::tile::TileFeature;

use crate::bus::{MessageBus, TxContext};
use crate::turn;

pub fn register(bus: &mut MessageBus) {
    bus.register_command(CommandKind::MovePlayer, handle_move_player);
    bus.register_command(CommandKind::ResetPlayerPosition, handle_reset_player_position);
    bus.register_event(EventKind::GameCreated, on_game_created);
    bus.register_event(EventKind::TilePlaced, on_tile_placed);
    bus.register_event(EventKind::BattleCompleted, on_battle_completed);
}

// =============================================================================
// Graph upkeep
// =============================================================================

fn on_game_created(ctx: &mut TxContext<'_>, envelope: &EventEnvelope) -> Result<(), EngineError> {
    let Event::GameCreated { game_id, .. } = envelope.event else {
        return Ok(());
    };
    ctx.tx.put_movement(game_id, Movement::new(game_id));
    Ok(())
}

fn add_edge(movement: &mut Movement, a: FieldPlace, b: FieldPlace) {
    let forward = movement.edges.entry(a.key()).or_default();
    if !forward.contains(&b) {
        forward.push(b);
    }
    let backward = movement.edges.entry(b.key()).or_default();
    if !backward.contains(&a) {
        backward.push(a);
    }
}

fn on_tile_placed(ctx: &mut TxContext<'_>, envelope: &EventEnvelope) -> Result<(), EngineError> {
    let Event::TilePlaced {
        game_id, position, ..
    } = envelope.event
    else {
        return Ok(());
    };

    // Collect the open edges and gate flag from the field first; the two
    // aggregates are mutated strictly in sequence.
    let (new_edges, is_gate) = {
        let field = ctx.tx.field(game_id)?;
        let placed = field
            .tile_at(position)
            .ok_or_else(|| EngineError::Internal(format!("no tile at {position}")))?;
        let mut new_edges = Vec::new();
        for side in Side::ALL {
            if !placed.tile.orientation.is_open(side) {
                continue;
            }
            let neighbor = position.neighbor(side);
            if let Some(other) = field.tile_at(neighbor) {
                if other.tile.orientation.is_open(side.opposite()) {
                    new_edges.push(neighbor);
                }
            }
        }
        (
            new_edges,
            placed.tile.has_feature(TileFeature::TeleportationGate),
        )
    };

    let movement = ctx.tx.movement(game_id)?;
    for neighbor in new_edges {
        add_edge(movement, position, neighbor);
    }
    if is_gate && !movement.teleport_gates.contains(&position) {
        movement.teleport_gates.push(position);
    }
    Ok(())
}

fn on_battle_completed(
    ctx: &mut TxContext<'_>,
    envelope: &EventEnvelope,
) -> Result<(), EngineError> {
    let Event::BattleCompleted {
        game_id,
        battle_id,
        player_id,
        ..
    } = envelope.event
    else {
        return Ok(());
    };
    // A battle this turn locks the player in place until the turn closes.
    let turn_id = ctx.tx.battle(battle_id)?.turn_id;
    ctx.tx
        .movement(game_id)?
        .post_battle_locks
        .insert(player_id, turn_id);
    Ok(())
}

// =============================================================================
// Moves
// =============================================================================

fn handle_move_player(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::MovePlayer {
        game_id,
        player_id,
        turn_id,
        from,
        to,
        ignore_monster,
        is_tile_placement_move,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    // 1. It must be the caller's turn.
    turn::require_active_turn(ctx, game_id, player_id, turn_id)?;

    // 2. One battle per turn ends all movement, except the scripted return.
    {
        let movement = ctx.tx.movement(game_id)?;
        if movement.post_battle_locks.get(&player_id) == Some(&turn_id) && !ignore_monster {
            return Err(EngineError::CannotMoveAfterBattle);
        }
    }
    {
        let current = ctx.tx.turn(turn_id)?;
        if !turn::allows_next(current, TurnAction::Move) {
            return Err(EngineError::InvalidTurnAction("cannot move now".into()));
        }
    }

    // 3+4. The origin must be right and an edge must exist.
    {
        let movement = ctx.tx.movement(game_id)?;
        if movement.position_of(player_id) != Some(from) {
            return Err(EngineError::InvalidMovement { from, to });
        }
        if !movement.is_connected(from, to) {
            return Err(EngineError::InvalidMovement { from, to });
        }
    }

    let target_guarded = ctx
        .tx
        .field(game_id)?
        .item_at(to)
        .is_some_and(|item| item.has_live_guard());

    // 5. A stunned player may only hunt.
    if ctx.tx.player(player_id)?.hp == 0 && !target_guarded {
        return Err(EngineError::PlayerStunnedCanOnlyMoveToMonsters);
    }

    // After a pickup the turn may continue, but not into another fight.
    if target_guarded
        && !ignore_monster
        && ctx.tx.turn(turn_id)?.last_action() == Some(TurnAction::PickItem)
    {
        return Err(EngineError::InvalidTurnAction(
            "cannot start a battle after picking up an item".into(),
        ));
    }

    ctx.tx.movement(game_id)?.positions.insert(player_id, to);
    debug!(%player_id, %from, %to, "player moved");
    ctx.emit(Event::PlayerMoved {
        game_id,
        player_id,
        from,
        to,
        is_battle_return: false,
        is_tile_placement_move,
    })?;

    if target_guarded && !ignore_monster {
        // Stepping onto a live monster is the fight, not a MOVE action.
        ctx.dispatch(Command::StartBattle {
            game_id,
            player_id,
            turn_id,
            from,
            to,
        })?;
        let field = ctx.tx.field(game_id)?;
        return Ok(CommandReply::Moved {
            battle: field.last_battle.clone(),
            item: field.item_at(to).cloned(),
        });
    }

    let entered_fountain = ctx
        .tx
        .field(game_id)?
        .tile_at(to)
        .is_some_and(|placed| placed.tile.has_feature(TileFeature::HealingFountain));

    if entered_fountain {
        {
            let player = ctx.tx.player(player_id)?;
            player.hp = MAX_HP;
            player.defeated = false;
        }
        // Heals to full and closes the turn.
        turn::record_action(
            ctx,
            game_id,
            turn_id,
            TurnAction::HealAtFountain,
            None,
            Some(ActionDetail::Move { from, to }),
        )?;
    } else {
        turn::record_action(
            ctx,
            game_id,
            turn_id,
            TurnAction::Move,
            None,
            Some(ActionDetail::Move { from, to }),
        )?;
    }

    let item = ctx.tx.field(game_id)?.item_at(to).cloned();
    Ok(CommandReply::Moved { battle: None, item })
}

/// Scripted relocation after a drawn or lost battle. Skips move validation;
/// the HP reduction has already landed, so a fountain on the way back heals
/// a wounded player.
fn handle_reset_player_position(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::ResetPlayerPosition {
        game_id,
        player_id,
        to,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let from = {
        let movement = ctx.tx.movement(game_id)?;
        let from = movement
            .position_of(player_id)
            .ok_or(EngineError::PlayerNotFound(player_id))?;
        movement.positions.insert(player_id, to);
        from
    };

    let entered_fountain = ctx
        .tx
        .field(game_id)?
        .tile_at(to)
        .is_some_and(|placed| placed.tile.has_feature(TileFeature::HealingFountain));
    if entered_fountain {
        let player = ctx.tx.player(player_id)?;
        player.hp = MAX_HP;
        player.defeated = false;
    }

    ctx.emit(Event::PlayerMoved {
        game_id,
        player_id,
        from,
        to,
        is_battle_return: true,
        is_tile_placement_move: false,
    })?;
    Ok(CommandReply::Done)
}
