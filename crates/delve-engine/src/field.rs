//! The field — tile placement, the frontier, room items, features, dice.
//!
//! Tile placement is a three-step protocol owned by the turn holder:
//! `PickTile` draws a template from the deck, `RotateTile` turns the mask
//! until it satisfies the request, `PlaceTile` freezes it onto the grid. A
//! placed room immediately draws its content from the bag. Mismatched edges
//! against other neighbors simply become walls; the placement only needs one
//! real opening into the dungeon.

use rand::Rng;

use delve_types::error::EngineError;
use delve_types::messages::{Command, CommandKind, CommandReply, Event, EventEnvelope, EventKind};
use delve_types::position::{FieldPlace, Side};
use delve_types::state::{Field, PlacedTile, TurnAction, MAX_ACTIONS_PER_TURN};
use delve_types::tile::{Tile, TileFeature};

use crate::bus::{MessageBus, TxContext};
use crate::{bag, deck, turn};

pub fn register(bus: &mut MessageBus) {
    bus.register_command(CommandKind::PickTile, handle_pick_tile);
    bus.register_command(CommandKind::RotateTile, handle_rotate_tile);
    bus.register_command(CommandKind::PlaceTile, handle_place_tile);
    bus.register_event(EventKind::GameCreated, on_game_created);
}

// =============================================================================
// Dice source
// =============================================================================

/// Roll a die in `[min, max]`: deterministic list (cyclic) when installed,
/// otherwise the field's persisted PRNG.
pub(crate) fn next_dice_roll(field: &mut Field, min: u32, max: u32) -> u32 {
    if field.dice_overrides.is_empty() {
        field.rng.gen_range(min..=max)
    } else {
        let value = field.dice_overrides[field.dice_cursor % field.dice_overrides.len()];
        field.dice_cursor += 1;
        value.clamp(min, max)
    }
}

// =============================================================================
// Grid geometry
// =============================================================================

/// Freeze a tile onto the grid and recompute the placement frontier.
fn freeze_tile(field: &mut Field, tile: Tile, place: FieldPlace) {
    if tile.has_feature(TileFeature::TeleportationGate) {
        field.teleport_gates.push(place);
    }
    field.tiles.insert(place.key(), PlacedTile { place, tile });
    recompute_available_places(field);
}

/// The frontier: every empty cell adjacent to a placed tile through one of
/// its open sides.
fn recompute_available_places(field: &mut Field) {
    let mut frontier = std::collections::BTreeSet::new();
    for placed in field.tiles.values() {
        for side in Side::ALL {
            if placed.tile.orientation.is_open(side) {
                let neighbor = placed.place.neighbor(side);
                if !field.tiles.contains_key(&neighbor.key()) {
                    frontier.insert(neighbor);
                }
            }
        }
    }
    field.available_places = frontier.into_iter().collect();
}

/// Does the tile, as rotated, open onto at least one already-placed
/// neighbor that opens back? Mismatched edges against other neighbors are
/// walls, which is allowed.
fn connects_to_dungeon(field: &Field, tile: &Tile, place: FieldPlace) -> bool {
    Side::ALL.iter().any(|&side| {
        tile.orientation.is_open(side)
            && field
                .tile_at(place.neighbor(side))
                .is_some_and(|neighbor| neighbor.tile.orientation.is_open(side.opposite()))
    })
}

// =============================================================================
// Startup — place the starting tile
// =============================================================================

fn on_game_created(ctx: &mut TxContext<'_>, envelope: &EventEnvelope) -> Result<(), EngineError> {
    let Event::GameCreated { game_id, .. } = envelope.event else {
        return Ok(());
    };

    let dice_overrides = ctx
        .tx
        .overrides
        .as_ref()
        .map(|o| o.dice_rolls.clone())
        .unwrap_or_default();
    let seed = ctx.tx.next_seed();

    let template = deck::pick_next(ctx.tx.deck(game_id)?)?;
    let tile = template.into_tile();
    let tile_id = tile.id;

    let mut field = Field::new(game_id, seed, dice_overrides);
    freeze_tile(&mut field, tile, FieldPlace::ZERO);
    ctx.tx.put_field(game_id, field);

    ctx.emit(Event::TilePlaced {
        game_id,
        tile_id,
        position: FieldPlace::ZERO,
    })?;
    Ok(())
}

// =============================================================================
// Tile placement protocol
// =============================================================================

fn handle_pick_tile(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::PickTile {
        game_id,
        player_id,
        turn_id,
        tile_id,
        required_open_side: _,
        field_place,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    turn::require_active_turn(ctx, game_id, player_id, turn_id)?;
    {
        let current = ctx.tx.turn(turn_id)?;
        if !turn::allows_next(current, TurnAction::PickTile) {
            return Err(EngineError::InvalidTurnAction(
                "cannot pick a tile now".into(),
            ));
        }
        if current.picked_tile.is_some() {
            return Err(EngineError::InvalidTurnAction(
                "a picked tile is already awaiting placement".into(),
            ));
        }
        // Exploration takes the pick plus the placement move.
        if current.performed_actions_count + 2 > MAX_ACTIONS_PER_TURN {
            return Err(EngineError::InvalidTurnAction(
                "not enough actions left to explore".into(),
            ));
        }
    }

    if !ctx.tx.field(game_id)?.is_available(field_place) {
        return Err(EngineError::InvalidPlacement(field_place));
    }

    let template = deck::pick_next(ctx.tx.deck(game_id)?)?;
    let mut tile = template.into_tile();
    if let Some(supplied) = tile_id {
        tile.id = supplied;
    }
    ctx.tx.field(game_id)?.picked_tile = Some(tile.clone());
    ctx.tx.turn(turn_id)?.picked_tile = Some(tile.id);

    turn::record_action(
        ctx,
        game_id,
        turn_id,
        TurnAction::PickTile,
        Some(tile.id),
        None,
    )?;
    Ok(CommandReply::TilePicked { tile })
}

fn handle_rotate_tile(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::RotateTile {
        game_id,
        player_id,
        turn_id,
        tile_id,
        top_side,
        required_open_side,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    turn::require_active_turn(ctx, game_id, player_id, turn_id)?;

    let tile = {
        let field = ctx.tx.field(game_id)?;
        let picked = field
            .picked_tile
            .as_mut()
            .filter(|t| t.id == tile_id)
            .ok_or(EngineError::TileNotFound(tile_id))?;

        // Bring the requested side around to TOP, then check the demand.
        let steps = (4 - top_side.index()) % 4;
        let rotated = picked.orientation.rotated(steps);
        if !rotated.is_open(required_open_side) {
            return Err(EngineError::NoRotationSatisfies);
        }
        picked.orientation = rotated;
        picked.clone()
    };

    turn::record_action(
        ctx,
        game_id,
        turn_id,
        TurnAction::RotateTile,
        Some(tile_id),
        None,
    )?;
    Ok(CommandReply::TileRotated { tile })
}

fn handle_place_tile(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::PlaceTile {
        game_id,
        player_id,
        turn_id,
        tile_id,
        field_place,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    turn::require_active_turn(ctx, game_id, player_id, turn_id)?;

    let tile = {
        let field = ctx.tx.field(game_id)?;
        let picked = field
            .picked_tile
            .as_ref()
            .filter(|t| t.id == tile_id)
            .cloned()
            .ok_or(EngineError::TileNotFound(tile_id))?;
        if !field.is_available(field_place) {
            return Err(EngineError::InvalidPlacement(field_place));
        }
        if !connects_to_dungeon(field, &picked, field_place) {
            return Err(EngineError::InvalidPlacement(field_place));
        }
        picked
    };

    // Rooms draw their content before the tile freezes, so a drained bag
    // rolls the whole placement back.
    let item = if tile.room {
        Some(bag::pick_next(ctx.tx.bag(game_id)?)?)
    } else {
        None
    };

    {
        let field = ctx.tx.field(game_id)?;
        if let Some(ref item) = item {
            field.items.insert(field_place.key(), item.clone());
        }
        field.picked_tile = None;
        freeze_tile(field, tile.clone(), field_place);
    }
    ctx.tx.turn(turn_id)?.picked_tile = None;

    turn::record_action(
        ctx,
        game_id,
        turn_id,
        TurnAction::PlaceTile,
        Some(tile_id),
        None,
    )?;
    ctx.emit(Event::TilePlaced {
        game_id,
        tile_id,
        position: field_place,
    })?;

    let available_places = ctx.tx.field(game_id)?.available_places.clone();
    Ok(CommandReply::TilePlaced {
        tile,
        available_places,
        item,
    })
}
