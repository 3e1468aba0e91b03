//! Player actions — picking items, casting spells, taking damage.
//!
//! Pick-item refusals that need client context (inventory full, missing
//! key) are tagged outcomes, not errors: the command succeeds without
//! mutating anything and the transport renders the variant.

use tracing::{debug, info};

use delve_types::error::EngineError;
use delve_types::item::ItemType;
use delve_types::messages::{Command, CommandKind, CommandReply, Event, PickItemOutcome};
use delve_types::state::{ActionDetail, Inventory, TurnAction, MAX_HP};
use delve_types::tile::TileFeature;

use crate::bus::{MessageBus, TxContext};
use crate::turn;

pub fn register(bus: &mut MessageBus) {
    bus.register_command(CommandKind::PickItem, handle_pick_item);
    bus.register_command(CommandKind::UseSpell, handle_use_spell);
    bus.register_command(CommandKind::ReducePlayerHp, handle_reduce_player_hp);
}

// =============================================================================
// Pick item
// =============================================================================

fn handle_pick_item(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::PickItem {
        game_id,
        player_id,
        turn_id,
        position,
        item_id_to_replace,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    turn::require_active_turn(ctx, game_id, player_id, turn_id)?;
    {
        let current = ctx.tx.turn(turn_id)?;
        if !turn::allows_next(current, TurnAction::PickItem) {
            return Err(EngineError::InvalidTurnAction(
                "cannot pick up an item now".into(),
            ));
        }
    }

    if ctx.tx.movement(game_id)?.position_of(player_id) != Some(position) {
        return Err(EngineError::Validation(
            "the player is not standing on that position".into(),
        ));
    }

    let item = ctx
        .tx
        .field(game_id)?
        .item_at(position)
        .cloned()
        .ok_or(EngineError::ItemNotFound(position))?;
    if item.has_live_guard() {
        return Err(EngineError::Validation(
            "the item is still guarded by an undefeated monster".into(),
        ));
    }

    // Chests stay shut without a key. No state change; the client prompts.
    if item.item_type.requires_key() && !ctx.tx.player(player_id)?.inventory.has_key() {
        return Ok(CommandReply::ItemPick(PickItemOutcome::MissingKey {
            chest_type: item.item_type,
        }));
    }

    let category = item.category();
    let replaced = match item_id_to_replace {
        None => {
            let inventory = &ctx.tx.player(player_id)?.inventory;
            if inventory.is_full(category) {
                // No state change; the client picks a replacement and retries.
                return Ok(CommandReply::ItemPick(PickItemOutcome::InventoryFull {
                    category,
                    cap: Inventory::cap_of(category).unwrap_or(usize::MAX),
                    items: inventory.slots_of(category).to_vec(),
                    candidate: item,
                }));
            }
            None
        }
        Some(replace_id) => {
            let existing = ctx
                .tx
                .player(player_id)?
                .inventory
                .find(replace_id)
                .cloned()
                .ok_or(EngineError::ItemNotInInventory(replace_id))?;
            if existing.category() != category {
                return Err(EngineError::Validation(
                    "the replaced item is in a different inventory slot".into(),
                ));
            }
            ctx.tx.player(player_id)?.inventory.remove(replace_id);
            Some(existing)
        }
    };

    // The pickup itself: item off the field, into the inventory, and the
    // replaced item (if any) dropped in its place as plain loot.
    {
        let field = ctx.tx.field(game_id)?;
        field.items.remove(&position.key());
        if let Some(ref dropped) = replaced {
            let mut dropped = dropped.clone();
            dropped.guard_hp = 0;
            dropped.guard_defeated = false;
            field.items.insert(position.key(), dropped);
        }
    }
    ctx.tx.player(player_id)?.inventory.insert(item.clone());
    info!(%player_id, item = ?item.item_type, "item picked up");

    ctx.emit(Event::ItemAddedToInventory {
        game_id,
        player_id,
        item: item.clone(),
    })?;
    turn::record_action(
        ctx,
        game_id,
        turn_id,
        TurnAction::PickItem,
        None,
        Some(ActionDetail::Item {
            item_id: item.id,
            position,
        }),
    )?;

    // Picking up a won battle's loot closes the turn; lifting unguarded
    // loot leaves it open.
    let closes_turn = {
        let turn = ctx.tx.turn(turn_id)?;
        turn.has_battle_in_turn() && !turn.is_ended()
    };
    if closes_turn {
        ctx.dispatch(Command::EndTurn {
            game_id,
            player_id,
            turn_id,
        })?;
    }

    Ok(CommandReply::ItemPick(PickItemOutcome::Picked {
        item,
        replaced,
    }))
}

// =============================================================================
// Spells
// =============================================================================

fn handle_use_spell(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::UseSpell {
        game_id,
        player_id,
        turn_id,
        spell_id,
        target_position,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    turn::require_active_turn(ctx, game_id, player_id, turn_id)?;
    {
        let current = ctx.tx.turn(turn_id)?;
        if !turn::allows_next(current, TurnAction::UseSpell) {
            return Err(EngineError::InvalidTurnAction(
                "cannot use a spell now".into(),
            ));
        }
    }

    let spell = ctx
        .tx
        .player(player_id)?
        .inventory
        .find(spell_id)
        .cloned()
        .ok_or(EngineError::ItemNotInInventory(spell_id))?;

    match spell.item_type {
        ItemType::Fireball => Err(EngineError::Validation(
            "fireballs are committed inside a battle, not cast directly".into(),
        )),
        ItemType::Teleport => {
            let target = target_position.ok_or_else(|| {
                EngineError::Validation("teleporting requires a target fountain".into())
            })?;
            let target_is_fountain = ctx
                .tx
                .field(game_id)?
                .tile_at(target)
                .is_some_and(|placed| placed.tile.has_feature(TileFeature::HealingFountain));
            if !target_is_fountain {
                return Err(EngineError::Validation(
                    "the teleport target is not a healing fountain".into(),
                ));
            }

            let from = ctx
                .tx
                .movement(game_id)?
                .position_of(player_id)
                .ok_or(EngineError::PlayerNotFound(player_id))?;
            ctx.tx
                .movement(game_id)?
                .positions
                .insert(player_id, target);
            {
                let player = ctx.tx.player(player_id)?;
                player.inventory.remove(spell_id);
                // Arriving at a fountain heals to full.
                player.hp = MAX_HP;
                player.defeated = false;
            }
            debug!(%player_id, %target, "teleported to fountain");

            ctx.emit(Event::PlayerMoved {
                game_id,
                player_id,
                from,
                to: target,
                is_battle_return: false,
                is_tile_placement_move: false,
            })?;
            // Counted, and ends the turn.
            turn::record_action(
                ctx,
                game_id,
                turn_id,
                TurnAction::TeleportSpell,
                None,
                Some(ActionDetail::Spell { item_id: spell_id }),
            )?;
            Ok(CommandReply::SpellUsed { game_id })
        }
        _ => Err(EngineError::Validation(format!(
            "item {spell_id} is not a usable spell"
        ))),
    }
}

// =============================================================================
// Damage
// =============================================================================

fn handle_reduce_player_hp(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::ReducePlayerHp {
        game_id,
        player_id,
        amount,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let newly_stunned = {
        let player = ctx.tx.player(player_id)?;
        let before = player.hp;
        player.hp = player.hp.saturating_sub(amount);
        if player.hp == 0 {
            player.defeated = true;
        }
        before > 0 && player.hp == 0
    };

    if newly_stunned {
        info!(%player_id, "player stunned");
        ctx.emit(Event::PlayerStunned { game_id, player_id })?;
    }
    Ok(CommandReply::Done)
}
