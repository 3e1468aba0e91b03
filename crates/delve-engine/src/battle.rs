//! Battles — the two-phase combat state machine.
//!
//! Phase 1 rolls two dice, adds equipped weapons, and previews the outcome.
//! An outright win resolves immediately; anything else pauses the game until
//! the client commits (or declines) consumables with `FinalizeBattle`. On a
//! loss the HP reduction lands strictly before the scripted return move, so
//! bouncing back onto a fountain heals a wounded player.

use tracing::{debug, info};

use delve_types::error::EngineError;
use delve_types::ids::{BattleId, ItemId};
use delve_types::item::Item;
use delve_types::messages::{
    Command, CommandKind, CommandReply, Event, PickItemOutcome,
};
use delve_types::state::{
    ActionDetail, Battle, BattleInfo, BattleResult, TurnAction, DIE_MAX, DIE_MIN,
};

use crate::bus::{MessageBus, TxContext};
use crate::{field, turn};

pub fn register(bus: &mut MessageBus) {
    bus.register_command(CommandKind::StartBattle, handle_start_battle);
    bus.register_command(CommandKind::FinalizeBattle, handle_finalize_battle);
}

/// Strictly more damage than the monster's HP wins; exactly matching it is a
/// draw.
fn outcome(total_damage: u32, monster_hp: u32) -> BattleResult {
    if total_damage > monster_hp {
        BattleResult::Win
    } else if total_damage == monster_hp {
        BattleResult::Draw
    } else {
        BattleResult::Lose
    }
}

/// Refresh the field's last-battle scratchpad from the battle aggregate.
fn update_last_battle(
    ctx: &mut TxContext<'_>,
    battle_id: BattleId,
    result: BattleResult,
    consumable_damage: u32,
    needs_consumable_confirmation: bool,
    available_consumables: Vec<Item>,
) -> Result<(), EngineError> {
    let battle = ctx.tx.battle(battle_id)?.clone();
    let info = BattleInfo {
        battle_id,
        player_id: battle.player_id,
        monster: battle.monster.name,
        monster_hp: battle.monster.guard_hp,
        dice: battle.dice,
        weapon_damage: battle.weapon_damage,
        consumable_damage,
        total_damage: battle.total_damage,
        result,
        from: battle.from,
        to: battle.to,
        needs_consumable_confirmation,
        available_consumables,
    };
    ctx.tx.field(battle.game_id)?.last_battle = Some(info);
    Ok(())
}

// =============================================================================
// Phase 1 — weapons-only preview
// =============================================================================

fn handle_start_battle(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::StartBattle {
        game_id,
        player_id,
        turn_id,
        from,
        to,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let monster = ctx
        .tx
        .field(game_id)?
        .item_at(to)
        .cloned()
        .ok_or(EngineError::ItemNotFound(to))?;
    if !monster.has_live_guard() {
        return Err(EngineError::Internal(
            "battle started without a live guard".into(),
        ));
    }

    let (d1, d2) = {
        let f = ctx.tx.field(game_id)?;
        (
            field::next_dice_roll(f, DIE_MIN, DIE_MAX),
            field::next_dice_roll(f, DIE_MIN, DIE_MAX),
        )
    };
    let weapon_damage = ctx.tx.player(player_id)?.inventory.weapon_damage();
    let total_damage = d1 + d2 + weapon_damage;
    let result = outcome(total_damage, monster.guard_hp);
    debug!(%player_id, dice = ?(d1, d2), weapon_damage, total_damage, ?result, "battle preview");

    let battle_id = BattleId::generate();
    let battle = Battle {
        id: battle_id,
        game_id,
        player_id,
        turn_id,
        version: 0,
        monster,
        from,
        to,
        dice: [d1, d2],
        weapon_damage,
        used_items: Vec::new(),
        total_damage,
        preview_result: result,
        completed: result == BattleResult::Win,
    };
    ctx.tx.put_battle(battle_id, battle);

    if result == BattleResult::Win {
        update_last_battle(ctx, battle_id, result, 0, false, Vec::new())?;
        ctx.emit(Event::BattleCompleted {
            game_id,
            battle_id,
            player_id,
            result,
            total_damage,
            needs_consumable_confirmation: false,
            available_consumables: Vec::new(),
        })?;
        process_result(ctx, battle_id, result, false, None)?;
    } else {
        // Pause for the consumable decision; every other command on this
        // game is rejected until FinalizeBattle arrives.
        let available: Vec<Item> = ctx
            .tx
            .player(player_id)?
            .inventory
            .spells
            .iter()
            .filter(|item| item.is_battle_consumable())
            .cloned()
            .collect();
        ctx.tx.game(game_id)?.pending_battle = Some(battle_id);
        update_last_battle(ctx, battle_id, result, 0, true, available.clone())?;
        ctx.emit(Event::BattleCompleted {
            game_id,
            battle_id,
            player_id,
            result,
            total_damage,
            needs_consumable_confirmation: true,
            available_consumables: available,
        })?;
    }
    Ok(CommandReply::Done)
}

// =============================================================================
// Phase 2 — consumable commit
// =============================================================================

fn handle_finalize_battle(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::FinalizeBattle {
        battle_id,
        game_id,
        player_id,
        turn_id,
        selected_consumable_ids,
        pickup_item,
        replace_item_id,
    } = command.clone()
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    {
        let battle = ctx.tx.battle(battle_id)?;
        if battle.completed {
            // Racing duplicate: acknowledge without re-running anything.
            return Ok(CommandReply::BattleFinalized {
                final_total_damage: battle.total_damage,
                item_picked_up: None,
            });
        }
    }
    if ctx.tx.game(game_id)?.pending_battle != Some(battle_id) {
        return Err(EngineError::InvalidTurnAction(
            "this battle is not awaiting confirmation".into(),
        ));
    }
    {
        let battle = ctx.tx.battle(battle_id)?;
        if battle.player_id != player_id {
            return Err(EngineError::NotYourTurn);
        }
        if battle.turn_id != turn_id {
            return Err(EngineError::InvalidTurnAction(
                "the supplied turn is not the current one".into(),
            ));
        }
    }

    // Selected consumables leave the inventory and add their damage.
    let mut consumable_damage = 0;
    let mut used_items = Vec::with_capacity(selected_consumable_ids.len());
    for &item_id in &selected_consumable_ids {
        let item = ctx
            .tx
            .player(player_id)?
            .inventory
            .find(item_id)
            .cloned()
            .ok_or(EngineError::ItemNotInInventory(item_id))?;
        if !item.is_battle_consumable() {
            return Err(EngineError::Validation(format!(
                "item {item_id} cannot be committed to a battle"
            )));
        }
        ctx.tx.player(player_id)?.inventory.remove(item_id);
        consumable_damage += item.item_type.consumable_damage();
        used_items.push(item_id);
    }

    let (total_damage, result) = {
        let battle = ctx.tx.battle(battle_id)?;
        let total = battle.dice[0] + battle.dice[1] + battle.weapon_damage + consumable_damage;
        let result = outcome(total, battle.monster.guard_hp);
        battle.used_items = used_items;
        battle.total_damage = total;
        battle.completed = true;
        (total, result)
    };
    info!(%battle_id, total_damage, ?result, "battle finalized");

    ctx.tx.game(game_id)?.pending_battle = None;
    update_last_battle(ctx, battle_id, result, consumable_damage, false, Vec::new())?;
    ctx.emit(Event::BattleCompleted {
        game_id,
        battle_id,
        player_id,
        result,
        total_damage,
        needs_consumable_confirmation: false,
        available_consumables: Vec::new(),
    })?;

    let item_picked_up = process_result(ctx, battle_id, result, pickup_item, replace_item_id)?;
    Ok(CommandReply::BattleFinalized {
        final_total_damage: total_damage,
        item_picked_up,
    })
}

// =============================================================================
// Outcome processing
// =============================================================================

/// Record the fight and apply its consequences.
///
/// LOSE applies `ReducePlayerHp` strictly before the return move. WIN leaves
/// the turn open for the pickup; the pickup itself (here or via a later
/// `PickItem`) is what closes a battle turn.
fn process_result(
    ctx: &mut TxContext<'_>,
    battle_id: BattleId,
    result: BattleResult,
    pickup_item: bool,
    replace_item_id: Option<ItemId>,
) -> Result<Option<Item>, EngineError> {
    let (game_id, player_id, turn_id, from, to, dice, used_items) = {
        let battle = ctx.tx.battle(battle_id)?;
        (
            battle.game_id,
            battle.player_id,
            battle.turn_id,
            battle.from,
            battle.to,
            battle.dice,
            battle.used_items.clone(),
        )
    };

    turn::record_action(
        ctx,
        game_id,
        turn_id,
        TurnAction::FightMonster,
        None,
        Some(ActionDetail::Battle {
            dice,
            used_items,
            result,
            from,
            to,
        }),
    )?;

    match result {
        BattleResult::Win => {
            {
                let f = ctx.tx.field(game_id)?;
                if let Some(item) = f.items.get_mut(&to.key()) {
                    item.guard_defeated = true;
                }
            }
            let mut picked = None;
            if pickup_item {
                let reply = ctx.dispatch(Command::PickItem {
                    game_id,
                    player_id,
                    turn_id,
                    position: to,
                    item_id_to_replace: replace_item_id,
                })?;
                if let CommandReply::ItemPick(PickItemOutcome::Picked { item, .. }) = reply {
                    picked = Some(item);
                }
            }
            Ok(picked)
        }
        BattleResult::Draw => {
            ctx.dispatch(Command::ResetPlayerPosition {
                game_id,
                player_id,
                to: from,
            })?;
            ctx.dispatch(Command::EndTurn {
                game_id,
                player_id,
                turn_id,
            })?;
            Ok(None)
        }
        BattleResult::Lose => {
            // HP first, then the return move (fountain heals the wound).
            ctx.dispatch(Command::ReducePlayerHp {
                game_id,
                player_id,
                amount: 1,
            })?;
            ctx.dispatch(Command::ResetPlayerPosition {
                game_id,
                player_id,
                to: from,
            })?;
            ctx.dispatch(Command::EndTurn {
                game_id,
                player_id,
                turn_id,
            })?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_boundaries() {
        assert_eq!(outcome(6, 5), BattleResult::Win);
        assert_eq!(outcome(5, 5), BattleResult::Draw);
        assert_eq!(outcome(4, 5), BattleResult::Lose);
        assert_eq!(outcome(12, 5), BattleResult::Win);
    }
}
