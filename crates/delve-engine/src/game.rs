//! Game lifecycle — create, roster, start, clockwise rotation, end, scoring.

use tracing::info;

use delve_types::error::EngineError;
use delve_types::ids::PlayerId;
use delve_types::messages::{Command, CommandKind, CommandReply, Event, EventEnvelope, EventKind};
use delve_types::position::FieldPlace;
use delve_types::state::{Game, GameStatus, Player, MAX_HP, MAX_PLAYERS};

use crate::bus::{MessageBus, TxContext};

pub fn register(bus: &mut MessageBus) {
    bus.register_command(CommandKind::CreateGame, handle_create_game);
    bus.register_command(CommandKind::AddPlayer, handle_add_player);
    bus.register_command(CommandKind::StartGame, handle_start_game);
    bus.register_command(CommandKind::NextTurn, handle_next_turn);
    bus.register_command(CommandKind::EndGame, handle_end_game);
    bus.register_event(EventKind::TurnEnded, on_turn_ended);
    bus.register_event(EventKind::ItemAddedToInventory, on_item_added);
}

// =============================================================================
// Lifecycle commands
// =============================================================================

fn handle_create_game(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::CreateGame {
        game_id: Some(game_id),
        deck_size,
    } = *command
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    ctx.tx.put_game(game_id, Game::new(game_id, deck_size));
    info!(%game_id, deck_size, "game created");
    ctx.emit(Event::GameCreated { game_id, deck_size })?;
    Ok(CommandReply::GameCreated { game_id })
}

fn handle_add_player(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::AddPlayer {
        game_id,
        player_id,
        external_id,
        username,
        wallet,
    } = command.clone()
    else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let player_id = player_id.unwrap_or_else(PlayerId::generate);
    let starting_hp = ctx
        .tx
        .overrides
        .as_ref()
        .and_then(|o| o.starting_hp.get(&player_id).copied())
        .unwrap_or(MAX_HP);

    {
        let game = ctx.tx.game(game_id)?;
        if game.status != GameStatus::Lobby {
            return Err(EngineError::GameNotPreparing);
        }
        if game.players.len() >= MAX_PLAYERS {
            return Err(EngineError::GameAlreadyFull);
        }
        if game.players.contains(&player_id) {
            return Err(EngineError::Validation(format!(
                "player {player_id} already joined"
            )));
        }
        game.players.push(player_id);
    }

    let mut player = Player::new(player_id, game_id, starting_hp);
    player.external_id = external_id;
    player.username = username;
    player.wallet = wallet;
    ctx.tx.put_player(player_id, player);

    ctx.emit(Event::PlayerAdded { game_id, player_id })?;
    Ok(CommandReply::PlayerAdded { game_id, player_id })
}

fn handle_start_game(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::StartGame { game_id } = *command else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let players = {
        let game = ctx.tx.game(game_id)?;
        if game.status != GameStatus::Lobby {
            return Err(EngineError::GameNotPreparing);
        }
        if game.players.is_empty() {
            return Err(EngineError::NoPlayers);
        }
        game.status = GameStatus::Started;
        game.players.clone()
    };

    // Everyone begins on the starting tile.
    {
        let movement = ctx.tx.movement(game_id)?;
        for player_id in &players {
            movement.positions.insert(*player_id, FieldPlace::ZERO);
        }
    }

    info!(%game_id, players = players.len(), "game started");
    ctx.emit(Event::GameStarted { game_id })?;
    ctx.dispatch(Command::NextTurn { game_id })?;
    Ok(CommandReply::GameStarted { game_id })
}

// =============================================================================
// Turn rotation
// =============================================================================

fn handle_next_turn(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::NextTurn { game_id } = *command else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let (players, current) = {
        let game = ctx.tx.game(game_id)?;
        if game.is_finished() {
            return Ok(CommandReply::Done);
        }
        (game.players.clone(), game.current_player_id)
    };
    if players.is_empty() {
        return Err(EngineError::Internal("next turn with no players".into()));
    }

    let next_index = match current.and_then(|p| players.iter().position(|&x| x == p)) {
        Some(index) => (index + 1) % players.len(),
        None => 0,
    };
    let next_player = players[next_index];

    let stunned = ctx.tx.player(next_player)?.defeated;
    if stunned {
        // Stunned skip: regenerate to 1 HP, open the turn, close it at once.
        {
            let player = ctx.tx.player(next_player)?;
            player.hp = 1;
            player.defeated = false;
        }
        info!(%game_id, player_id = %next_player, "stunned player skips their turn");
        ctx.dispatch(Command::StartTurn {
            game_id,
            player_id: next_player,
        })?;
        let turn_id = ctx
            .tx
            .game(game_id)?
            .current_turn_id
            .ok_or_else(|| EngineError::Internal("turn not opened".into()))?;
        ctx.dispatch(Command::EndTurn {
            game_id,
            player_id: next_player,
            turn_id,
        })?;
    } else {
        ctx.dispatch(Command::StartTurn {
            game_id,
            player_id: next_player,
        })?;
    }
    Ok(CommandReply::Done)
}

fn on_turn_ended(ctx: &mut TxContext<'_>, envelope: &EventEnvelope) -> Result<(), EngineError> {
    let Event::TurnEnded { game_id, .. } = envelope.event else {
        return Ok(());
    };
    ctx.dispatch(Command::NextTurn { game_id })?;
    Ok(())
}

// =============================================================================
// Game end & scoring
// =============================================================================

fn handle_end_game(
    ctx: &mut TxContext<'_>,
    command: &Command,
) -> Result<CommandReply, EngineError> {
    let Command::EndGame { game_id, .. } = *command else {
        return Err(EngineError::Internal("mismatched command".into()));
    };

    let players = {
        let game = ctx.tx.game(game_id)?;
        if game.is_finished() {
            return Ok(CommandReply::Done);
        }
        game.players.clone()
    };

    let mut scores = std::collections::BTreeMap::new();
    let mut ranked = Vec::with_capacity(players.len());
    for &player_id in &players {
        let score = ctx.tx.player(player_id)?.inventory.treasure_score();
        scores.insert(player_id, score);
        ranked.push((player_id, score));
    }
    let winner = decide_winner(&ranked);

    {
        let game = ctx.tx.game(game_id)?;
        game.status = GameStatus::Finished;
        game.winner = winner;
        game.scores = scores.clone();
        game.pending_battle = None;
    }

    info!(%game_id, winner = ?winner, "game finished");
    ctx.emit(Event::GameFinished {
        game_id,
        winner,
        scores,
    })?;
    Ok(CommandReply::Done)
}

fn on_item_added(ctx: &mut TxContext<'_>, envelope: &EventEnvelope) -> Result<(), EngineError> {
    let Event::ItemAddedToInventory {
        game_id,
        player_id,
        ref item,
    } = envelope.event
    else {
        return Ok(());
    };
    if item.ends_game() {
        ctx.dispatch(Command::EndGame {
            game_id,
            triggered_by: player_id,
        })?;
    }
    Ok(())
}

/// Winner is the unique maximum score; ties break toward the earliest
/// insertion order.
fn decide_winner(ranked: &[(PlayerId, u32)]) -> Option<PlayerId> {
    let mut winner: Option<(PlayerId, u32)> = None;
    for &(player_id, score) in ranked {
        match winner {
            Some((_, best)) if score <= best => {}
            _ => winner = Some((player_id, score)),
        }
    }
    winner.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winner_is_the_top_scorer() {
        let a = PlayerId::generate();
        let b = PlayerId::generate();
        let c = PlayerId::generate();
        assert_eq!(decide_winner(&[(a, 2), (b, 5), (c, 3)]), Some(b));
    }

    #[test]
    fn ties_break_toward_earliest_insertion() {
        let a = PlayerId::generate();
        let b = PlayerId::generate();
        assert_eq!(decide_winner(&[(a, 4), (b, 4)]), Some(a));
        assert_eq!(decide_winner(&[(a, 0), (b, 0)]), Some(a));
    }

    #[test]
    fn no_players_no_winner() {
        assert_eq!(decide_winner(&[]), None);
    }
}
