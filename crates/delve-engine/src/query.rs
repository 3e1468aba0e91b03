//! The query surface — assembling the full game view.

use serde::de::DeserializeOwned;

use delve_types::error::EngineError;
use delve_types::ids::{GameId, TurnId};
use delve_types::state::{Deck, Field, Game, Movement, Player, Turn, VIEW_TURN_HISTORY};
use delve_types::view::{GameView, PlayerView, TileView, TurnView};

use crate::store::{AggregateKey, Store};

fn load<T: DeserializeOwned>(
    store: &dyn Store,
    key: AggregateKey,
) -> Result<Option<T>, EngineError> {
    match store.load(key)? {
        None => Ok(None),
        Some(row) => serde_json::from_value(row.body)
            .map(Some)
            .map_err(|e| EngineError::Internal(format!("deserialize {}: {e}", key.kind_name()))),
    }
}

fn load_required<T: DeserializeOwned>(
    store: &dyn Store,
    key: AggregateKey,
) -> Result<T, EngineError> {
    load(store, key)?.ok_or_else(|| {
        EngineError::Internal(format!("{} row missing", key.kind_name()))
    })
}

fn turn_view(store: &dyn Store, turn_id: TurnId) -> Result<TurnView, EngineError> {
    let turn: Turn = load_required(store, AggregateKey::Turn(turn_id))?;
    Ok(TurnView {
        turn_id: turn.id,
        player_id: turn.player_id,
        number: turn.number,
        performed_actions_count: turn.performed_actions_count,
        ended: turn.is_ended(),
        actions: turn.actions,
    })
}

/// Assemble the full observable state of one game.
pub fn get_game(store: &dyn Store, game_id: GameId) -> Result<GameView, EngineError> {
    let game: Game = load(store, AggregateKey::Game(game_id))?
        .ok_or(EngineError::GameNotFound(game_id))?;
    let field: Field = load_required(store, AggregateKey::Field(game_id))?;
    let movement: Movement = load_required(store, AggregateKey::Movement(game_id))?;
    let deck: Deck = load_required(store, AggregateKey::Deck(game_id))?;

    let mut players = Vec::with_capacity(game.players.len());
    for &player_id in &game.players {
        let player: Player = load_required(store, AggregateKey::Player(player_id))?;
        players.push(PlayerView {
            id: player.id,
            username: player.username,
            external_id: player.external_id,
            hp: player.hp,
            defeated: player.defeated,
            inventory: player.inventory,
            position: movement.position_of(player_id),
        });
    }

    let tiles = field
        .tiles
        .values()
        .map(|placed| TileView {
            tile_id: placed.tile.id,
            position: placed.place,
            orientation: placed.tile.orientation,
            room: placed.tile.room,
            features: placed.tile.features.clone(),
            item: field.item_at(placed.place).cloned(),
        })
        .collect();

    let current_turn = match game.current_turn_id {
        Some(turn_id) => Some(turn_view(store, turn_id)?),
        None => None,
    };

    let recent_ids: Vec<TurnId> = game
        .turn_ids
        .iter()
        .rev()
        .take(VIEW_TURN_HISTORY)
        .rev()
        .copied()
        .collect();
    let mut recent_turns = Vec::with_capacity(recent_ids.len());
    for turn_id in recent_ids {
        recent_turns.push(turn_view(store, turn_id)?);
    }

    Ok(GameView {
        game_id: game.id,
        status: game.status,
        players,
        tiles,
        available_places: field.available_places,
        current_player_id: game.current_player_id,
        current_turn,
        current_turn_number: game.current_turn_number,
        deck_remaining: deck.remaining(),
        last_battle: field.last_battle,
        recent_turns,
        winner: game.winner,
        scores: game.scores,
    })
}
