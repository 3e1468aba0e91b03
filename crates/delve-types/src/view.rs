//! Read-model projections returned by the query surface.
//!
//! `GameView` is what `get_game` assembles for a client: the full observable
//! state of one game, flattened out of the aggregates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{GameId, PlayerId, TileId, TurnId};
use crate::item::Item;
use crate::position::FieldPlace;
use crate::state::{BattleInfo, GameStatus, Inventory, TurnActionEntry};
use crate::tile::{TileFeature, TileOrientation};

/// One player as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub username: Option<String>,
    pub external_id: Option<String>,
    pub hp: u32,
    pub defeated: bool,
    pub inventory: Inventory,
    pub position: Option<FieldPlace>,
}

/// One placed tile as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileView {
    pub tile_id: TileId,
    pub position: FieldPlace,
    pub orientation: TileOrientation,
    pub room: bool,
    pub features: Vec<TileFeature>,
    pub item: Option<Item>,
}

/// One turn with its action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnView {
    pub turn_id: TurnId,
    pub player_id: PlayerId,
    pub number: u32,
    pub actions: Vec<TurnActionEntry>,
    pub performed_actions_count: u32,
    pub ended: bool,
}

/// Full observable state of one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: GameId,
    pub status: GameStatus,
    pub players: Vec<PlayerView>,
    pub tiles: Vec<TileView>,
    pub available_places: Vec<FieldPlace>,
    pub current_player_id: Option<PlayerId>,
    pub current_turn: Option<TurnView>,
    pub current_turn_number: u32,
    pub deck_remaining: usize,
    pub last_battle: Option<BattleInfo>,
    /// Most recent turns, oldest first.
    pub recent_turns: Vec<TurnView>,
    pub winner: Option<PlayerId>,
    pub scores: BTreeMap<PlayerId, u32>,
}
