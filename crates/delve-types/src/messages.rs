//! Commands, events, and their envelopes.
//!
//! A command may mutate state and has exactly one handler; an event is a
//! past-tense notification with any number of handlers. Events flagged as
//! external are additionally staged into the outbox for at-least-once
//! delivery after commit.

use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::item::{Item, ItemCategory, ItemType};
use crate::position::{FieldPlace, Side};
use crate::state::{BattleInfo, BattleResult, Timestamp};
use crate::tile::Tile;

// =============================================================================
// Commands
// =============================================================================

/// A request that may mutate state. The first block is the external surface;
/// the variants after `StartBattle` are internal, dispatched only by handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    CreateGame {
        game_id: Option<GameId>,
        deck_size: u32,
    },
    AddPlayer {
        game_id: GameId,
        player_id: Option<PlayerId>,
        external_id: Option<String>,
        username: Option<String>,
        wallet: Option<String>,
    },
    StartGame {
        game_id: GameId,
    },
    PickTile {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        /// Client-supplied identity for the drawn tile, for idempotency.
        tile_id: Option<TileId>,
        required_open_side: Side,
        field_place: FieldPlace,
    },
    RotateTile {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        tile_id: TileId,
        top_side: Side,
        required_open_side: Side,
    },
    PlaceTile {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        tile_id: TileId,
        field_place: FieldPlace,
    },
    MovePlayer {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        from: FieldPlace,
        to: FieldPlace,
        ignore_monster: bool,
        is_tile_placement_move: bool,
    },
    PickItem {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        position: FieldPlace,
        item_id_to_replace: Option<ItemId>,
    },
    UseSpell {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        spell_id: ItemId,
        target_position: Option<FieldPlace>,
    },
    FinalizeBattle {
        battle_id: BattleId,
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        selected_consumable_ids: Vec<ItemId>,
        pickup_item: bool,
        replace_item_id: Option<ItemId>,
    },
    EndTurn {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
    },

    // --- internal commands ---
    StartBattle {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        from: FieldPlace,
        to: FieldPlace,
    },
    NextTurn {
        game_id: GameId,
    },
    StartTurn {
        game_id: GameId,
        player_id: PlayerId,
    },
    EndGame {
        game_id: GameId,
        triggered_by: PlayerId,
    },
    ResetPlayerPosition {
        game_id: GameId,
        player_id: PlayerId,
        to: FieldPlace,
    },
    ReducePlayerHp {
        game_id: GameId,
        player_id: PlayerId,
        amount: u32,
    },
}

/// Dispatch key for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateGame,
    AddPlayer,
    StartGame,
    PickTile,
    RotateTile,
    PlaceTile,
    MovePlayer,
    PickItem,
    UseSpell,
    FinalizeBattle,
    EndTurn,
    StartBattle,
    NextTurn,
    StartTurn,
    EndGame,
    ResetPlayerPosition,
    ReducePlayerHp,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CreateGame { .. } => CommandKind::CreateGame,
            Self::AddPlayer { .. } => CommandKind::AddPlayer,
            Self::StartGame { .. } => CommandKind::StartGame,
            Self::PickTile { .. } => CommandKind::PickTile,
            Self::RotateTile { .. } => CommandKind::RotateTile,
            Self::PlaceTile { .. } => CommandKind::PlaceTile,
            Self::MovePlayer { .. } => CommandKind::MovePlayer,
            Self::PickItem { .. } => CommandKind::PickItem,
            Self::UseSpell { .. } => CommandKind::UseSpell,
            Self::FinalizeBattle { .. } => CommandKind::FinalizeBattle,
            Self::EndTurn { .. } => CommandKind::EndTurn,
            Self::StartBattle { .. } => CommandKind::StartBattle,
            Self::NextTurn { .. } => CommandKind::NextTurn,
            Self::StartTurn { .. } => CommandKind::StartTurn,
            Self::EndGame { .. } => CommandKind::EndGame,
            Self::ResetPlayerPosition { .. } => CommandKind::ResetPlayerPosition,
            Self::ReducePlayerHp { .. } => CommandKind::ReducePlayerHp,
        }
    }

    /// The game this command targets, when it already knows one.
    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Self::CreateGame { game_id, .. } => *game_id,
            Self::AddPlayer { game_id, .. }
            | Self::StartGame { game_id }
            | Self::PickTile { game_id, .. }
            | Self::RotateTile { game_id, .. }
            | Self::PlaceTile { game_id, .. }
            | Self::MovePlayer { game_id, .. }
            | Self::PickItem { game_id, .. }
            | Self::UseSpell { game_id, .. }
            | Self::FinalizeBattle { game_id, .. }
            | Self::EndTurn { game_id, .. }
            | Self::StartBattle { game_id, .. }
            | Self::NextTurn { game_id }
            | Self::StartTurn { game_id, .. }
            | Self::EndGame { game_id, .. }
            | Self::ResetPlayerPosition { game_id, .. }
            | Self::ReducePlayerHp { game_id, .. } => Some(*game_id),
        }
    }

    /// Internal commands are only ever dispatched by other handlers.
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind(),
            CommandKind::StartBattle
                | CommandKind::NextTurn
                | CommandKind::StartTurn
                | CommandKind::EndGame
                | CommandKind::ResetPlayerPosition
                | CommandKind::ReducePlayerHp
        )
    }
}

/// Envelope for an external command: idempotency id plus optional deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: MessageId,
    pub deadline: Option<Timestamp>,
    pub command: Command,
}

impl CommandEnvelope {
    pub fn new(command: Command) -> Self {
        Self {
            id: MessageId::generate(),
            deadline: None,
            command,
        }
    }

    pub fn with_deadline(mut self, deadline: Timestamp) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

// =============================================================================
// Events
// =============================================================================

/// A past-tense notification emitted by a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    GameCreated {
        game_id: GameId,
        deck_size: u32,
    },
    DeckCreated {
        game_id: GameId,
        room_count: u32,
    },
    PlayerAdded {
        game_id: GameId,
        player_id: PlayerId,
    },
    GameStarted {
        game_id: GameId,
    },
    TurnStarted {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
        number: u32,
    },
    TilePlaced {
        game_id: GameId,
        tile_id: TileId,
        position: FieldPlace,
    },
    PlayerMoved {
        game_id: GameId,
        player_id: PlayerId,
        from: FieldPlace,
        to: FieldPlace,
        is_battle_return: bool,
        is_tile_placement_move: bool,
    },
    BattleCompleted {
        game_id: GameId,
        battle_id: BattleId,
        player_id: PlayerId,
        result: BattleResult,
        total_damage: u32,
        needs_consumable_confirmation: bool,
        available_consumables: Vec<Item>,
    },
    ItemAddedToInventory {
        game_id: GameId,
        player_id: PlayerId,
        item: Item,
    },
    PlayerStunned {
        game_id: GameId,
        player_id: PlayerId,
    },
    TurnEnded {
        game_id: GameId,
        player_id: PlayerId,
        turn_id: TurnId,
    },
    GameFinished {
        game_id: GameId,
        winner: Option<PlayerId>,
        scores: std::collections::BTreeMap<PlayerId, u32>,
    },
}

/// Dispatch key for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GameCreated,
    DeckCreated,
    PlayerAdded,
    GameStarted,
    TurnStarted,
    TilePlaced,
    PlayerMoved,
    BattleCompleted,
    ItemAddedToInventory,
    PlayerStunned,
    TurnEnded,
    GameFinished,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::GameCreated { .. } => EventKind::GameCreated,
            Self::DeckCreated { .. } => EventKind::DeckCreated,
            Self::PlayerAdded { .. } => EventKind::PlayerAdded,
            Self::GameStarted { .. } => EventKind::GameStarted,
            Self::TurnStarted { .. } => EventKind::TurnStarted,
            Self::TilePlaced { .. } => EventKind::TilePlaced,
            Self::PlayerMoved { .. } => EventKind::PlayerMoved,
            Self::BattleCompleted { .. } => EventKind::BattleCompleted,
            Self::ItemAddedToInventory { .. } => EventKind::ItemAddedToInventory,
            Self::PlayerStunned { .. } => EventKind::PlayerStunned,
            Self::TurnEnded { .. } => EventKind::TurnEnded,
            Self::GameFinished { .. } => EventKind::GameFinished,
        }
    }

    pub fn game_id(&self) -> GameId {
        match self {
            Self::GameCreated { game_id, .. }
            | Self::DeckCreated { game_id, .. }
            | Self::PlayerAdded { game_id, .. }
            | Self::GameStarted { game_id }
            | Self::TurnStarted { game_id, .. }
            | Self::TilePlaced { game_id, .. }
            | Self::PlayerMoved { game_id, .. }
            | Self::BattleCompleted { game_id, .. }
            | Self::ItemAddedToInventory { game_id, .. }
            | Self::PlayerStunned { game_id, .. }
            | Self::TurnEnded { game_id, .. }
            | Self::GameFinished { game_id, .. } => *game_id,
        }
    }

    /// External events are forwarded through the outbox after commit.
    pub fn is_external(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::GameStarted
                | EventKind::TilePlaced
                | EventKind::PlayerMoved
                | EventKind::BattleCompleted
                | EventKind::ItemAddedToInventory
                | EventKind::PlayerStunned
                | EventKind::TurnEnded
                | EventKind::GameFinished
        )
    }
}

/// An emitted event with its identity, as delivered to handlers and staged
/// into the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: MessageId,
    pub game_id: GameId,
    pub event: Event,
}

// =============================================================================
// Command replies
// =============================================================================

/// Outcome of a pick-item request. Refusals that need client context
/// (inventory full, missing key) are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PickItemOutcome {
    Picked {
        item: Item,
        replaced: Option<Item>,
    },
    InventoryFull {
        category: ItemCategory,
        cap: usize,
        items: Vec<Item>,
        candidate: Item,
    },
    MissingKey {
        chest_type: ItemType,
    },
}

/// What a successfully dispatched command returns to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    GameCreated {
        game_id: GameId,
    },
    PlayerAdded {
        game_id: GameId,
        player_id: PlayerId,
    },
    GameStarted {
        game_id: GameId,
    },
    TilePicked {
        tile: Tile,
    },
    TileRotated {
        tile: Tile,
    },
    TilePlaced {
        tile: Tile,
        available_places: Vec<FieldPlace>,
        item: Option<Item>,
    },
    Moved {
        battle: Option<BattleInfo>,
        item: Option<Item>,
    },
    ItemPick(PickItemOutcome),
    SpellUsed {
        game_id: GameId,
    },
    BattleFinalized {
        final_total_damage: u32,
        item_picked_up: Option<Item>,
    },
    TurnEnded {
        success: bool,
    },
    /// Replayed command id; nothing was re-run.
    Duplicate,
    /// Internal command acknowledged (no payload).
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_commands_are_flagged() {
        let game_id = GameId::generate();
        assert!(Command::NextTurn { game_id }.is_internal());
        assert!(!Command::StartGame { game_id }.is_internal());
    }

    #[test]
    fn event_external_set() {
        let game_id = GameId::generate();
        assert!(!Event::GameCreated {
            game_id,
            deck_size: 88
        }
        .is_external());
        assert!(Event::GameStarted { game_id }.is_external());
    }

    #[test]
    fn command_serde_round_trip() {
        let cmd = Command::MovePlayer {
            game_id: GameId::generate(),
            player_id: PlayerId::generate(),
            turn_id: TurnId::generate(),
            from: FieldPlace::new(0, 0),
            to: FieldPlace::new(1, 0),
            ignore_monster: false,
            is_tile_placement_move: true,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
        assert_eq!(back.kind(), CommandKind::MovePlayer);
    }
}
