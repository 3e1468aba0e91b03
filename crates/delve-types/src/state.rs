//! Aggregate state structs — Game, Player, Turn, Field, Movement, Deck, Bag,
//! Battle.
//!
//! Each aggregate is a consistency boundary persisted as one row keyed by its
//! id, with an integer `version` bumped by the store on every write. Cross
//! aggregate reads go through the message bus; nothing here holds a reference
//! to another aggregate.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use arrayvec::ArrayVec;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::item::{Item, ItemCategory, ItemName};
use crate::position::FieldPlace;
use crate::tile::{Tile, TileTemplate};

// =============================================================================
// Rulebook constants
// =============================================================================

/// Max players in a game.
pub const MAX_PLAYERS: usize = 4;
/// Max (and starting) player HP.
pub const MAX_HP: u32 = 5;
/// Counted actions per turn before the turn auto-ends.
pub const MAX_ACTIONS_PER_TURN: u32 = 4;
/// Inventory cap: keys.
pub const MAX_KEYS: usize = 1;
/// Inventory cap: weapons.
pub const MAX_WEAPONS: usize = 2;
/// Inventory cap: spells.
pub const MAX_SPELLS: usize = 3;
/// Default deck size when the client does not specify one.
pub const DEFAULT_DECK_SIZE: u32 = 88;
/// Battle dice: two six-sided dice.
pub const DICE_PER_BATTLE: usize = 2;
pub const DIE_MIN: u32 = 1;
pub const DIE_MAX: u32 = 6;
/// How many recent turns the game view carries.
pub const VIEW_TURN_HISTORY: usize = 10;

/// Unix milliseconds, supplied by the engine clock.
pub type Timestamp = u64;

// =============================================================================
// Game
// =============================================================================

/// Lifecycle status of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Accepting players.
    Lobby,
    /// Started, between turns.
    Started,
    /// A turn is open.
    TurnInProgress,
    /// Over; only reads and idempotent end-of-life commands are accepted.
    Finished,
}

/// The game aggregate — roster, rotation, lifecycle, scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub version: u64,
    pub status: GameStatus,
    /// Players in insertion order; turn rotation is clockwise over this list.
    pub players: Vec<PlayerId>,
    pub current_player_id: Option<PlayerId>,
    pub current_turn_id: Option<TurnId>,
    pub current_turn_number: u32,
    /// All turns ever started, oldest first.
    pub turn_ids: Vec<TurnId>,
    /// Set while a battle awaits its consumable confirmation.
    pub pending_battle: Option<BattleId>,
    pub deck_size: u32,
    pub winner: Option<PlayerId>,
    pub scores: BTreeMap<PlayerId, u32>,
    /// Client-supplied command ids already applied, for replay dedup.
    pub processed_commands: BTreeSet<MessageId>,
}

impl Game {
    pub fn new(id: GameId, deck_size: u32) -> Self {
        Self {
            id,
            version: 0,
            status: GameStatus::Lobby,
            players: Vec::new(),
            current_player_id: None,
            current_turn_id: None,
            current_turn_number: 0,
            turn_ids: Vec::new(),
            pending_battle: None,
            deck_size,
            winner: None,
            scores: BTreeMap::new(),
            processed_commands: BTreeSet::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }

    /// Index of a player in the rotation order.
    pub fn player_index(&self, player_id: PlayerId) -> Option<usize> {
        self.players.iter().position(|&p| p == player_id)
    }
}

// =============================================================================
// Player
// =============================================================================

/// Category-capped item slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub keys: ArrayVec<Item, MAX_KEYS>,
    pub weapons: ArrayVec<Item, MAX_WEAPONS>,
    pub spells: ArrayVec<Item, MAX_SPELLS>,
    pub treasures: Vec<Item>,
}

impl Inventory {
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.keys
            .iter()
            .chain(self.weapons.iter())
            .chain(self.spells.iter())
            .chain(self.treasures.iter())
    }

    pub fn find(&self, item_id: ItemId) -> Option<&Item> {
        self.items().find(|item| item.id == item_id)
    }

    /// Remove an item by id, from whichever slot holds it.
    pub fn remove(&mut self, item_id: ItemId) -> Option<Item> {
        if let Some(i) = self.keys.iter().position(|item| item.id == item_id) {
            return Some(self.keys.remove(i));
        }
        if let Some(i) = self.weapons.iter().position(|item| item.id == item_id) {
            return Some(self.weapons.remove(i));
        }
        if let Some(i) = self.spells.iter().position(|item| item.id == item_id) {
            return Some(self.spells.remove(i));
        }
        if let Some(i) = self.treasures.iter().position(|item| item.id == item_id) {
            return Some(self.treasures.remove(i));
        }
        None
    }

    pub fn slots_of(&self, category: ItemCategory) -> &[Item] {
        match category {
            ItemCategory::Key => &self.keys,
            ItemCategory::Weapon => &self.weapons,
            ItemCategory::Spell => &self.spells,
            ItemCategory::Treasure => &self.treasures,
        }
    }

    pub fn cap_of(category: ItemCategory) -> Option<usize> {
        match category {
            ItemCategory::Key => Some(MAX_KEYS),
            ItemCategory::Weapon => Some(MAX_WEAPONS),
            ItemCategory::Spell => Some(MAX_SPELLS),
            ItemCategory::Treasure => None,
        }
    }

    pub fn is_full(&self, category: ItemCategory) -> bool {
        match Self::cap_of(category) {
            Some(cap) => self.slots_of(category).len() >= cap,
            None => false,
        }
    }

    /// Push into the category slot. Caller must check `is_full` first.
    pub fn insert(&mut self, item: Item) {
        match item.category() {
            ItemCategory::Key => self.keys.push(item),
            ItemCategory::Weapon => self.weapons.push(item),
            ItemCategory::Spell => self.spells.push(item),
            ItemCategory::Treasure => self.treasures.push(item),
        }
    }

    /// Flat damage added to every battle roll.
    pub fn weapon_damage(&self) -> u32 {
        self.weapons
            .iter()
            .map(|item| item.item_type.weapon_damage())
            .sum()
    }

    pub fn has_key(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn treasure_score(&self) -> u32 {
        self.treasures.iter().map(Item::treasure_value).sum()
    }
}

/// The player aggregate — HP, inventory, stun state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub game_id: GameId,
    pub version: u64,
    pub external_id: Option<String>,
    pub username: Option<String>,
    pub wallet: Option<String>,
    pub hp: u32,
    /// True exactly when HP is 0.
    pub defeated: bool,
    pub inventory: Inventory,
}

impl Player {
    pub fn new(id: PlayerId, game_id: GameId, starting_hp: u32) -> Self {
        Self {
            id,
            game_id,
            version: 0,
            external_id: None,
            username: None,
            wallet: None,
            hp: starting_hp.min(MAX_HP),
            defeated: starting_hp == 0,
            inventory: Inventory::default(),
        }
    }
}

// =============================================================================
// Turn
// =============================================================================

/// Everything a player can do within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    Move,
    PickTile,
    RotateTile,
    PlaceTile,
    FightMonster,
    PickItem,
    UseSpell,
    HealAtFountain,
    TeleportSpell,
    EndTurn,
}

impl TurnAction {
    /// Does this action consume one of the four per-turn slots?
    pub const fn counted(self) -> bool {
        matches!(
            self,
            Self::Move
                | Self::PickTile
                | Self::PickItem
                | Self::UseSpell
                | Self::HealAtFountain
                | Self::TeleportSpell
        )
    }

    /// Does this action close the turn?
    pub const fn ends_turn(self) -> bool {
        matches!(self, Self::HealAtFountain | Self::TeleportSpell | Self::EndTurn)
    }
}

/// Extra payload recorded with a turn action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDetail {
    Move {
        from: FieldPlace,
        to: FieldPlace,
    },
    Battle {
        dice: [u32; DICE_PER_BATTLE],
        used_items: Vec<ItemId>,
        result: BattleResult,
        from: FieldPlace,
        to: FieldPlace,
    },
    Item {
        item_id: ItemId,
        position: FieldPlace,
    },
    Spell {
        item_id: ItemId,
    },
}

/// One entry in the turn's action log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnActionEntry {
    pub action: TurnAction,
    pub tile_id: Option<TileId>,
    pub detail: Option<ActionDetail>,
    pub at: Timestamp,
}

/// The turn aggregate — one player's action log and budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub version: u64,
    pub number: u32,
    pub actions: Vec<TurnActionEntry>,
    /// Count of `counted()` entries; kept in lockstep with `actions`.
    pub performed_actions_count: u32,
    /// A tile picked from the deck but not yet placed.
    pub picked_tile: Option<TileId>,
    pub started_at: Timestamp,
    pub end_time: Option<Timestamp>,
}

impl Turn {
    pub fn new(
        id: TurnId,
        game_id: GameId,
        player_id: PlayerId,
        number: u32,
        started_at: Timestamp,
    ) -> Self {
        Self {
            id,
            game_id,
            player_id,
            version: 0,
            number,
            actions: Vec::new(),
            performed_actions_count: 0,
            picked_tile: None,
            started_at,
            end_time: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn last_action(&self) -> Option<TurnAction> {
        self.actions.last().map(|entry| entry.action)
    }

    /// A battle anywhere in the turn disables the 4-action auto-end.
    pub fn has_battle_in_turn(&self) -> bool {
        self.actions
            .iter()
            .any(|entry| entry.action == TurnAction::FightMonster)
    }
}

// =============================================================================
// Deck and Bag
// =============================================================================

/// Ordered draw pile of tile templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub game_id: GameId,
    pub version: u64,
    pub tiles: VecDeque<TileTemplate>,
}

impl Deck {
    pub fn new(game_id: GameId, tiles: VecDeque<TileTemplate>) -> Self {
        Self {
            game_id,
            version: 0,
            tiles,
        }
    }

    pub fn remaining(&self) -> usize {
        self.tiles.len()
    }
}

/// Ordered draw pile of room contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bag {
    pub game_id: GameId,
    pub version: u64,
    pub items: VecDeque<Item>,
}

impl Bag {
    pub fn new(game_id: GameId, items: VecDeque<Item>) -> Self {
        Self {
            game_id,
            version: 0,
            items,
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

// =============================================================================
// Field
// =============================================================================

/// A tile frozen onto the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedTile {
    pub place: FieldPlace,
    pub tile: Tile,
}

/// Outcome of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleResult {
    Win,
    Draw,
    Lose,
}

/// Snapshot of the most recent battle, surfaced through the move reply and
/// the game view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleInfo {
    pub battle_id: BattleId,
    pub player_id: PlayerId,
    pub monster: ItemName,
    pub monster_hp: u32,
    pub dice: [u32; DICE_PER_BATTLE],
    pub weapon_damage: u32,
    pub consumable_damage: u32,
    pub total_damage: u32,
    pub result: BattleResult,
    pub from: FieldPlace,
    pub to: FieldPlace,
    /// True after phase 1 when the preview was not an outright win.
    pub needs_consumable_confirmation: bool,
    pub available_consumables: Vec<Item>,
}

/// The field aggregate — placed tiles, items, frontier, dice source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub game_id: GameId,
    pub version: u64,
    /// Placed tiles keyed by `FieldPlace::key()`.
    pub tiles: BTreeMap<String, PlacedTile>,
    /// Items lying on room tiles, keyed by `FieldPlace::key()`.
    pub items: BTreeMap<String, Item>,
    /// Cells where the next tile may legally go, sorted.
    pub available_places: Vec<FieldPlace>,
    /// All placed teleportation gates; they form a movement clique.
    pub teleport_gates: Vec<FieldPlace>,
    /// The tile currently held by the turn owner between pick and place.
    pub picked_tile: Option<Tile>,
    pub last_battle: Option<BattleInfo>,
    /// Dice PRNG, cryptographically seeded at creation and persisted so
    /// rolls commit with the transaction.
    pub rng: Xoshiro256StarStar,
    /// Deterministic dice list, consumed cyclically when non-empty.
    pub dice_overrides: Vec<u32>,
    pub dice_cursor: usize,
}

impl Field {
    pub fn new(game_id: GameId, rng_seed: u64, dice_overrides: Vec<u32>) -> Self {
        Self {
            game_id,
            version: 0,
            tiles: BTreeMap::new(),
            items: BTreeMap::new(),
            available_places: Vec::new(),
            teleport_gates: Vec::new(),
            picked_tile: None,
            last_battle: None,
            rng: Xoshiro256StarStar::seed_from_u64(rng_seed),
            dice_overrides,
            dice_cursor: 0,
        }
    }

    pub fn tile_at(&self, place: FieldPlace) -> Option<&PlacedTile> {
        self.tiles.get(&place.key())
    }

    pub fn item_at(&self, place: FieldPlace) -> Option<&Item> {
        self.items.get(&place.key())
    }

    pub fn is_available(&self, place: FieldPlace) -> bool {
        self.available_places.contains(&place)
    }
}

// =============================================================================
// Movement
// =============================================================================

/// The movement aggregate — player positions and the connectivity graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub game_id: GameId,
    pub version: u64,
    pub positions: BTreeMap<PlayerId, FieldPlace>,
    /// Bidirectional open-edge adjacency, keyed by `FieldPlace::key()`.
    pub edges: BTreeMap<String, Vec<FieldPlace>>,
    /// Teleportation gates, mutually reachable in one move.
    pub teleport_gates: Vec<FieldPlace>,
    /// Players locked out of further movement this turn by a battle.
    pub post_battle_locks: BTreeMap<PlayerId, TurnId>,
}

impl Movement {
    pub fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            version: 0,
            positions: BTreeMap::new(),
            edges: BTreeMap::new(),
            teleport_gates: Vec::new(),
            post_battle_locks: BTreeMap::new(),
        }
    }

    pub fn position_of(&self, player_id: PlayerId) -> Option<FieldPlace> {
        self.positions.get(&player_id).copied()
    }

    /// Is `to` reachable from `from` in one move (edge or gate clique)?
    pub fn is_connected(&self, from: FieldPlace, to: FieldPlace) -> bool {
        if from == to {
            return false;
        }
        if let Some(neighbors) = self.edges.get(&from.key()) {
            if neighbors.contains(&to) {
                return true;
            }
        }
        self.teleport_gates.contains(&from) && self.teleport_gates.contains(&to)
    }
}

// =============================================================================
// Battle
// =============================================================================

/// The battle aggregate — one encounter, possibly paused between its
/// weapons-only preview and the consumable commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub turn_id: TurnId,
    pub version: u64,
    /// Snapshot of the guarded item being fought.
    pub monster: Item,
    pub from: FieldPlace,
    pub to: FieldPlace,
    pub dice: [u32; DICE_PER_BATTLE],
    pub weapon_damage: u32,
    pub used_items: Vec<ItemId>,
    pub total_damage: u32,
    pub preview_result: BattleResult,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemName, ItemType};

    fn weapon(t: ItemType) -> Item {
        Item::new(ItemName::Chest, t, 0)
    }

    #[test]
    fn inventory_caps() {
        let mut inv = Inventory::default();
        inv.insert(weapon(ItemType::Sword));
        inv.insert(weapon(ItemType::Dagger));
        assert!(inv.is_full(ItemCategory::Weapon));
        assert!(!inv.is_full(ItemCategory::Treasure));
        assert_eq!(inv.weapon_damage(), 3);
    }

    #[test]
    fn inventory_remove_searches_all_slots() {
        let mut inv = Inventory::default();
        let key = Item::new(ItemName::SkeletonTurnkey, ItemType::Key, 0);
        let key_id = key.id;
        inv.insert(key);
        inv.insert(weapon(ItemType::Axe));
        let removed = inv.remove(key_id).unwrap();
        assert_eq!(removed.id, key_id);
        assert!(!inv.has_key());
        assert_eq!(inv.remove(key_id), None);
    }

    #[test]
    fn treasure_score_sums_values() {
        let mut inv = Inventory::default();
        inv.insert(Item::new(ItemName::Chest, ItemType::Chest, 0));
        inv.insert(Item::new(ItemName::Dragon, ItemType::RubyChest, 15));
        assert_eq!(inv.treasure_score(), 5);
    }

    #[test]
    fn counted_actions_match_the_table() {
        for action in [
            TurnAction::Move,
            TurnAction::PickTile,
            TurnAction::PickItem,
            TurnAction::UseSpell,
            TurnAction::HealAtFountain,
            TurnAction::TeleportSpell,
        ] {
            assert!(action.counted(), "{action:?} should count");
        }
        for action in [
            TurnAction::FightMonster,
            TurnAction::RotateTile,
            TurnAction::PlaceTile,
            TurnAction::EndTurn,
        ] {
            assert!(!action.counted(), "{action:?} should not count");
        }
    }

    #[test]
    fn end_of_turn_actions() {
        assert!(TurnAction::HealAtFountain.ends_turn());
        assert!(TurnAction::TeleportSpell.ends_turn());
        assert!(TurnAction::EndTurn.ends_turn());
        assert!(!TurnAction::Move.ends_turn());
    }

    #[test]
    fn movement_connectivity() {
        let mut movement = Movement::new(GameId::generate());
        let a = FieldPlace::new(0, 0);
        let b = FieldPlace::new(1, 0);
        movement.edges.insert(a.key(), vec![b]);
        movement.edges.insert(b.key(), vec![a]);
        assert!(movement.is_connected(a, b));
        assert!(!movement.is_connected(a, FieldPlace::new(5, 5)));
        assert!(!movement.is_connected(a, a));

        let g1 = FieldPlace::new(4, 4);
        let g2 = FieldPlace::new(-3, 2);
        movement.teleport_gates.extend([g1, g2]);
        assert!(movement.is_connected(g1, g2));
        assert!(!movement.is_connected(a, g2));
    }

    #[test]
    fn field_serde_round_trip() {
        let mut field = Field::new(GameId::generate(), 42, vec![6, 6]);
        field.items.insert(
            FieldPlace::new(1, 0).key(),
            Item::new(ItemName::GiantRat, ItemType::Dagger, 5),
        );
        let json = serde_json::to_string(&field).unwrap();
        let back: Field = serde_json::from_str(&json).unwrap();
        assert_eq!(back.game_id, field.game_id);
        assert_eq!(back.dice_overrides, vec![6, 6]);
        assert!(back.item_at(FieldPlace::new(1, 0)).is_some());
    }
}
