//! Items — monsters, chests, and the loot they guard.
//!
//! An [`Item`] is what sits on a room tile: a monster guarding a typed piece
//! of loot, or an unguarded chest. The `item_type` is what ends up in a
//! player's inventory once the guard is down.

use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// Monster and chest names that can appear in the bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemName {
    GiantRat,
    GiantSpider,
    SkeletonTurnkey,
    SkeletonWarrior,
    SkeletonKing,
    Mummy,
    Fallen,
    Dragon,
    Chest,
}

/// What the item becomes in an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Key,
    Chest,
    RubyChest,
    Dagger,
    Sword,
    Axe,
    Fireball,
    Teleport,
}

/// Inventory slot category, derived from the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Key,
    Weapon,
    Spell,
    Treasure,
}

impl ItemType {
    pub const fn category(self) -> ItemCategory {
        match self {
            Self::Key => ItemCategory::Key,
            Self::Dagger | Self::Sword | Self::Axe => ItemCategory::Weapon,
            Self::Fireball | Self::Teleport => ItemCategory::Spell,
            Self::Chest | Self::RubyChest => ItemCategory::Treasure,
        }
    }

    /// Flat damage a weapon adds to every battle roll.
    pub const fn weapon_damage(self) -> u32 {
        match self {
            Self::Dagger => 1,
            Self::Sword => 2,
            Self::Axe => 3,
            _ => 0,
        }
    }

    /// Damage a consumable adds when committed to one battle.
    pub const fn consumable_damage(self) -> u32 {
        match self {
            Self::Fireball => 1,
            _ => 0,
        }
    }

    pub const fn treasure_value(self) -> u32 {
        match self {
            Self::Chest => 2,
            Self::RubyChest => 3,
            _ => 0,
        }
    }

    /// Chests stay locked without a key in the inventory.
    pub const fn requires_key(self) -> bool {
        matches!(self, Self::Chest | Self::RubyChest)
    }

    /// Only the dragon's ruby chest finishes the game.
    pub const fn ends_game(self) -> bool {
        matches!(self, Self::RubyChest)
    }
}

/// An item instance on the field or in an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: ItemName,
    pub item_type: ItemType,
    /// 0 for unguarded loot, otherwise the guarding monster's HP.
    pub guard_hp: u32,
    pub guard_defeated: bool,
}

impl Item {
    pub fn new(name: ItemName, item_type: ItemType, guard_hp: u32) -> Self {
        Self {
            id: ItemId::generate(),
            name,
            item_type,
            guard_hp,
            guard_defeated: false,
        }
    }

    pub fn category(&self) -> ItemCategory {
        self.item_type.category()
    }

    pub fn treasure_value(&self) -> u32 {
        self.item_type.treasure_value()
    }

    pub fn ends_game(&self) -> bool {
        self.item_type.ends_game()
    }

    /// An undefeated guard blocks both pickup and coexistence.
    pub fn has_live_guard(&self) -> bool {
        self.guard_hp > 0 && !self.guard_defeated
    }

    /// Spells that may be committed to a battle.
    pub fn is_battle_consumable(&self) -> bool {
        matches!(self.item_type, ItemType::Fireball | ItemType::Teleport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_derive_from_type() {
        assert_eq!(ItemType::Key.category(), ItemCategory::Key);
        assert_eq!(ItemType::Dagger.category(), ItemCategory::Weapon);
        assert_eq!(ItemType::Sword.category(), ItemCategory::Weapon);
        assert_eq!(ItemType::Axe.category(), ItemCategory::Weapon);
        assert_eq!(ItemType::Fireball.category(), ItemCategory::Spell);
        assert_eq!(ItemType::Teleport.category(), ItemCategory::Spell);
        assert_eq!(ItemType::Chest.category(), ItemCategory::Treasure);
        assert_eq!(ItemType::RubyChest.category(), ItemCategory::Treasure);
    }

    #[test]
    fn weapon_damage_ladder() {
        assert_eq!(ItemType::Dagger.weapon_damage(), 1);
        assert_eq!(ItemType::Sword.weapon_damage(), 2);
        assert_eq!(ItemType::Axe.weapon_damage(), 3);
        assert_eq!(ItemType::Key.weapon_damage(), 0);
    }

    #[test]
    fn chest_scores() {
        assert_eq!(ItemType::Chest.treasure_value(), 2);
        assert_eq!(ItemType::RubyChest.treasure_value(), 3);
    }

    #[test]
    fn only_ruby_chest_ends_the_game() {
        for t in [
            ItemType::Key,
            ItemType::Chest,
            ItemType::Dagger,
            ItemType::Sword,
            ItemType::Axe,
            ItemType::Fireball,
            ItemType::Teleport,
        ] {
            assert!(!t.ends_game());
        }
        assert!(ItemType::RubyChest.ends_game());
    }

    #[test]
    fn guard_state() {
        let mut item = Item::new(ItemName::GiantRat, ItemType::Dagger, 5);
        assert!(item.has_live_guard());
        item.guard_defeated = true;
        assert!(!item.has_live_guard());

        let chest = Item::new(ItemName::Chest, ItemType::Chest, 0);
        assert!(!chest.has_live_guard());
    }
}
