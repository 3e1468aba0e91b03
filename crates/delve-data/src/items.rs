//! Classic bag distribution.
//!
//! The bag holds one item per room tile. Contents come from a repeating
//! 8-item cycle of guarded loot and chests; the dragon is always appended
//! last so it is in the bag regardless of size, and the caller shuffles the
//! whole pile (outside deterministic mode).

use delve_types::item::{Item, ItemName, ItemType};

use crate::monsters::get_monster;

/// Build a guarded item: the monster's HP becomes the guard HP.
pub fn guarded(name: ItemName, loot: ItemType) -> Item {
    Item::new(name, loot, get_monster(name).hp)
}

/// An unguarded chest.
pub fn chest() -> Item {
    Item::new(ItemName::Chest, ItemType::Chest, 0)
}

/// The dragon guarding the ruby chest that ends the game.
pub fn dragon() -> Item {
    guarded(ItemName::Dragon, ItemType::RubyChest)
}

/// One cycle of the classic distribution, repeated to fill the bag.
fn classic_cycle() -> [Item; 8] {
    [
        guarded(ItemName::GiantRat, ItemType::Dagger),
        guarded(ItemName::GiantSpider, ItemType::Sword),
        guarded(ItemName::SkeletonTurnkey, ItemType::Key),
        guarded(ItemName::Mummy, ItemType::Fireball),
        chest(),
        guarded(ItemName::SkeletonWarrior, ItemType::Axe),
        guarded(ItemName::SkeletonKing, ItemType::Teleport),
        guarded(ItemName::Fallen, ItemType::Chest),
    ]
}

/// Build the classic bag for the given number of rooms, unshuffled.
///
/// `room_count - 1` items from the cycle, then the dragon.
pub fn classic_bag(room_count: u32) -> Vec<Item> {
    let mut items = Vec::with_capacity(room_count as usize);
    if room_count == 0 {
        return items;
    }
    let cycle = classic_cycle();
    for i in 0..(room_count as usize - 1) {
        // Each cycle slot is a fresh Item so ids stay unique.
        let template = &cycle[i % cycle.len()];
        items.push(Item::new(
            template.name,
            template.item_type,
            template.guard_hp,
        ));
    }
    items.push(dragon());
    items
}
