//! Static monster definitions.
//!
//! Each monster is a `&'static MonsterDefinition` returned by
//! `get_monster(name)`. Compile-time constants, zero-allocation lookups.

use delve_types::item::ItemName;

/// Complete static monster stat line.
#[derive(Debug)]
pub struct MonsterDefinition {
    pub name: ItemName,
    pub display_name: &'static str,
    pub hp: u32,
}

static DRAGON: MonsterDefinition = MonsterDefinition {
    name: ItemName::Dragon,
    display_name: "Dragon",
    hp: 15,
};

static FALLEN: MonsterDefinition = MonsterDefinition {
    name: ItemName::Fallen,
    display_name: "Fallen",
    hp: 12,
};

static SKELETON_KING: MonsterDefinition = MonsterDefinition {
    name: ItemName::SkeletonKing,
    display_name: "Skeleton King",
    hp: 10,
};

static SKELETON_WARRIOR: MonsterDefinition = MonsterDefinition {
    name: ItemName::SkeletonWarrior,
    display_name: "Skeleton Warrior",
    hp: 9,
};

static SKELETON_TURNKEY: MonsterDefinition = MonsterDefinition {
    name: ItemName::SkeletonTurnkey,
    display_name: "Skeleton Turnkey",
    hp: 8,
};

static MUMMY: MonsterDefinition = MonsterDefinition {
    name: ItemName::Mummy,
    display_name: "Mummy",
    hp: 7,
};

static GIANT_SPIDER: MonsterDefinition = MonsterDefinition {
    name: ItemName::GiantSpider,
    display_name: "Giant Spider",
    hp: 6,
};

static GIANT_RAT: MonsterDefinition = MonsterDefinition {
    name: ItemName::GiantRat,
    display_name: "Giant Rat",
    hp: 5,
};

static CHEST: MonsterDefinition = MonsterDefinition {
    name: ItemName::Chest,
    display_name: "Chest",
    hp: 0,
};

/// Look up a monster's stat line.
pub fn get_monster(name: ItemName) -> &'static MonsterDefinition {
    match name {
        ItemName::Dragon => &DRAGON,
        ItemName::Fallen => &FALLEN,
        ItemName::SkeletonKing => &SKELETON_KING,
        ItemName::SkeletonWarrior => &SKELETON_WARRIOR,
        ItemName::SkeletonTurnkey => &SKELETON_TURNKEY,
        ItemName::Mummy => &MUMMY,
        ItemName::GiantSpider => &GIANT_SPIDER,
        ItemName::GiantRat => &GIANT_RAT,
        ItemName::Chest => &CHEST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hp_table() {
        assert_eq!(get_monster(ItemName::Dragon).hp, 15);
        assert_eq!(get_monster(ItemName::Fallen).hp, 12);
        assert_eq!(get_monster(ItemName::SkeletonKing).hp, 10);
        assert_eq!(get_monster(ItemName::SkeletonWarrior).hp, 9);
        assert_eq!(get_monster(ItemName::SkeletonTurnkey).hp, 8);
        assert_eq!(get_monster(ItemName::Mummy).hp, 7);
        assert_eq!(get_monster(ItemName::GiantSpider).hp, 6);
        assert_eq!(get_monster(ItemName::GiantRat).hp, 5);
        assert_eq!(get_monster(ItemName::Chest).hp, 0);
    }
}
