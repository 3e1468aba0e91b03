//! Classic deck composition.
//!
//! The deck holds `deck_size + 1` templates: the starting room first, then a
//! fixed mix built from a repeating 11-tile cycle. The starting room is a
//! cross with a healing fountain, placed at (0,0) before play.

use delve_types::tile::{TileFeature, TileOrientation, TileTemplate};

/// The tile every game begins on.
pub fn starting_tile() -> TileTemplate {
    TileTemplate::room(TileOrientation::CROSS).with_feature(TileFeature::HealingFountain)
}

/// One cycle of the classic mix. Repeated (and truncated) to fill the deck.
///
/// Per 11 tiles: 3 straight corridors, 2 corners, 1 T, 1 cross corridor with
/// a teleportation gate, 2 corner rooms, 1 T room, 1 cross room with a
/// healing fountain.
fn classic_cycle() -> [TileTemplate; 11] {
    [
        TileTemplate::corridor(TileOrientation::STRAIGHT),
        TileTemplate::room(TileOrientation::CORNER),
        TileTemplate::corridor(TileOrientation::CORNER),
        TileTemplate::room(TileOrientation::TEE),
        TileTemplate::corridor(TileOrientation::STRAIGHT),
        TileTemplate::corridor(TileOrientation::CROSS)
            .with_feature(TileFeature::TeleportationGate),
        TileTemplate::room(TileOrientation::CORNER),
        TileTemplate::corridor(TileOrientation::TEE),
        TileTemplate::corridor(TileOrientation::STRAIGHT),
        TileTemplate::room(TileOrientation::CROSS).with_feature(TileFeature::HealingFountain),
        TileTemplate::corridor(TileOrientation::CORNER),
    ]
}

/// Build the classic deck: the starting tile followed by `deck_size`
/// templates from the repeating mix.
pub fn classic_deck(deck_size: u32) -> Vec<TileTemplate> {
    let mut tiles = Vec::with_capacity(deck_size as usize + 1);
    tiles.push(starting_tile());
    let cycle = classic_cycle();
    for i in 0..deck_size as usize {
        tiles.push(cycle[i % cycle.len()].clone());
    }
    tiles
}

/// Number of room tiles in a classic deck of the given size, starting tile
/// excluded (it never draws from the bag).
pub fn classic_room_count(deck_size: u32) -> u32 {
    classic_deck(deck_size)
        .iter()
        .skip(1)
        .filter(|t| t.room)
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_has_size_plus_one_tiles() {
        assert_eq!(classic_deck(88).len(), 89);
        assert_eq!(classic_deck(0).len(), 1);
    }

    #[test]
    fn first_tile_is_the_starting_fountain_room() {
        let deck = classic_deck(88);
        let start = &deck[0];
        assert!(start.room);
        assert_eq!(start.orientation, TileOrientation::CROSS);
        assert!(start.features.contains(&TileFeature::HealingFountain));
    }

    #[test]
    fn cycle_is_four_rooms_per_eleven() {
        assert_eq!(classic_room_count(11), 4);
        assert_eq!(classic_room_count(22), 8);
    }

    #[test]
    fn every_template_has_at_least_two_open_sides() {
        for tile in classic_deck(88) {
            assert!(tile.orientation.open_count() >= 2);
        }
    }
}
