//! Square-grid coordinates and sides.
//!
//! The dungeon grows on an unbounded integer grid. `(0,0)` is the fixed
//! starting tile; y grows downward, so TOP of a cell is `(x, y-1)`.

use serde::{Deserialize, Serialize};

/// A cell on the dungeon grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldPlace {
    pub x: i32,
    pub y: i32,
}

impl FieldPlace {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The starting tile cell.
    pub const ZERO: FieldPlace = FieldPlace::new(0, 0);

    /// Get the neighbor through the given side.
    pub fn neighbor(self, side: Side) -> Self {
        let (dx, dy) = side.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// All 4 neighbors, in [`Side::ALL`] order.
    pub fn neighbors(self) -> [Self; 4] {
        Side::ALL.map(|side| self.neighbor(side))
    }

    /// String key for use in hash maps, `"x,y"`.
    pub fn key(self) -> String {
        format!("{},{}", self.x, self.y)
    }
}

impl std::fmt::Display for FieldPlace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// One of the four sides of a tile, in TRBL order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    pub const ALL: [Self; 4] = [Self::Top, Self::Right, Self::Bottom, Self::Left];

    /// Grid offset (dx, dy) for this side.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::Top => (0, -1),
            Self::Right => (1, 0),
            Self::Bottom => (0, 1),
            Self::Left => (-1, 0),
        }
    }

    /// The facing side on the adjacent tile.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Right => Self::Left,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
        }
    }

    /// Position in the TRBL mask (TOP = 0).
    pub const fn index(self) -> u8 {
        match self {
            Self::Top => 0,
            Self::Right => 1,
            Self::Bottom => 2,
            Self::Left => 3,
        }
    }

    /// Side between two adjacent cells, from `from`'s point of view.
    pub fn between(from: FieldPlace, to: FieldPlace) -> Option<Self> {
        Side::ALL.into_iter().find(|side| from.neighbor(*side) == to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_match_spec_offsets() {
        let p = FieldPlace::new(2, 3);
        assert_eq!(p.neighbor(Side::Top), FieldPlace::new(2, 2));
        assert_eq!(p.neighbor(Side::Right), FieldPlace::new(3, 3));
        assert_eq!(p.neighbor(Side::Bottom), FieldPlace::new(2, 4));
        assert_eq!(p.neighbor(Side::Left), FieldPlace::new(1, 3));
    }

    #[test]
    fn key_format() {
        assert_eq!(FieldPlace::new(3, -2).key(), "3,-2");
        assert_eq!(FieldPlace::ZERO.key(), "0,0");
    }

    #[test]
    fn opposite_sides_pair() {
        for side in Side::ALL {
            assert_eq!(side.opposite().opposite(), side);
        }
        assert_eq!(Side::Top.opposite(), Side::Bottom);
        assert_eq!(Side::Left.opposite(), Side::Right);
    }

    #[test]
    fn between_finds_the_shared_side() {
        let a = FieldPlace::new(0, 0);
        let b = FieldPlace::new(1, 0);
        assert_eq!(Side::between(a, b), Some(Side::Right));
        assert_eq!(Side::between(b, a), Some(Side::Left));
        assert_eq!(Side::between(a, FieldPlace::new(2, 2)), None);
    }
}
