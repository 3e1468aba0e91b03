//! Tile orientation and the tile entity.
//!
//! An orientation is a four-bit mask of open sides in TRBL order, so the
//! cross is `1111`, the T is `1110`, the corner `1100` and the straight
//! corridor `1010`. Rotating a tile clockwise cyclically shifts the mask.

use bitflags::bitflags;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::ids::TileId;
use crate::position::Side;

bitflags! {
    /// Open sides of a tile, packed TRBL (TOP is the high bit).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TileOrientation: u8 {
        const TOP    = 0b1000;
        const RIGHT  = 0b0100;
        const BOTTOM = 0b0010;
        const LEFT   = 0b0001;
    }
}

impl TileOrientation {
    /// `1111` — open on all four sides.
    pub const CROSS: Self = Self::from_bits_truncate(0b1111);
    /// `1110` — open everywhere but the left.
    pub const TEE: Self = Self::from_bits_truncate(0b1110);
    /// `1100` — top/right corner.
    pub const CORNER: Self = Self::from_bits_truncate(0b1100);
    /// `1010` — vertical straight.
    pub const STRAIGHT: Self = Self::from_bits_truncate(0b1010);

    const fn side_bit(side: Side) -> Self {
        match side {
            Side::Top => Self::TOP,
            Side::Right => Self::RIGHT,
            Side::Bottom => Self::BOTTOM,
            Side::Left => Self::LEFT,
        }
    }

    /// Is the given side open?
    pub fn is_open(self, side: Side) -> bool {
        self.contains(Self::side_bit(side))
    }

    /// Rotate 90° clockwise: TOP→RIGHT→BOTTOM→LEFT→TOP.
    pub fn rotated_clockwise(self) -> Self {
        let bits = self.bits();
        Self::from_bits_truncate((bits >> 1) | ((bits & 0b0001) << 3))
    }

    /// Rotate clockwise `steps` times.
    pub fn rotated(self, steps: u8) -> Self {
        (0..steps % 4).fold(self, |mask, _| mask.rotated_clockwise())
    }

    /// Number of open sides.
    pub fn open_count(self) -> u32 {
        self.bits().count_ones()
    }

    /// The TRBL mask string, e.g. `"1110"`.
    pub fn mask_string(self) -> String {
        Side::ALL
            .iter()
            .map(|&side| if self.is_open(side) { '1' } else { '0' })
            .collect()
    }

    /// Parse a TRBL mask string.
    pub fn from_mask_string(mask: &str) -> Option<Self> {
        if mask.len() != 4 {
            return None;
        }
        let mut bits = 0u8;
        for (i, c) in mask.chars().enumerate() {
            match c {
                '1' => bits |= 1 << (3 - i),
                '0' => {}
                _ => return None,
            }
        }
        Some(Self::from_bits_truncate(bits))
    }
}

// Orientations persist as the four-character TRBL string.
impl Serialize for TileOrientation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.mask_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TileOrientation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mask = String::deserialize(deserializer)?;
        Self::from_mask_string(&mask)
            .ok_or_else(|| D::Error::custom(format!("invalid orientation mask {mask:?}")))
    }
}

/// Special features a tile can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileFeature {
    HealingFountain,
    TeleportationGate,
}

/// A drawn tile: orientation plus whether it is a room.
///
/// Lifecycle: template in the deck → picked (held by the turn owner, may be
/// rotated) → placed on the field (frozen).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub orientation: TileOrientation,
    pub room: bool,
    pub features: Vec<TileFeature>,
}

impl Tile {
    pub fn has_feature(&self, feature: TileFeature) -> bool {
        self.features.contains(&feature)
    }
}

/// A tile blueprint in the deck, before it gets an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileTemplate {
    pub orientation: TileOrientation,
    pub room: bool,
    pub features: Vec<TileFeature>,
}

impl TileTemplate {
    pub fn corridor(orientation: TileOrientation) -> Self {
        Self {
            orientation,
            room: false,
            features: Vec::new(),
        }
    }

    pub fn room(orientation: TileOrientation) -> Self {
        Self {
            orientation,
            room: true,
            features: Vec::new(),
        }
    }

    pub fn with_feature(mut self, feature: TileFeature) -> Self {
        self.features.push(feature);
        self
    }

    /// Instantiate the template as a drawn tile.
    pub fn into_tile(self) -> Tile {
        Tile {
            id: TileId::generate(),
            orientation: self.orientation,
            room: self.room,
            features: self.features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn canonical_masks() {
        assert_eq!(TileOrientation::CROSS.mask_string(), "1111");
        assert_eq!(TileOrientation::TEE.mask_string(), "1110");
        assert_eq!(TileOrientation::CORNER.mask_string(), "1100");
        assert_eq!(TileOrientation::STRAIGHT.mask_string(), "1010");
    }

    #[test]
    fn clockwise_rotation_shifts_top_to_right() {
        let mask = TileOrientation::TOP;
        assert_eq!(mask.rotated_clockwise(), TileOrientation::RIGHT);
        assert_eq!(
            mask.rotated_clockwise().rotated_clockwise(),
            TileOrientation::BOTTOM
        );
    }

    #[test]
    fn corner_rotations() {
        // 1100 → 0110 → 0011 → 1001 → 1100
        let corner = TileOrientation::CORNER;
        assert_eq!(corner.rotated(1).mask_string(), "0110");
        assert_eq!(corner.rotated(2).mask_string(), "0011");
        assert_eq!(corner.rotated(3).mask_string(), "1001");
        assert_eq!(corner.rotated(4), corner);
    }

    #[test]
    fn mask_string_round_trip() {
        for bits in 0..16u8 {
            let mask = TileOrientation::from_bits_truncate(bits);
            assert_eq!(
                TileOrientation::from_mask_string(&mask.mask_string()),
                Some(mask)
            );
        }
    }

    #[test]
    fn serde_uses_the_mask_string() {
        let json = serde_json::to_string(&TileOrientation::TEE).unwrap();
        assert_eq!(json, "\"1110\"");
        let back: TileOrientation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TileOrientation::TEE);
    }

    proptest! {
        #[test]
        fn four_rotations_are_identity(bits in 0u8..16) {
            let mask = TileOrientation::from_bits_truncate(bits);
            prop_assert_eq!(mask.rotated(4), mask);
        }

        #[test]
        fn rotation_preserves_open_count(bits in 0u8..16, steps in 0u8..4) {
            let mask = TileOrientation::from_bits_truncate(bits);
            prop_assert_eq!(mask.rotated(steps).open_count(), mask.open_count());
        }

        #[test]
        fn rotation_moves_each_open_side_clockwise(steps in 1u8..4) {
            let mask = TileOrientation::TOP;
            let rotated = mask.rotated(steps);
            let expected = match steps {
                1 => Side::Right,
                2 => Side::Bottom,
                _ => Side::Left,
            };
            prop_assert!(rotated.is_open(expected));
            prop_assert_eq!(rotated.open_count(), 1);
        }
    }
}
