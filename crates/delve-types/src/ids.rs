//! Newtype ID types for type safety.
//!
//! Each ID wraps a v7 UUID so identifiers sort by creation time. The server
//! generates them with [`Uuid::now_v7`]; clients may supply their own for
//! idempotent retries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh time-ordered identifier.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            pub const fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// One game session.
    GameId
);

define_id!(
    /// A player within a game.
    PlayerId
);

define_id!(
    /// One turn of one player.
    TurnId
);

define_id!(
    /// A tile drawn from the deck.
    TileId
);

define_id!(
    /// One battle encounter.
    BattleId
);

define_id!(
    /// An item instance (monster, chest, loot).
    ItemId
);

define_id!(
    /// A command or event message envelope.
    MessageId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = GameId::generate();
        let b = GameId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn v7_ids_sort_by_creation() {
        let ids: Vec<TurnId> = (0..16).map(|_| TurnId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = PlayerId::generate();
        let json = serde_json::to_string(&id).unwrap();
        // Plain UUID string, no wrapper object.
        assert!(json.starts_with('"') && json.ends_with('"'));
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
