//! Core types for the delve dungeon engine.
//!
//! Identifiers, grid geometry, tile orientation, items, aggregate state
//! structs, command/event messages, the error taxonomy, and the view model.
//! Everything here is serde-serializable; no game logic lives in this crate.

pub mod error;
pub mod ids;
pub mod item;
pub mod messages;
pub mod position;
pub mod state;
pub mod tile;
pub mod view;
