//! Static rulebook content for the delve engine.
//!
//! Monster stat lines, the classic deck composition, and the classic bag
//! distribution. Pure data, no game logic.

pub mod items;
pub mod monsters;
pub mod tiles;
