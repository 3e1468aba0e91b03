//! The deck — ordered draw pile of tile templates.
//!
//! Built on `GameCreated`. Classic games shuffle everything behind the
//! starting tile; a deterministic tile sequence is installed verbatim and
//! never shuffled. Either way the starting fountain room is the head.

use rand::seq::SliceRandom;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use delve_types::error::EngineError;
use delve_types::messages::{Event, EventEnvelope, EventKind};
use delve_types::state::Deck;
use delve_types::tile::TileTemplate;

use crate::bus::{MessageBus, TxContext};

pub fn register(bus: &mut MessageBus) {
    bus.register_event(EventKind::GameCreated, on_game_created);
}

fn on_game_created(ctx: &mut TxContext<'_>, envelope: &EventEnvelope) -> Result<(), EngineError> {
    let Event::GameCreated { game_id, deck_size } = envelope.event else {
        return Ok(());
    };

    let installed = ctx
        .tx
        .overrides
        .as_ref()
        .and_then(|o| o.tile_sequence.clone());

    let tiles = match installed {
        Some(sequence) => {
            let mut tiles = vec![delve_data::tiles::starting_tile()];
            tiles.extend(sequence);
            tiles
        }
        None => {
            let mut tiles = delve_data::tiles::classic_deck(deck_size);
            let mut rng = Xoshiro256StarStar::seed_from_u64(ctx.tx.next_seed());
            tiles[1..].shuffle(&mut rng);
            tiles
        }
    };

    let room_count = tiles.iter().skip(1).filter(|t| t.room).count() as u32;
    ctx.tx.put_deck(game_id, Deck::new(game_id, tiles.into()));

    ctx.emit(Event::DeckCreated {
        game_id,
        room_count,
    })?;
    Ok(())
}

/// Pop the head of the pile.
pub(crate) fn pick_next(deck: &mut Deck) -> Result<TileTemplate, EngineError> {
    deck.tiles.pop_front().ok_or(EngineError::NoTilesLeftInDeck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_types::ids::GameId;
    use delve_types::tile::TileOrientation;

    #[test]
    fn pick_next_pops_the_head_and_fails_when_empty() {
        let mut deck = Deck::new(
            GameId::generate(),
            vec![
                TileTemplate::corridor(TileOrientation::STRAIGHT),
                TileTemplate::room(TileOrientation::CROSS),
            ]
            .into(),
        );
        let first = pick_next(&mut deck).unwrap();
        assert!(!first.room);
        let second = pick_next(&mut deck).unwrap();
        assert!(second.room);
        assert_eq!(pick_next(&mut deck), Err(EngineError::NoTilesLeftInDeck));
    }
}
