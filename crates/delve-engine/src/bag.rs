//! The bag — ordered draw pile of room contents.
//!
//! Populated when the deck announces its room count. The dragon is appended
//! last before the shuffle so it is always inside; a deterministic item
//! sequence is installed verbatim and never shuffled.

use rand::seq::SliceRandom;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use delve_types::error::EngineError;
use delve_types::item::Item;
use delve_types::messages::{Event, EventEnvelope, EventKind};
use delve_types::state::Bag;

use crate::bus::{MessageBus, TxContext};

pub fn register(bus: &mut MessageBus) {
    bus.register_event(EventKind::DeckCreated, on_deck_created);
}

fn on_deck_created(ctx: &mut TxContext<'_>, envelope: &EventEnvelope) -> Result<(), EngineError> {
    let Event::DeckCreated {
        game_id,
        room_count,
    } = envelope.event
    else {
        return Ok(());
    };

    let installed = ctx
        .tx
        .overrides
        .as_ref()
        .and_then(|o| o.item_sequence.clone());

    let items = match installed {
        Some(sequence) => sequence,
        None => {
            let mut items = delve_data::items::classic_bag(room_count);
            let mut rng = Xoshiro256StarStar::seed_from_u64(ctx.tx.next_seed());
            items.shuffle(&mut rng);
            items
        }
    };

    ctx.tx.put_bag(game_id, Bag::new(game_id, items.into()));
    Ok(())
}

/// Pop the head of the pile.
pub(crate) fn pick_next(bag: &mut Bag) -> Result<Item, EngineError> {
    bag.items.pop_front().ok_or(EngineError::NoItemsLeftInBag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_types::ids::GameId;
    use delve_types::item::{ItemName, ItemType};

    #[test]
    fn pick_next_pops_the_head_and_fails_when_empty() {
        let mut bag = Bag::new(
            GameId::generate(),
            vec![Item::new(ItemName::GiantRat, ItemType::Dagger, 5)].into(),
        );
        let item = pick_next(&mut bag).unwrap();
        assert_eq!(item.name, ItemName::GiantRat);
        assert_eq!(pick_next(&mut bag), Err(EngineError::NoItemsLeftInBag));
    }
}
