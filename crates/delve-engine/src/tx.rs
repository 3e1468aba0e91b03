//! The transaction — one command's unit of work.
//!
//! Aggregates load lazily through a finder cache, so every lookup within the
//! same transaction returns the same instance. Emitted events accumulate
//! here (external ones staged for the outbox) and everything serializes into
//! compare-and-swap writes at commit. Dropping the transaction without
//! committing is the rollback.

use std::collections::BTreeMap;
use std::sync::Arc;

use delve_types::error::EngineError;
use delve_types::ids::{BattleId, GameId, MessageId, PlayerId, TurnId};
use delve_types::messages::{Event, EventEnvelope};
use delve_types::state::{Bag, Battle, Deck, Field, Game, Movement, Player, Timestamp, Turn};

use crate::engine::{GameOverrides, Randomness};
use crate::store::{AggregateKey, PendingOutbox, Store, StoredWrite};

/// Serialize an aggregate with its bumped version into a write row.
fn write_row<T: serde::Serialize>(
    key: AggregateKey,
    expected_version: Option<u64>,
    aggregate: &T,
) -> Result<StoredWrite, EngineError> {
    let body = serde_json::to_value(aggregate)
        .map_err(|e| EngineError::Internal(format!("serialize {}: {e}", key.kind_name())))?;
    Ok(StoredWrite {
        key,
        expected_version,
        body,
    })
}

fn decode<T: serde::de::DeserializeOwned>(
    key: AggregateKey,
    body: serde_json::Value,
) -> Result<T, EngineError> {
    serde_json::from_value(body)
        .map_err(|e| EngineError::Internal(format!("deserialize {}: {e}", key.kind_name())))
}

/// One command's unit of work: finder cache + event log + staged outbox.
pub struct Transaction {
    store: Arc<dyn Store>,
    randomness: Arc<dyn Randomness>,
    pub now: Timestamp,
    /// Deterministic seam for this game, when installed.
    pub overrides: Option<GameOverrides>,

    games: BTreeMap<GameId, Game>,
    fields: BTreeMap<GameId, Field>,
    movements: BTreeMap<GameId, Movement>,
    decks: BTreeMap<GameId, Deck>,
    bags: BTreeMap<GameId, Bag>,
    players: BTreeMap<PlayerId, Player>,
    turns: BTreeMap<TurnId, Turn>,
    battles: BTreeMap<BattleId, Battle>,
    /// Version each row had at load; absent for aggregates created here.
    loaded_versions: BTreeMap<AggregateKey, u64>,

    pub events: Vec<EventEnvelope>,
    outbox: Vec<PendingOutbox>,
}

macro_rules! finder {
    ($fetch:ident, $put:ident, $map:ident, $ty:ty, $id_ty:ty, $key:path, $missing:expr) => {
        /// Load through the finder cache; the same id always yields the same
        /// instance within this transaction.
        pub fn $fetch(&mut self, id: $id_ty) -> Result<&mut $ty, EngineError> {
            if !self.$map.contains_key(&id) {
                let key = $key(id);
                let row = self.store.load(key)?.ok_or_else(|| $missing(id))?;
                self.loaded_versions.insert(key, row.version);
                let aggregate: $ty = decode(key, row.body)?;
                self.$map.insert(id, aggregate);
            }
            Ok(self.$map.get_mut(&id).unwrap())
        }

        /// Register an aggregate created inside this transaction.
        pub fn $put(&mut self, id: $id_ty, aggregate: $ty) {
            self.$map.insert(id, aggregate);
        }
    };
}

impl Transaction {
    pub fn new(
        store: Arc<dyn Store>,
        randomness: Arc<dyn Randomness>,
        now: Timestamp,
        overrides: Option<GameOverrides>,
    ) -> Self {
        Self {
            store,
            randomness,
            now,
            overrides,
            games: BTreeMap::new(),
            fields: BTreeMap::new(),
            movements: BTreeMap::new(),
            decks: BTreeMap::new(),
            bags: BTreeMap::new(),
            players: BTreeMap::new(),
            turns: BTreeMap::new(),
            battles: BTreeMap::new(),
            loaded_versions: BTreeMap::new(),
            events: Vec::new(),
            outbox: Vec::new(),
        }
    }

    finder!(game, put_game, games, Game, GameId, AggregateKey::Game, EngineError::GameNotFound);
    finder!(
        field,
        put_field,
        fields,
        Field,
        GameId,
        AggregateKey::Field,
        |id| EngineError::Internal(format!("field missing for game {id}"))
    );
    finder!(
        movement,
        put_movement,
        movements,
        Movement,
        GameId,
        AggregateKey::Movement,
        |id| EngineError::Internal(format!("movement missing for game {id}"))
    );
    finder!(
        deck,
        put_deck,
        decks,
        Deck,
        GameId,
        AggregateKey::Deck,
        |id| EngineError::Internal(format!("deck missing for game {id}"))
    );
    finder!(bag, put_bag, bags, Bag, GameId, AggregateKey::Bag, |id| {
        EngineError::Internal(format!("bag missing for game {id}"))
    });
    finder!(
        player,
        put_player,
        players,
        Player,
        PlayerId,
        AggregateKey::Player,
        EngineError::PlayerNotFound
    );
    finder!(turn, put_turn, turns, Turn, TurnId, AggregateKey::Turn, EngineError::TurnNotFound);
    finder!(
        battle,
        put_battle,
        battles,
        Battle,
        BattleId,
        AggregateKey::Battle,
        EngineError::BattleNotFound
    );

    /// Does a game row exist, in cache or in the store?
    pub fn game_exists(&mut self, id: GameId) -> Result<bool, EngineError> {
        if self.games.contains_key(&id) {
            return Ok(true);
        }
        Ok(self.store.load(AggregateKey::Game(id))?.is_some())
    }

    /// Fresh seed from the engine's randomness service.
    pub fn next_seed(&self) -> u64 {
        self.randomness.next_seed()
    }

    /// Record an emitted event; external events are staged for the outbox.
    pub fn record_event(&mut self, event: Event) -> EventEnvelope {
        let envelope = EventEnvelope {
            id: MessageId::generate(),
            game_id: event.game_id(),
            event,
        };
        if envelope.event.is_external() {
            self.outbox.push(PendingOutbox {
                message_id: envelope.id,
                game_id: envelope.game_id,
                event: envelope.event.clone(),
                created_at: self.now,
            });
        }
        self.events.push(envelope.clone());
        envelope
    }

    /// Serialize every touched aggregate into compare-and-swap writes.
    pub fn into_commit(mut self) -> Result<(Vec<StoredWrite>, Vec<PendingOutbox>), EngineError> {
        let mut writes = Vec::new();

        macro_rules! drain_map {
            ($map:ident, $key:path) => {
                for (id, aggregate) in std::mem::take(&mut self.$map) {
                    let key = $key(id);
                    let expected = self.loaded_versions.get(&key).copied();
                    let mut aggregate = aggregate;
                    aggregate.version = expected.unwrap_or(0) + 1;
                    writes.push(write_row(key, expected, &aggregate)?);
                }
            };
        }

        drain_map!(games, AggregateKey::Game);
        drain_map!(fields, AggregateKey::Field);
        drain_map!(movements, AggregateKey::Movement);
        drain_map!(decks, AggregateKey::Deck);
        drain_map!(bags, AggregateKey::Bag);
        drain_map!(players, AggregateKey::Player);
        drain_map!(turns, AggregateKey::Turn);
        drain_map!(battles, AggregateKey::Battle);

        Ok((writes, self.outbox))
    }
}
