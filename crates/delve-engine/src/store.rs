//! The aggregate store and the outbox.
//!
//! One logical row per aggregate, keyed by its id, with an integer version
//! column. Writes are compare-and-swap on the version the writer loaded; the
//! loser of a race gets a retryable [`EngineError::OptimisticLock`]. Outbox
//! rows are appended in the same commit and drained per-game FIFO by the
//! [`OutboxDispatcher`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use delve_types::error::EngineError;
use delve_types::ids::{BattleId, GameId, MessageId, PlayerId, TurnId};
use delve_types::messages::Event;
use delve_types::state::Timestamp;

use crate::engine::Clock;

// =============================================================================
// Keys and rows
// =============================================================================

/// Identity of one persisted aggregate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregateKey {
    Game(GameId),
    Field(GameId),
    Movement(GameId),
    Deck(GameId),
    Bag(GameId),
    Player(PlayerId),
    Turn(TurnId),
    Battle(BattleId),
}

impl AggregateKey {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Game(_) => "game",
            Self::Field(_) => "field",
            Self::Movement(_) => "movement",
            Self::Deck(_) => "deck",
            Self::Bag(_) => "bag",
            Self::Player(_) => "player",
            Self::Turn(_) => "turn",
            Self::Battle(_) => "battle",
        }
    }
}

/// A row as loaded from the store.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub key: AggregateKey,
    pub version: u64,
    pub body: serde_json::Value,
}

/// A row as written by a committing transaction.
///
/// `expected_version` is what the writer loaded; `None` means the row must
/// not exist yet. On success the stored version becomes `expected + 1`
/// (or 1 for an insert).
#[derive(Debug, Clone)]
pub struct StoredWrite {
    pub key: AggregateKey,
    pub expected_version: Option<u64>,
    pub body: serde_json::Value,
}

/// An event staged for external delivery, before the store assigns its
/// sequence number.
#[derive(Debug, Clone)]
pub struct PendingOutbox {
    pub message_id: MessageId,
    pub game_id: GameId,
    pub event: Event,
    pub created_at: Timestamp,
}

/// A committed outbox row.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub seq: u64,
    pub message_id: MessageId,
    pub game_id: GameId,
    pub event: Event,
    pub created_at: Timestamp,
    pub sent_at: Option<Timestamp>,
}

// =============================================================================
// Store contract
// =============================================================================

/// The persistence contract the engine programs against.
///
/// `commit` must be atomic: either every write passes its version check and
/// lands together with the outbox rows, or nothing changes.
pub trait Store: Send + Sync {
    fn load(&self, key: AggregateKey) -> Result<Option<StoredRow>, EngineError>;

    fn commit(
        &self,
        writes: Vec<StoredWrite>,
        outbox: Vec<PendingOutbox>,
    ) -> Result<(), EngineError>;

    /// Unsent outbox rows in `(game_id, seq)` order.
    fn unsent_outbox(&self) -> Result<Vec<OutboxRow>, EngineError>;

    fn mark_sent(&self, seq: u64, at: Timestamp) -> Result<(), EngineError>;
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    rows: BTreeMap<AggregateKey, (u64, serde_json::Value)>,
    outbox: Vec<OutboxRow>,
    next_seq: u64,
}

/// Reference [`Store`] backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn load(&self, key: AggregateKey) -> Result<Option<StoredRow>, EngineError> {
        let inner = self.lock();
        Ok(inner.rows.get(&key).map(|(version, body)| StoredRow {
            key,
            version: *version,
            body: body.clone(),
        }))
    }

    fn commit(
        &self,
        writes: Vec<StoredWrite>,
        outbox: Vec<PendingOutbox>,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();

        // Validate every version before touching anything.
        for write in &writes {
            let current = inner.rows.get(&write.key).map(|(v, _)| *v);
            if current != write.expected_version {
                return Err(EngineError::OptimisticLock {
                    aggregate: write.key.kind_name(),
                });
            }
        }

        for write in writes {
            let version = write.expected_version.unwrap_or(0) + 1;
            inner.rows.insert(write.key, (version, write.body));
        }

        for pending in outbox {
            let seq = inner.next_seq + 1;
            inner.next_seq = seq;
            inner.outbox.push(OutboxRow {
                seq,
                message_id: pending.message_id,
                game_id: pending.game_id,
                event: pending.event,
                created_at: pending.created_at,
                sent_at: None,
            });
        }

        Ok(())
    }

    fn unsent_outbox(&self) -> Result<Vec<OutboxRow>, EngineError> {
        let inner = self.lock();
        let mut rows: Vec<OutboxRow> = inner
            .outbox
            .iter()
            .filter(|row| row.sent_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.game_id, row.seq));
        Ok(rows)
    }

    fn mark_sent(&self, seq: u64, at: Timestamp) -> Result<(), EngineError> {
        let mut inner = self.lock();
        if let Some(row) = inner.outbox.iter_mut().find(|row| row.seq == seq) {
            row.sent_at = Some(at);
        }
        Ok(())
    }
}

// =============================================================================
// Outbox dispatcher
// =============================================================================

/// Drains the outbox to a consumer, at-least-once, FIFO per game.
///
/// The consumer runs before the row is marked sent, so a crash in between
/// redelivers; consumers dedupe on `message_id`.
pub struct OutboxDispatcher {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Deliver all unsent rows. Returns how many were forwarded.
    pub fn drain(
        &self,
        mut consumer: impl FnMut(&OutboxRow),
    ) -> Result<usize, EngineError> {
        let rows = self.store.unsent_outbox()?;
        for row in &rows {
            consumer(row);
            self.store.mark_sent(row.seq, self.clock.now())?;
        }
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedClock;
    use serde_json::json;

    fn key() -> AggregateKey {
        AggregateKey::Game(GameId::generate())
    }

    #[test]
    fn insert_then_load() {
        let store = MemoryStore::new();
        let k = key();
        store
            .commit(
                vec![StoredWrite {
                    key: k,
                    expected_version: None,
                    body: json!({"hello": 1}),
                }],
                vec![],
            )
            .unwrap();
        let row = store.load(k).unwrap().unwrap();
        assert_eq!(row.version, 1);
        assert_eq!(row.body["hello"], 1);
    }

    #[test]
    fn stale_write_is_rejected_and_commit_is_atomic() {
        let store = MemoryStore::new();
        let k1 = key();
        let k2 = key();
        store
            .commit(
                vec![StoredWrite {
                    key: k1,
                    expected_version: None,
                    body: json!(1),
                }],
                vec![],
            )
            .unwrap();

        // k1 write is stale (expects 0 via None), k2 would be fresh.
        let err = store
            .commit(
                vec![
                    StoredWrite {
                        key: k2,
                        expected_version: None,
                        body: json!(2),
                    },
                    StoredWrite {
                        key: k1,
                        expected_version: None,
                        body: json!(3),
                    },
                ],
                vec![],
            )
            .unwrap_err();
        assert!(err.is_retryable());
        // Nothing from the failed commit landed.
        assert!(store.load(k2).unwrap().is_none());
        assert_eq!(store.load(k1).unwrap().unwrap().body, json!(1));
    }

    #[test]
    fn version_bumps_on_every_write() {
        let store = MemoryStore::new();
        let k = key();
        store
            .commit(
                vec![StoredWrite {
                    key: k,
                    expected_version: None,
                    body: json!(1),
                }],
                vec![],
            )
            .unwrap();
        store
            .commit(
                vec![StoredWrite {
                    key: k,
                    expected_version: Some(1),
                    body: json!(2),
                }],
                vec![],
            )
            .unwrap();
        assert_eq!(store.load(k).unwrap().unwrap().version, 2);
    }

    #[test]
    fn outbox_drains_fifo_per_game_and_marks_sent() {
        let store = Arc::new(MemoryStore::new());
        let game_a = GameId::generate();
        let game_b = GameId::generate();
        let pending = |game_id| PendingOutbox {
            message_id: MessageId::generate(),
            game_id,
            event: Event::GameStarted { game_id },
            created_at: 0,
        };
        store
            .commit(vec![], vec![pending(game_a), pending(game_b), pending(game_a)])
            .unwrap();

        let dispatcher =
            OutboxDispatcher::new(store.clone(), Arc::new(FixedClock::new(99)));
        let mut seen: Vec<(GameId, u64)> = Vec::new();
        let count = dispatcher
            .drain(|row| seen.push((row.game_id, row.seq)))
            .unwrap();
        assert_eq!(count, 3);

        // Within each game, sequence numbers ascend.
        for game in [game_a, game_b] {
            let seqs: Vec<u64> = seen
                .iter()
                .filter(|(g, _)| *g == game)
                .map(|(_, s)| *s)
                .collect();
            let mut sorted = seqs.clone();
            sorted.sort();
            assert_eq!(seqs, sorted);
        }

        // Nothing left to drain.
        assert_eq!(dispatcher.drain(|_| {}).unwrap(), 0);
    }
}
