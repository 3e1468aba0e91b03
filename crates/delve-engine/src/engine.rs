//! The engine facade.
//!
//! Owns the dispatch table, the store, the clock, and the randomness
//! service. `execute` is the single entry point for external commands: it
//! serializes commands per game, enforces the envelope policies (dedup,
//! deadline, finished-game, pending-battle), runs the handler chain in one
//! transaction, and commits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use tracing::{debug, info_span};

use delve_types::error::EngineError;
use delve_types::ids::{GameId, PlayerId};
use delve_types::item::Item;
use delve_types::messages::{Command, CommandEnvelope, CommandKind, CommandReply};
use delve_types::state::Timestamp;
use delve_types::tile::TileTemplate;
use delve_types::view::GameView;

use crate::bus::{MessageBus, TxContext};
use crate::store::{MemoryStore, Store};
use crate::tx::Transaction;
use crate::{bag, battle, deck, field, game, movement, player, query, turn};

// =============================================================================
// Clock
// =============================================================================

/// Wall-clock seam; injected so tests control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests; advances only when told to.
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn advance(&self, delta: Timestamp) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Randomness
// =============================================================================

/// Seed source for per-game PRNGs and shuffles.
pub trait Randomness: Send + Sync {
    fn next_seed(&self) -> u64;
}

/// Production source: OS entropy.
pub struct OsRandomness;

impl Randomness for OsRandomness {
    fn next_seed(&self) -> u64 {
        rand::rngs::OsRng.next_u64()
    }
}

/// Deterministic seed sequence for tests: base, base+1, base+2, …
pub struct FixedRandomness {
    counter: AtomicU64,
}

impl FixedRandomness {
    pub fn new(base: u64) -> Self {
        Self {
            counter: AtomicU64::new(base),
        }
    }
}

impl Randomness for FixedRandomness {
    fn next_seed(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

// =============================================================================
// Deterministic overrides
// =============================================================================

/// Per-game deterministic seam. When a sequence is installed it is used
/// verbatim and never shuffled; the dice list is consumed cyclically.
#[derive(Debug, Clone, Default)]
pub struct GameOverrides {
    pub dice_rolls: Vec<u32>,
    pub tile_sequence: Option<Vec<TileTemplate>>,
    pub item_sequence: Option<Vec<Item>>,
    pub starting_hp: HashMap<PlayerId, u32>,
}

// =============================================================================
// Engine
// =============================================================================

/// The game engine: dispatch table + store + clock + randomness.
pub struct Engine {
    bus: MessageBus,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    randomness: Arc<dyn Randomness>,
    overrides: Mutex<HashMap<GameId, GameOverrides>>,
    game_locks: Mutex<HashMap<GameId, Arc<Mutex<()>>>>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        randomness: Arc<dyn Randomness>,
    ) -> Self {
        // Startup-time registration phase. GameCreated subscribers run in
        // this order: deck (build pile) → bag → movement (empty graph) →
        // field (place the starting tile, which movement must observe).
        let mut bus = MessageBus::new();
        game::register(&mut bus);
        deck::register(&mut bus);
        bag::register(&mut bus);
        movement::register(&mut bus);
        field::register(&mut bus);
        turn::register(&mut bus);
        battle::register(&mut bus);
        player::register(&mut bus);

        Self {
            bus,
            store,
            clock,
            randomness,
            overrides: Mutex::new(HashMap::new()),
            game_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Engine with the in-memory store and production clock/randomness.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Arc::new(OsRandomness),
        )
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// Install the deterministic seam for one game. Must happen before
    /// `CreateGame` (the client supplies the game id).
    pub fn install_overrides(&self, game_id: GameId, overrides: GameOverrides) {
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(game_id, overrides);
    }

    fn game_lock(&self, game_id: GameId) -> Arc<Mutex<()>> {
        self.game_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(game_id)
            .or_default()
            .clone()
    }

    /// Execute a command without envelope metadata (fresh id, no deadline).
    pub fn execute_command(&self, command: Command) -> Result<CommandReply, EngineError> {
        self.execute(CommandEnvelope::new(command))
    }

    /// Execute one external command atomically.
    pub fn execute(&self, envelope: CommandEnvelope) -> Result<CommandReply, EngineError> {
        if envelope.command.is_internal() {
            return Err(EngineError::Validation(
                "internal commands cannot be dispatched externally".into(),
            ));
        }

        // CreateGame may need a server-generated id before we can lock.
        let (command, game_id) = match envelope.command.clone() {
            Command::CreateGame { game_id, deck_size } => {
                let id = game_id.unwrap_or_else(GameId::generate);
                (
                    Command::CreateGame {
                        game_id: Some(id),
                        deck_size,
                    },
                    id,
                )
            }
            other => {
                let id = other
                    .game_id()
                    .ok_or_else(|| EngineError::Validation("missing game id".into()))?;
                (other, id)
            }
        };

        let _span = info_span!("execute", game_id = %game_id, kind = ?command.kind()).entered();

        // Commands on one game are serialized; different games run in
        // parallel. The store's version check backstops this.
        let lock = self.game_lock(game_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        if let Some(deadline) = envelope.deadline {
            if now > deadline {
                return Err(EngineError::DeadlineExceeded);
            }
        }

        let overrides = self
            .overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&game_id)
            .cloned();
        let mut tx = Transaction::new(self.store.clone(), self.randomness.clone(), now, overrides);

        if matches!(command, Command::CreateGame { .. }) {
            if tx.game_exists(game_id)? {
                let game = tx.game(game_id)?;
                if game.processed_commands.contains(&envelope.id) {
                    return Ok(CommandReply::Duplicate);
                }
                return Err(EngineError::Validation(format!(
                    "game {game_id} already exists"
                )));
            }
        } else {
            let game = tx.game(game_id)?;
            if game.processed_commands.contains(&envelope.id) {
                debug!(command_id = %envelope.id, "replayed command id; skipping");
                return Ok(CommandReply::Duplicate);
            }
            if game.is_finished() {
                // End-of-life commands no-op so racing clients see success.
                return match command.kind() {
                    CommandKind::EndTurn => Ok(CommandReply::TurnEnded { success: true }),
                    CommandKind::FinalizeBattle => Ok(CommandReply::BattleFinalized {
                        final_total_damage: 0,
                        item_picked_up: None,
                    }),
                    _ => Err(EngineError::GameAlreadyFinished(game_id)),
                };
            }
            if game.pending_battle.is_some() && command.kind() != CommandKind::FinalizeBattle {
                return Err(EngineError::InvalidTurnAction(
                    "a battle is awaiting consumable confirmation".into(),
                ));
            }
        }

        let reply = {
            let mut ctx = TxContext::new(&mut tx, &self.bus);
            ctx.dispatch(command)?
        };

        tx.game(game_id)?.processed_commands.insert(envelope.id);

        if let Some(deadline) = envelope.deadline {
            if self.clock.now() > deadline {
                return Err(EngineError::DeadlineExceeded);
            }
        }

        let (writes, outbox) = tx.into_commit()?;
        self.store.commit(writes, outbox)?;
        Ok(reply)
    }

    /// Assemble the full observable state of one game.
    pub fn get_game(&self, game_id: GameId) -> Result<GameView, EngineError> {
        query::get_game(self.store.as_ref(), game_id)
    }
}
