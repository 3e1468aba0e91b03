//! The in-process message bus.
//!
//! Exactly one handler per command kind, any number per event kind, all
//! registered once at engine startup. Dispatch is synchronous: nested
//! commands and event handlers run on the caller's thread and share the
//! caller's transaction, so a failure anywhere rolls back the whole root
//! command.

use std::collections::HashMap;

use delve_types::error::EngineError;
use delve_types::messages::{Command, CommandKind, CommandReply, Event, EventEnvelope, EventKind};

use crate::tx::Transaction;

pub type CommandHandler = fn(&mut TxContext<'_>, &Command) -> Result<CommandReply, EngineError>;
pub type EventHandler = fn(&mut TxContext<'_>, &EventEnvelope) -> Result<(), EngineError>;

/// The dispatch table: message kind → handler(s).
#[derive(Default)]
pub struct MessageBus {
    commands: HashMap<CommandKind, CommandHandler>,
    events: HashMap<EventKind, Vec<EventHandler>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the single handler for a command kind. A second registration
    /// for the same kind is a wiring bug.
    pub fn register_command(&mut self, kind: CommandKind, handler: CommandHandler) {
        let previous = self.commands.insert(kind, handler);
        debug_assert!(previous.is_none(), "duplicate handler for {kind:?}");
    }

    /// Subscribe a handler to an event kind. Handlers run in registration
    /// order.
    pub fn register_event(&mut self, kind: EventKind, handler: EventHandler) {
        self.events.entry(kind).or_default().push(handler);
    }

    fn command_handler(&self, kind: CommandKind) -> Result<CommandHandler, EngineError> {
        self.commands
            .get(&kind)
            .copied()
            .ok_or_else(|| EngineError::Internal(format!("no handler registered for {kind:?}")))
    }

    fn event_handlers(&self, kind: EventKind) -> Vec<EventHandler> {
        self.events.get(&kind).cloned().unwrap_or_default()
    }
}

/// Handler context: the enclosing transaction plus recursive dispatch on the
/// same bus. Aggregates never hold references to each other; they reach
/// other aggregates by dispatching through this.
pub struct TxContext<'a> {
    pub tx: &'a mut Transaction,
    bus: &'a MessageBus,
}

impl<'a> TxContext<'a> {
    pub fn new(tx: &'a mut Transaction, bus: &'a MessageBus) -> Self {
        Self { tx, bus }
    }

    /// Run a nested command synchronously on this transaction.
    pub fn dispatch(&mut self, command: Command) -> Result<CommandReply, EngineError> {
        let handler = self.bus.command_handler(command.kind())?;
        handler(self, &command)
    }

    /// Emit an event: record it (staging external ones for the outbox) and
    /// run every subscriber in registration order before returning.
    pub fn emit(&mut self, event: Event) -> Result<(), EngineError> {
        let envelope = self.tx.record_event(event);
        for handler in self.bus.event_handlers(envelope.event.kind()) {
            handler(self, &envelope)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedRandomness;
    use crate::store::MemoryStore;
    use delve_types::ids::GameId;
    use std::sync::Arc;

    fn noop_command(
        _ctx: &mut TxContext<'_>,
        _command: &Command,
    ) -> Result<CommandReply, EngineError> {
        Ok(CommandReply::Done)
    }

    fn cascade_command(
        ctx: &mut TxContext<'_>,
        command: &Command,
    ) -> Result<CommandReply, EngineError> {
        let game_id = command.game_id().unwrap();
        ctx.emit(Event::GameStarted { game_id })?;
        Ok(CommandReply::Done)
    }

    fn subscriber_ok(
        _ctx: &mut TxContext<'_>,
        _event: &EventEnvelope,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn subscriber_fail(
        _ctx: &mut TxContext<'_>,
        _event: &EventEnvelope,
    ) -> Result<(), EngineError> {
        Err(EngineError::Internal("subscriber failed".into()))
    }

    fn make_tx() -> Transaction {
        Transaction::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedRandomness::new(1)),
            0,
            None,
        )
    }

    #[test]
    fn missing_handler_is_an_internal_error() {
        let bus = MessageBus::new();
        let mut tx = make_tx();
        let mut ctx = TxContext::new(&mut tx, &bus);
        let err = ctx
            .dispatch(Command::NextTurn {
                game_id: GameId::generate(),
            })
            .unwrap_err();
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn command_dispatch_hits_the_registered_handler() {
        let mut bus = MessageBus::new();
        bus.register_command(CommandKind::NextTurn, noop_command);
        let mut tx = make_tx();
        let mut ctx = TxContext::new(&mut tx, &bus);
        let reply = ctx
            .dispatch(Command::NextTurn {
                game_id: GameId::generate(),
            })
            .unwrap();
        assert_eq!(reply, CommandReply::Done);
    }

    #[test]
    fn events_cascade_within_the_transaction() {
        let mut bus = MessageBus::new();
        bus.register_command(CommandKind::NextTurn, cascade_command);
        bus.register_event(EventKind::GameStarted, subscriber_ok);
        let mut tx = make_tx();
        let mut ctx = TxContext::new(&mut tx, &bus);
        ctx.dispatch(Command::NextTurn {
            game_id: GameId::generate(),
        })
        .unwrap();
        assert_eq!(tx.events.len(), 1);
    }

    #[test]
    fn a_failing_subscriber_fails_the_dispatch() {
        let mut bus = MessageBus::new();
        bus.register_command(CommandKind::NextTurn, cascade_command);
        bus.register_event(EventKind::GameStarted, subscriber_ok);
        bus.register_event(EventKind::GameStarted, subscriber_fail);
        let mut tx = make_tx();
        let mut ctx = TxContext::new(&mut tx, &bus);
        let err = ctx
            .dispatch(Command::NextTurn {
                game_id: GameId::generate(),
            })
            .unwrap_err();
        assert_eq!(err.code(), "internal");
    }
}
