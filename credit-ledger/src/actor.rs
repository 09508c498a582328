//! Actor-based concurrency for the ledger
//!
//! Single-writer pattern using Tokio actors: one logical writer task owns
//! the in-memory state and the fact log, so every command is applied as
//! one atomic transition in a fixed total order. Submitters get their
//! reply only after the resulting facts are durable.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Callers (API layer, tests, CLI)             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ LedgerHandle (Clone)
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │             LedgerActor (Single Task)                 │
//! │   state.execute(command, now) → Vec<Fact>            │
//! │   storage.append_facts(...)   (atomic WriteBatch)    │
//! │   periodic snapshot every N facts                    │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::{
    error::{Error, Result},
    ledger::Command,
    metrics::Metrics,
    state::LedgerState,
    types::Fact,
    Storage,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Apply a command as one atomic transition
    Submit {
        /// Requested transition
        command: Command,
        /// Reply with the committed facts
        response: oneshot::Sender<Result<Vec<Fact>>>,
    },

    /// Read a consistent snapshot of the state
    ReadState {
        /// Reply with a clone of the current state
        response: oneshot::Sender<LedgerState>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the state and processes commands sequentially
pub struct LedgerActor {
    /// In-memory state, authoritative between snapshots
    state: LedgerState,

    /// Sequence of the last durable fact
    last_seq: u64,

    /// Storage backend
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,

    /// Snapshot every N facts (0 disables)
    snapshot_interval: u64,

    /// Facts appended since the last snapshot
    facts_since_snapshot: u64,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor over recovered state
    pub fn new(
        state: LedgerState,
        last_seq: u64,
        storage: Arc<Storage>,
        metrics: Metrics,
        snapshot_interval: u64,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        Self {
            state,
            last_seq,
            storage,
            metrics,
            snapshot_interval,
            facts_since_snapshot: 0,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Submit { command, response } => {
                    let result = self.apply(command);
                    let _ = response.send(result);
                }
                LedgerMessage::ReadState { response } => {
                    let _ = response.send(self.state.clone());
                }
                LedgerMessage::Shutdown => break,
            }
        }
        tracing::info!(last_seq = self.last_seq, "Ledger actor stopped");
    }

    /// Apply one command: validate against a working copy, persist the
    /// facts, then commit the copy. A storage failure leaves the published
    /// state unchanged.
    fn apply(&mut self, command: Command) -> Result<Vec<Fact>> {
        let kind = command.kind();
        let started = Instant::now();
        let now = Utc::now();

        let mut next = self.state.clone();
        let facts = match next.execute(command, now) {
            Ok(facts) => facts,
            Err(e) => {
                self.metrics.record_rejected();
                tracing::debug!(command = kind, error = %e, "Command rejected");
                return Err(e);
            }
        };

        if let Err(e) = self.storage.append_facts(self.last_seq + 1, &facts) {
            self.metrics.record_rejected();
            tracing::error!(command = kind, error = %e, "Fact append failed");
            return Err(e);
        }

        self.last_seq += facts.len() as u64;
        self.facts_since_snapshot += facts.len() as u64;
        self.state = next;

        self.metrics.record_accepted(facts.iter().map(Fact::kind));
        for fact in &facts {
            if let Fact::ReversalExecuted {
                credits_affected, ..
            } = fact
            {
                self.metrics.record_buffer_used(*credits_affected);
            }
        }
        self.metrics
            .record_apply_duration(started.elapsed().as_secs_f64());
        tracing::debug!(
            command = kind,
            facts = facts.len(),
            last_seq = self.last_seq,
            "Command committed"
        );

        self.maybe_snapshot();
        Ok(facts)
    }

    fn maybe_snapshot(&mut self) {
        if self.snapshot_interval == 0 || self.facts_since_snapshot < self.snapshot_interval {
            return;
        }
        match self.storage.put_snapshot(self.last_seq, &self.state) {
            Ok(()) => self.facts_since_snapshot = 0,
            // Snapshot failure is not fatal: the fact log still replays.
            Err(e) => tracing::warn!(error = %e, "Snapshot failed"),
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Submit a command and wait for its committed facts
    pub async fn submit(&self, command: Command) -> Result<Vec<Fact>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Submit {
                command,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Read a consistent snapshot of the state
    pub async fn read_state(&self) -> Result<LedgerState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::ReadState { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    state: LedgerState,
    last_seq: u64,
    storage: Arc<Storage>,
    metrics: Metrics,
    snapshot_interval: u64,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(state, last_seq, storage, metrics, snapshot_interval, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
