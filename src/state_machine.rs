//! Per-pass state machine: Idle → Scanning → (Restoring | Translating → Applying) → Idle.
//! Subscribers observe transitions through a watch channel.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PassState {
    Idle,
    Scanning,
    Restoring,
    Translating,
    Applying,
}

impl std::fmt::Display for PassState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PassState::Idle => "Idle",
            PassState::Scanning => "Scanning",
            PassState::Restoring => "Restoring",
            PassState::Translating => "Translating",
            PassState::Applying => "Applying",
        };
        f.write_str(name)
    }
}

impl PassState {
    pub fn can_transition_to(self, next: PassState) -> bool {
        matches!(
            (self, next),
            (PassState::Idle, PassState::Scanning)
                | (PassState::Scanning, PassState::Restoring)
                | (PassState::Scanning, PassState::Translating)
                | (PassState::Scanning, PassState::Idle) // nothing to translate
                | (PassState::Restoring, PassState::Idle)
                | (PassState::Translating, PassState::Applying)
                | (PassState::Translating, PassState::Idle) // gateway failed or stale
                | (PassState::Applying, PassState::Idle)
        )
    }
}

pub struct PassStateMachine {
    state: RwLock<PassState>,
    state_tx: watch::Sender<PassState>,
}

impl Default for PassStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PassStateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(PassState::Idle);
        Self {
            state: RwLock::new(PassState::Idle),
            state_tx,
        }
    }

    pub fn current(&self) -> PassState {
        *self.state.read()
    }

    pub fn transition(&self, next: PassState) -> Result<PassState, String> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid pass transition: {current} -> {next}");
            warn!("{}", msg);
            return Err(msg);
        }
        *state = next;
        self.state_tx.send_replace(next);
        debug!(from = %current, to = %next, "pass_state");
        Ok(next)
    }

    /// Return to Idle from anywhere; used when a pass unwinds early.
    pub fn force_idle(&self) {
        let mut state = self.state.write();
        if *state != PassState::Idle {
            *state = PassState::Idle;
            self.state_tx.send_replace(PassState::Idle);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PassState> {
        self.state_tx.subscribe()
    }
}
