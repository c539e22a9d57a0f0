//! Session lifecycle states
//!
//! Initializing -> Running <-> Degraded -> Halted -> Stopped. Degraded keeps
//! consuming market data but suppresses new orders; Halted stops trading for
//! the rest of the session and never resumes silently; Stopped is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Initializing,
    Running,
    Degraded,
    Halted,
    Stopped,
}

impl SessionState {
    /// Whether strategies may generate and submit new orders
    pub fn trading_enabled(&self) -> bool {
        matches!(self, SessionState::Running)
    }

    /// Whether the session still consumes market data
    pub fn consuming_data(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::Running | SessionState::Degraded
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// Valid transitions; anything else is a programming error the
    /// orchestrator refuses to make
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initializing, Running)
                | (Initializing, Halted)
                | (Initializing, Stopped)
                | (Running, Degraded)
                | (Running, Halted)
                | (Running, Stopped)
                | (Degraded, Running)
                | (Degraded, Halted)
                | (Degraded, Stopped)
                | (Halted, Stopped)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initializing => "initializing",
            SessionState::Running => "running",
            SessionState::Degraded => "degraded",
            SessionState::Halted => "halted",
            SessionState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}
