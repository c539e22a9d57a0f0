//! Session orchestration: lifecycle, event queue, reconciliation

pub mod orchestrator;
pub mod queue;
pub mod reconcile;
pub mod state;

pub use orchestrator::Session;
pub use queue::{EventQueue, SessionEvent};
pub use reconcile::{ReconcileConfig, ReconcileOutcome, Reconciler};
pub use state::SessionState;
