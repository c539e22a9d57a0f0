//! Reference strategies behind the fixed `Strategy` interface.
//!
//! Strategies are pure signal generators: they never talk to the broker,
//! the feed or the risk layer. New strategies register in `registry`.

pub mod ema_crossover;
pub mod mean_reversion;
pub mod registry;

pub use ema_crossover::{EmaCrossover, EmaCrossoverParams};
pub use mean_reversion::{MeanReversionParams, MeanReversionZScore};
pub use registry::build;
