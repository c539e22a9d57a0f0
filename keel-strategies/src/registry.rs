//! Static strategy registry
//!
//! Strategies are fixed at compile time and selected by a configuration
//! identifier. Parameters arrive as opaque JSON and are validated by the
//! strategy's own constructor.

use crate::ema_crossover::{EmaCrossover, EmaCrossoverParams};
use crate::mean_reversion::{MeanReversionParams, MeanReversionZScore};
use anyhow::Context;
use keel_core::strategy::Strategy;

pub const EMA_CROSSOVER: &str = "ema-crossover";
pub const MEAN_REVERSION: &str = "mean-reversion-zscore";

/// Identifiers `build` accepts
pub fn known_strategies() -> &'static [&'static str] {
    &[EMA_CROSSOVER, MEAN_REVERSION]
}

/// Instantiate a strategy by name with its JSON parameters
pub fn build(name: &str, params: &serde_json::Value) -> anyhow::Result<Box<dyn Strategy>> {
    match name {
        EMA_CROSSOVER => {
            let params: EmaCrossoverParams = parse(params)?;
            Ok(Box::new(EmaCrossover::new(params)?))
        }
        MEAN_REVERSION => {
            let params: MeanReversionParams = parse(params)?;
            Ok(Box::new(MeanReversionZScore::new(params)?))
        }
        other => anyhow::bail!(
            "unknown strategy '{other}', expected one of {:?}",
            known_strategies()
        ),
    }
}

fn parse<T: Default + serde::de::DeserializeOwned>(params: &serde_json::Value) -> anyhow::Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone()).context("invalid strategy parameters")
}
