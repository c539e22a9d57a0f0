//! Shared pieces for the keel binaries

pub mod common;
