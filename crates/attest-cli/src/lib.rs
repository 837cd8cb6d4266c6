//! Attest CLI - release and identity signing from the command line
//!
//! Thin driver over `attest-signer` and `attest-identity`; all protocol
//! logic lives in those crates.

pub mod commands;

pub use commands::*;
