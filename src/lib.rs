//! Client-side UTXO wallet ledger engine.
//!
//! Tracks the unspent outputs of one account, classifies them by ownership role, keeps balances
//! current as transactions arrive from a Blockbook explorer, and persists the history so a restart
//! does not re-download it.

pub mod config;
pub mod explorer;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod testing;
