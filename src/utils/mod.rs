//!
//! Utility module for the wallet.
//!
//! Re-exports formatting helpers used in log output.
/// Utility functions for formatting and display
pub mod index;

pub use index::format_token_amount;
