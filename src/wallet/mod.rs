pub mod context;
pub mod history;
pub mod ledger;
pub mod model;
pub mod ownership;
pub mod script;
pub mod sync;
pub mod types;

pub use context::WalletContext;
pub use ledger::{Balances, Ledger};
pub use model::{Outpoint, Transaction, TxIn, TxOut};
pub use ownership::{KeyProvider, OwnershipResolver, UtxoState, WatchOnlyAddress};
pub use types::*;
