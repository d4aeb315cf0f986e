//! Value types for transactions, their inputs and outputs.
//!
//! These are immutable once built. Spentness is never stored on them; it lives in the
//! ledger's spent index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Script of the empty first output of a coinstake transaction
pub const COINSTAKE_MARKER: &[u8] = &[0xf8];

/// Identifies one output of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    /// Transaction ID, hex
    pub txid: String,
    /// Output position in the transaction
    pub n: u32,
}

impl Outpoint {
    pub fn new(txid: impl Into<String>, n: u32) -> Self {
        Self {
            txid: txid.into(),
            n,
        }
    }

    /// Canonical string form; txids are fixed-length hex so plain concatenation is unique.
    pub fn to_unique(&self) -> String {
        format!("{}{}", self.txid, self.n)
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.n)
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub outpoint: Outpoint,
    /// Redeem script
    #[serde(with = "hex::serde")]
    pub script: Vec<u8>,
    /// Value in satoshis
    pub value: u64,
}

impl TxOut {
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script == COINSTAKE_MARKER
    }
}

/// A transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Output being spent; `None` for a coinbase input
    pub prevout: Option<Outpoint>,
    #[serde(with = "hex::serde")]
    pub script_sig: Vec<u8>,
}

/// A transaction as seen by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    /// `None` while the transaction is still in the mempool
    pub block_height: Option<u32>,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub block_time: Option<i64>,
}

impl Transaction {
    pub fn is_confirmed(&self) -> bool {
        self.block_height.is_some()
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_none()
    }

    pub fn is_coinstake(&self) -> bool {
        self.vout.len() >= 2 && self.vout[0].is_empty()
    }

    /// Whether the outputs can be spent at `chain_height`.
    ///
    /// Ordinary transactions are always mature. Coinbase and coinstake outputs mature once
    /// the chain has moved more than `coinbase_maturity` blocks past their own height.
    pub fn is_mature(&self, chain_height: u32, coinbase_maturity: u32) -> bool {
        if !(self.is_coinbase() || self.is_coinstake()) {
            return true;
        }
        match self.block_height {
            Some(height) => {
                i64::from(chain_height) - i64::from(height) > i64::from(coinbase_maturity)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(txid: &str, n: u32, script: &[u8], value: u64) -> TxOut {
        TxOut {
            outpoint: Outpoint::new(txid, n),
            script: script.to_vec(),
            value,
        }
    }

    #[test]
    fn test_outpoint_identity() {
        let a = Outpoint::new("aa", 1);
        let b = Outpoint::new("aa", 1);
        assert_eq!(a, b);
        assert_eq!(a.to_unique(), "aa1");
        assert_eq!(a.to_string(), "aa:1");

        let set: std::collections::HashSet<_> = [a, b, Outpoint::new("aa", 2)].into();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_coinbase_and_coinstake_detection() {
        let coinbase = Transaction {
            txid: "cb".to_string(),
            block_height: Some(10),
            vin: vec![TxIn {
                prevout: None,
                script_sig: vec![],
            }],
            vout: vec![out("cb", 0, &[0x76], 50)],
            block_time: None,
        };
        assert!(coinbase.is_coinbase());
        assert!(!coinbase.is_coinstake());

        let coinstake = Transaction {
            txid: "cs".to_string(),
            block_height: Some(10),
            vin: vec![TxIn {
                prevout: Some(Outpoint::new("prev", 0)),
                script_sig: vec![],
            }],
            vout: vec![out("cs", 0, COINSTAKE_MARKER, 0), out("cs", 1, &[0x76], 50)],
            block_time: None,
        };
        assert!(coinstake.is_coinstake());
        assert!(!coinstake.is_coinbase());
    }

    #[test]
    fn test_maturity_boundary() {
        let coinbase = Transaction {
            txid: "cb".to_string(),
            block_height: Some(100),
            vin: vec![TxIn {
                prevout: None,
                script_sig: vec![],
            }],
            vout: vec![out("cb", 0, &[0x76], 50)],
            block_time: None,
        };
        assert!(!coinbase.is_mature(200, 100));
        assert!(coinbase.is_mature(201, 100));
        // Chain tip not yet known
        assert!(!coinbase.is_mature(0, 100));

        let plain = Transaction {
            vin: vec![TxIn {
                prevout: Some(Outpoint::new("prev", 0)),
                script_sig: vec![],
            }],
            ..coinbase
        };
        assert!(plain.is_mature(0, 100));
    }

    #[test]
    fn test_serde_hex_scripts() {
        let txout = out("ab", 0, &[0x76, 0xa9], 5);
        let json = serde_json::to_string(&txout).unwrap();
        assert!(json.contains("\"76a9\""));
        let back: TxOut = serde_json::from_str(&json).unwrap();
        assert_eq!(back, txout);
    }
}
