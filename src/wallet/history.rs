//! Activity history derived from the ledger.

use crate::wallet::ledger::Ledger;
use crate::wallet::model::Transaction;
use crate::wallet::ownership::UtxoState;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoricalTxKind {
    Unknown,
    Stake,
    Delegation,
    Undelegation,
    Received,
    Sent,
}

/// A transaction as shown in an activity list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalTx {
    pub kind: HistoricalTxKind,
    pub id: String,
    pub receivers: Vec<String>,
    pub time: Option<i64>,
    pub height: Option<u32>,
    /// Absolute value moved, in satoshis
    pub amount: u64,
}

impl Ledger {
    /// Whether `tx` spends one of our delegated (cold) outputs
    pub fn is_undelegation(&self, tx: &Transaction) -> bool {
        self.spent_outputs(tx).any(|output| {
            self.resolver()
                .resolve_ownership(&output.script)
                .contains(UtxoState::SPENDABLE_COLD)
        })
    }

    /// Whether `tx` creates a delegated (cold) output we own
    pub fn is_delegation(&self, tx: &Transaction) -> bool {
        tx.vout.iter().any(|output| {
            self.resolver()
                .resolve_ownership(&output.script)
                .contains(UtxoState::SPENDABLE_COLD)
        })
    }

    /// Classify one transaction
    pub fn to_historical(&self, tx: &Transaction, staking_prefix: char) -> HistoricalTx {
        let credit = self.credit(tx, UtxoState::SPENDABLE_TOTAL);
        let debit = self.debit(tx, UtxoState::SPENDABLE_TOTAL);
        let mut receivers: Vec<String> = tx
            .vout
            .iter()
            .flat_map(|output| self.resolver().classify_script(&output.script).addresses)
            .collect();

        let (kind, amount) = if tx.is_coinstake() {
            (HistoricalTxKind::Stake, credit.abs_diff(debit))
        } else if self.is_undelegation(tx) {
            (HistoricalTxKind::Undelegation, credit.abs_diff(debit))
        } else if self.is_delegation(tx) {
            receivers.retain(|address| address.starts_with(staking_prefix));
            (
                HistoricalTxKind::Delegation,
                self.credit(tx, UtxoState::SPENDABLE_COLD),
            )
        } else if credit > debit {
            (HistoricalTxKind::Received, credit - debit)
        } else if credit < debit {
            (HistoricalTxKind::Sent, debit - credit)
        } else {
            (HistoricalTxKind::Unknown, 0)
        };

        HistoricalTx {
            kind,
            id: tx.txid.clone(),
            receivers,
            time: tx.block_time,
            height: tx.block_height,
            amount,
        }
    }

    /// Full history, most recent block first, pending transactions on top
    pub fn history(&self, staking_prefix: char) -> Vec<HistoricalTx> {
        self.transactions()
            .sorted_by_key(|tx| Reverse(tx.block_height.unwrap_or(u32::MAX)))
            .map(|tx| self.to_historical(tx, staking_prefix))
            .collect()
    }
}
