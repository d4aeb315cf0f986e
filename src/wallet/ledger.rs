//! The transaction ledger (mempool index).
//!
//! The ledger is the authoritative in-memory view of every transaction relevant to the active
//! identity. It tracks which outpoints are spent, which are reserved (locked), and keeps cached
//! balance aggregates that always equal a from-scratch recomputation.
//!
//! All methods are synchronous and total. Concurrency is handled by the owner, which keeps the
//! ledger behind a `tokio::sync::RwLock` so that mutations never interleave.

use crate::config::ChainParams;
use crate::wallet::model::{Outpoint, Transaction, TxOut};
use crate::wallet::ownership::{OwnershipResolver, UtxoState};

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Cached balance aggregates, in satoshis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balances {
    pub spendable: u64,
    pub cold: u64,
    /// Spendable value still waiting for coinbase maturity
    pub immature: u64,
}

pub struct Ledger {
    resolver: OwnershipResolver,
    txmap: HashMap<String, Transaction>,
    /// Insertion order of `txmap`, which is also the selection order
    order: Vec<String>,
    /// Funding txid -> (output index -> spending txid)
    spent: HashMap<String, HashMap<u32, String>>,
    /// Confirmed transactions by block height
    by_height: BTreeMap<u32, Vec<String>>,
    locked: HashSet<Outpoint>,
    chain_height: u32,
    coinbase_maturity: u32,
    buffer_percent: u64,
    balances: Balances,
    /// Highest block height already written to the store
    highest_saved_height: u32,
}

impl Ledger {
    pub fn new(resolver: OwnershipResolver, params: &ChainParams, buffer_percent: u64) -> Self {
        Self {
            resolver,
            txmap: HashMap::new(),
            order: Vec::new(),
            spent: HashMap::new(),
            by_height: BTreeMap::new(),
            locked: HashSet::new(),
            chain_height: 0,
            coinbase_maturity: params.coinbase_maturity,
            buffer_percent,
            balances: Balances::default(),
            highest_saved_height: 0,
        }
    }

    pub fn resolver(&self) -> &OwnershipResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut OwnershipResolver {
        &mut self.resolver
    }

    /// Clear every index, the lock set and the persistence mark; reload the address window.
    pub fn reset(&mut self) {
        self.txmap.clear();
        self.order.clear();
        self.spent.clear();
        self.by_height.clear();
        self.locked.clear();
        self.highest_saved_height = 0;
        self.resolver.reset();
        self.refresh_cached_balances();
    }

    /// Swap in new chain parameters. Callers reset the ledger alongside.
    pub fn set_chain_params(&mut self, params: &ChainParams) {
        self.coinbase_maturity = params.coinbase_maturity;
        self.chain_height = 0;
    }

    pub fn replace_resolver(&mut self, resolver: OwnershipResolver) {
        self.resolver = resolver;
    }

    pub fn chain_height(&self) -> u32 {
        self.chain_height
    }

    /// Update the chain tip. Maturity depends on it, so balances are refreshed on change.
    pub fn set_chain_height(&mut self, height: u32) {
        if height != self.chain_height {
            self.chain_height = height;
            self.refresh_cached_balances();
        }
    }

    /// Record a transaction and refresh the cached balances.
    ///
    /// Returns `false` when the transaction was already known as confirmed.
    pub fn ingest(&mut self, tx: Transaction) -> bool {
        let applied = self.apply(tx);
        if applied {
            self.refresh_cached_balances();
        }
        applied
    }

    /// Ingest a batch in ascending block-height order, pending transactions last.
    pub fn ingest_all(&mut self, mut txs: Vec<Transaction>) -> usize {
        txs.sort_by_key(|tx| tx.block_height.unwrap_or(u32::MAX));
        let mut applied = 0;
        for tx in txs {
            if self.apply(tx) {
                applied += 1;
            }
        }
        if applied > 0 {
            self.refresh_cached_balances();
        }
        applied
    }

    fn apply(&mut self, tx: Transaction) -> bool {
        if let Some(existing) = self.txmap.get(&tx.txid) {
            if existing.is_confirmed() {
                return false;
            }
        } else {
            self.order.push(tx.txid.clone());
        }

        for input in &tx.vin {
            if let Some(prevout) = &input.prevout {
                self.set_spent(prevout, &tx.txid);
            }
        }
        for output in &tx.vout {
            self.resolver.advance_high_water_mark(output);
        }
        if let Some(height) = tx.block_height {
            let slot = self.by_height.entry(height).or_default();
            if !slot.contains(&tx.txid) {
                slot.push(tx.txid.clone());
            }
        }

        debug!("Ingested transaction {} at {:?}", tx.txid, tx.block_height);
        self.txmap.insert(tx.txid.clone(), tx);
        true
    }

    fn set_spent(&mut self, outpoint: &Outpoint, spender: &str) {
        self.spent
            .entry(outpoint.txid.clone())
            .or_default()
            .entry(outpoint.n)
            .or_insert_with(|| spender.to_string());
        // A spent coin cannot stay reserved
        self.locked.remove(outpoint);
    }

    pub fn is_spent(&self, outpoint: &Outpoint) -> bool {
        self.spent
            .get(&outpoint.txid)
            .is_some_and(|outputs| outputs.contains_key(&outpoint.n))
    }

    /// Transaction that spent `outpoint`, if known
    pub fn spender_of(&self, outpoint: &Outpoint) -> Option<&str> {
        self.spent
            .get(&outpoint.txid)
            .and_then(|outputs| outputs.get(&outpoint.n))
            .map(String::as_str)
    }

    pub fn spent_count(&self) -> usize {
        self.spent.values().map(HashMap::len).sum()
    }

    fn is_mature(&self, tx: &Transaction) -> bool {
        tx.is_mature(self.chain_height, self.coinbase_maturity)
    }

    /// Unspent owned outputs matching `filter`, in insertion order.
    fn unspent_outputs(
        &self,
        filter: UtxoState,
        confirmed_only: bool,
    ) -> impl Iterator<Item = &TxOut> + '_ {
        self.transactions()
            .filter(move |tx| !confirmed_only || tx.is_confirmed())
            .filter(move |tx| filter.contains(UtxoState::IMMATURE) || self.is_mature(tx))
            .flat_map(|tx| tx.vout.iter())
            .filter(|output| !self.is_spent(&output.outpoint))
            .filter(move |output| {
                filter.contains(UtxoState::LOCKED) || !self.locked.contains(&output.outpoint)
            })
            .filter(move |output| {
                filter.intersects(self.resolver.resolve_ownership(&output.script))
            })
    }

    /// Full-scan balance of unspent outputs whose role matches `filter`.
    ///
    /// Immature and locked outputs count only when the filter carries `IMMATURE` or `LOCKED`.
    pub fn compute_balance(&self, filter: UtxoState) -> u64 {
        self.unspent_outputs(filter, false)
            .map(|output| output.value)
            .sum()
    }

    pub fn refresh_cached_balances(&mut self) {
        let spendable = self.compute_balance(UtxoState::SPENDABLE);
        let with_immature = self.compute_balance(UtxoState::SPENDABLE | UtxoState::IMMATURE);
        self.balances = Balances {
            spendable,
            cold: self.compute_balance(UtxoState::SPENDABLE_COLD),
            immature: with_immature.saturating_sub(spendable),
        };
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    pub fn spendable_balance(&self) -> u64 {
        self.balances.spendable
    }

    pub fn cold_balance(&self) -> u64 {
        self.balances.cold
    }

    pub fn immature_balance(&self) -> u64 {
        self.balances.immature
    }

    /// Unspent outputs matching `filter`, in insertion order.
    ///
    /// With a target, selection stops once the accumulated value exceeds the target plus the
    /// configured buffer. Shortfall is not an error: callers check sufficiency themselves.
    pub fn select_utxos(
        &self,
        filter: UtxoState,
        target: Option<u64>,
        confirmed_only: bool,
        include_locked: bool,
    ) -> Vec<TxOut> {
        // Selection never spends immature outputs
        let mut filter = filter.difference(UtxoState::IMMATURE);
        if include_locked {
            filter |= UtxoState::LOCKED;
        }

        let mut found: u64 = 0;
        let mut selected = Vec::new();
        for output in self.unspent_outputs(filter, confirmed_only) {
            selected.push(output.clone());
            found = found.saturating_add(output.value);
            if let Some(target) = target {
                let threshold = u128::from(target) * u128::from(100 + self.buffer_percent);
                if u128::from(found) * 100 > threshold {
                    break;
                }
            }
        }
        selected
    }

    pub fn lock(&mut self, outpoint: Outpoint) {
        self.locked.insert(outpoint);
        self.refresh_cached_balances();
    }

    pub fn unlock(&mut self, outpoint: &Outpoint) {
        self.locked.remove(outpoint);
        self.refresh_cached_balances();
    }

    pub fn is_locked(&self, outpoint: &Outpoint) -> bool {
        self.locked.contains(outpoint)
    }

    pub fn get_transaction(&self, txid: &str) -> Option<&Transaction> {
        self.txmap.get(txid)
    }

    /// Output referenced by `outpoint`, if its funding transaction is known
    pub fn get_output(&self, outpoint: &Outpoint) -> Option<&TxOut> {
        self.txmap
            .get(&outpoint.txid)?
            .vout
            .iter()
            .find(|output| output.outpoint.n == outpoint.n)
    }

    /// All transactions, in insertion order
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.order.iter().filter_map(|txid| self.txmap.get(txid))
    }

    pub fn transaction_count(&self) -> usize {
        self.txmap.len()
    }

    /// Confirmed transactions grouped by height, highest first
    pub fn heights_descending(&self) -> impl Iterator<Item = (u32, Vec<&Transaction>)> + '_ {
        self.by_height.iter().rev().map(|(height, txids)| {
            let txs = txids.iter().filter_map(|txid| self.txmap.get(txid)).collect();
            (*height, txs)
        })
    }

    /// Highest confirmed block height known, 0 when empty
    pub fn highest_height(&self) -> u32 {
        self.by_height.keys().next_back().copied().unwrap_or(0)
    }

    pub fn highest_saved_height(&self) -> u32 {
        self.highest_saved_height
    }

    pub fn set_highest_saved_height(&mut self, height: u32) {
        self.highest_saved_height = self.highest_saved_height.max(height);
    }

    /// Value of this transaction's outputs whose role matches `filter`
    pub fn credit(&self, tx: &Transaction, filter: UtxoState) -> u64 {
        tx.vout
            .iter()
            .filter(|output| filter.intersects(self.resolver.resolve_ownership(&output.script)))
            .map(|output| output.value)
            .sum()
    }

    /// Value of owned outputs this transaction spends, among those the ledger knows
    pub fn debit(&self, tx: &Transaction, filter: UtxoState) -> u64 {
        self.spent_outputs(tx)
            .filter(|output| filter.intersects(self.resolver.resolve_ownership(&output.script)))
            .map(|output| output.value)
            .sum()
    }

    /// Known outputs consumed by `tx`
    pub fn spent_outputs<'a>(
        &'a self,
        tx: &'a Transaction,
    ) -> impl Iterator<Item = &'a TxOut> + 'a {
        tx.vin
            .iter()
            .filter_map(|input| input.prevout.as_ref())
            .filter_map(|prevout| self.get_output(prevout))
    }

    /// Confirmed, unlocked, spendable outputs worth exactly `collateral_amount`, with the
    /// derivation path of their key.
    pub fn find_collateral_candidates(&self, collateral_amount: u64) -> Vec<(TxOut, String)> {
        self.select_utxos(UtxoState::SPENDABLE, None, true, false)
            .into_iter()
            .filter(|output| output.value == collateral_amount)
            .filter_map(|output| {
                let path = self.resolver.path_of_script(&output.script)?.to_string();
                Some((output, path))
            })
            .collect()
    }
}
