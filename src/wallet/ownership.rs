//! Address ownership resolution.
//!
//! The resolver answers "does this script pay us, and in which role" by decoding the script
//! template, turning each embedded key hash into an address, and looking the address up in the
//! set of addresses derived so far. For HD identities that set is a sliding window per chain
//! that grows as owned outputs are observed (gap-limit scanning).

use crate::config::ChainParams;
use crate::wallet::model::TxOut;
use crate::wallet::script::{self, ScriptTemplate};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// BIP44 chains tracked per account: 0 external, 1 internal (change)
pub const CHAINS: usize = 2;
/// Path recorded for the single address of a non-HD identity
pub const LEGACY_PATH: &str = "legacy";

bitflags! {
    /// Role of an output with respect to the wallet, plus selection modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct UtxoState: u8 {
        /// Have the key to spend this P2PKH output
        const SPENDABLE = 0b0000_0001;
        /// Own the spending side of this P2CS output
        const SPENDABLE_COLD = 0b0000_0010;
        /// Hold the staking key of this P2CS output
        const COLD_RECEIVED = 0b0000_0100;
        /// Filter modifier: include coinbase/coinstake outputs that are not mature yet
        const IMMATURE = 0b0000_1000;
        /// Filter modifier: include locked outputs
        const LOCKED = 0b0001_0000;

        const SPENDABLE_TOTAL = Self::SPENDABLE.bits() | Self::SPENDABLE_COLD.bits();
    }
}

impl UtxoState {
    pub const NOT_MINE: Self = Self::empty();
}

/// Script templates the resolver can classify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    P2pkh,
    P2cs,
    Unknown,
}

/// Result of [`OwnershipResolver::classify_script`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptClassification {
    pub kind: ScriptKind,
    /// P2PKH: `[address]`. P2CS: `[staker address, owner address]`.
    pub addresses: Vec<String>,
}

/// Key material collaborator. Derivation itself lives outside this crate.
pub trait KeyProvider: Send + Sync {
    /// Address for a full derivation path
    fn derive_address(&self, path: &str) -> String;
    /// Public identity used to query the explorer and to bind persisted state
    fn identity_export_key(&self) -> String;
    /// Whether gap-limit scanning applies
    fn is_hierarchical(&self) -> bool;
    fn account(&self) -> u32 {
        0
    }
}

/// Watch-only identity for a single non-HD address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOnlyAddress {
    address: String,
}

impl WatchOnlyAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl KeyProvider for WatchOnlyAddress {
    fn derive_address(&self, _path: &str) -> String {
        self.address.clone()
    }

    fn identity_export_key(&self) -> String {
        self.address.clone()
    }

    fn is_hierarchical(&self) -> bool {
        false
    }
}

/// Memo of key-hash to address encodings.
///
/// Entries are pure functions of their key so they are never invalidated. Growth follows the
/// scripts seen by the wallet's own sync, which keeps an unbounded map acceptable.
pub trait AddressCache: Send + Sync {
    fn get(&self, version: u8, hash_hex: &str) -> Option<String>;
    fn insert(&self, version: u8, hash_hex: String, address: String);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct UnboundedAddressCache {
    entries: RwLock<HashMap<(u8, String), String>>,
}

impl AddressCache for UnboundedAddressCache {
    fn get(&self, version: u8, hash_hex: &str) -> Option<String> {
        // A poisoned memo is still a valid memo
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&(version, hash_hex.to_string())).cloned()
    }

    fn insert(&self, version: u8, hash_hex: String, address: String) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert((version, hash_hex), address);
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Maps scripts to owned addresses and derivation paths.
pub struct OwnershipResolver {
    keys: Arc<dyn KeyProvider>,
    pubkey_version: u8,
    staking_version: u8,
    coin_type: u32,
    gap_limit: u32,
    /// Our own address -> derivation path
    own_addresses: HashMap<String, String>,
    /// Per chain: highest index present in `own_addresses`
    loaded_indexes: [u32; CHAINS],
    /// Per chain: highest index seen on chain
    highest_used_indexes: [u32; CHAINS],
    /// Per chain: last index handed out by `next_receive_address`
    address_cursors: [u32; CHAINS],
    cache: Arc<dyn AddressCache>,
}

impl OwnershipResolver {
    pub fn new(keys: Arc<dyn KeyProvider>, params: &ChainParams, gap_limit: u32) -> Self {
        Self::with_cache(
            keys,
            params,
            gap_limit,
            Arc::new(UnboundedAddressCache::default()),
        )
    }

    pub fn with_cache(
        keys: Arc<dyn KeyProvider>,
        params: &ChainParams,
        gap_limit: u32,
        cache: Arc<dyn AddressCache>,
    ) -> Self {
        let mut resolver = Self {
            keys,
            pubkey_version: params.pubkey_address_version,
            staking_version: params.staking_address_version,
            coin_type: params.bip44_coin_type,
            gap_limit,
            own_addresses: HashMap::new(),
            loaded_indexes: [0; CHAINS],
            highest_used_indexes: [0; CHAINS],
            address_cursors: [0; CHAINS],
            cache,
        };
        resolver.load_initial_window();
        resolver
    }

    fn load_initial_window(&mut self) {
        for chain in 0..CHAINS as u32 {
            self.load_addresses(chain, self.gap_limit);
        }
    }

    pub fn key_provider(&self) -> &Arc<dyn KeyProvider> {
        &self.keys
    }

    pub fn gap_limit(&self) -> u32 {
        self.gap_limit
    }

    /// Clear every owned address and index, then reload the initial window.
    ///
    /// The address memo is kept: its entries do not depend on the identity.
    pub fn reset(&mut self) {
        self.own_addresses.clear();
        self.loaded_indexes = [0; CHAINS];
        self.highest_used_indexes = [0; CHAINS];
        self.address_cursors = [0; CHAINS];
        self.load_initial_window();
    }

    pub fn derivation_path(&self, chain: u32, index: u32) -> String {
        format!(
            "m/44'/{}'/{}'/{}/{}",
            self.coin_type,
            self.keys.account(),
            chain,
            index
        )
    }

    /// Derive `gap_limit` addresses past the highest loaded index of `chain`.
    ///
    /// Already-loaded indices map to the same address, so overlapping calls are harmless.
    /// Non-HD identities register their single address under [`LEGACY_PATH`].
    pub fn load_addresses(&mut self, chain: u32, gap_limit: u32) {
        if !self.keys.is_hierarchical() {
            self.own_addresses
                .insert(self.keys.identity_export_key(), LEGACY_PATH.to_string());
            return;
        }
        let Some(slot) = self.loaded_indexes.get(chain as usize).copied() else {
            return;
        };
        let end = slot + gap_limit;
        for index in slot..=end {
            let path = self.derivation_path(chain, index);
            let address = self.keys.derive_address(&path);
            self.own_addresses.insert(address, path);
        }
        self.loaded_indexes[chain as usize] = end;
        debug!("Loaded addresses for chain {} up to index {}", chain, end);
    }

    pub fn loaded_index(&self, chain: u32) -> Option<u32> {
        self.loaded_indexes.get(chain as usize).copied()
    }

    pub fn highest_used_index(&self, chain: u32) -> Option<u32> {
        self.highest_used_indexes.get(chain as usize).copied()
    }

    pub fn owned_address_count(&self) -> usize {
        self.own_addresses.len()
    }

    /// Derivation path of an owned address
    pub fn is_own_address(&self, address: &str) -> Option<&str> {
        self.own_addresses.get(address).map(String::as_str)
    }

    /// Memoized key-hash to address encoding
    pub fn derive_and_cache_address(&self, hash: &[u8], is_staking_side: bool) -> String {
        let version = if is_staking_side {
            self.staking_version
        } else {
            self.pubkey_version
        };
        let hash_hex = hex::encode(hash);
        if let Some(address) = self.cache.get(version, &hash_hex) {
            return address;
        }
        let address = script::encode_address(version, hash);
        self.cache.insert(version, hash_hex, address.clone());
        address
    }

    pub fn classify_script(&self, script: &[u8]) -> ScriptClassification {
        match script::decode(script) {
            ScriptTemplate::P2pkh { hash } => ScriptClassification {
                kind: ScriptKind::P2pkh,
                addresses: vec![self.derive_and_cache_address(hash, false)],
            },
            ScriptTemplate::P2cs { staker, owner } => ScriptClassification {
                kind: ScriptKind::P2cs,
                addresses: vec![
                    self.derive_and_cache_address(staker, true),
                    self.derive_and_cache_address(owner, false),
                ],
            },
            ScriptTemplate::Unknown => ScriptClassification {
                kind: ScriptKind::Unknown,
                addresses: Vec::new(),
            },
        }
    }

    /// Role of a script for this wallet: exactly one role bit, or `NOT_MINE`.
    pub fn resolve_ownership(&self, script: &[u8]) -> UtxoState {
        let ScriptClassification { kind, addresses } = self.classify_script(script);
        let Some(position) = addresses
            .iter()
            .position(|address| self.is_own_address(address).is_some())
        else {
            return UtxoState::NOT_MINE;
        };
        match (kind, position) {
            (ScriptKind::P2pkh, _) => UtxoState::SPENDABLE,
            (ScriptKind::P2cs, 0) => UtxoState::COLD_RECEIVED,
            (ScriptKind::P2cs, _) => UtxoState::SPENDABLE_COLD,
            (ScriptKind::Unknown, _) => UtxoState::NOT_MINE,
        }
    }

    /// Derivation path of the key that can spend `script`, if it is ours.
    pub fn path_of_script(&self, script: &[u8]) -> Option<&str> {
        let address = match script::decode(script) {
            ScriptTemplate::P2pkh { hash } => self.derive_and_cache_address(hash, false),
            ScriptTemplate::P2cs { owner, .. } => self.derive_and_cache_address(owner, false),
            ScriptTemplate::Unknown => return None,
        };
        self.is_own_address(&address)
    }

    /// Record that an owned output was seen and extend the address window if needed.
    pub fn advance_high_water_mark(&mut self, output: &TxOut) {
        let Some((chain, index)) = self.path_of_script(&output.script).and_then(parse_path)
        else {
            return;
        };
        let Some(highest) = self.highest_used_indexes.get_mut(chain as usize) else {
            return;
        };
        *highest = (*highest).max(index);
        let highest = *highest;
        if highest + self.gap_limit >= self.loaded_indexes[chain as usize] {
            self.load_addresses(chain, self.gap_limit);
        }
    }

    /// Next unused receive address on `chain` with its path.
    ///
    /// The cursor never runs more than `gap_limit` past the highest used index, otherwise a
    /// restore from seed could not find the funds.
    pub fn next_receive_address(&mut self, chain: u32) -> Option<(String, String)> {
        let last = *self.highest_used_indexes.get(chain as usize)?;
        let cursor = &mut self.address_cursors[chain as usize];
        *cursor = (*cursor).max(last) + 1;
        if *cursor - last > self.gap_limit {
            *cursor = last;
        }
        let index = *cursor;
        let path = self.derivation_path(chain, index);
        Some((self.keys.derive_address(&path), path))
    }
}

/// `(chain, index)` from `m/44'/coin'/account'/chain/index`
fn parse_path(path: &str) -> Option<(u32, u32)> {
    let mut parts = path.split('/').skip(4);
    let chain = parts.next()?.parse().ok()?;
    let index = parts.next()?.parse().ok()?;
    Some((chain, index))
}
