//! Deterministic fixtures shared by the unit tests.

use crate::wallet::model::{Outpoint, Transaction, TxIn, TxOut};
use crate::wallet::ownership::KeyProvider;
use crate::wallet::script::{self, HASH_LEN};

use sha2::{Digest, Sha256};

const VERSION: u8 = 23;

/// Key provider deriving addresses from `sha256(identity || path)`.
pub struct TestKeys {
    identity: String,
    hierarchical: bool,
}

impl TestKeys {
    pub fn hd(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            hierarchical: true,
        }
    }

    pub fn legacy() -> Self {
        Self {
            identity: script::encode_address(VERSION, &hash(b"legacy")),
            hierarchical: false,
        }
    }
}

impl KeyProvider for TestKeys {
    fn derive_address(&self, path: &str) -> String {
        if !self.hierarchical {
            return self.identity.clone();
        }
        let seed = format!("{}{}", self.identity, path);
        script::encode_address(VERSION, &hash(seed.as_bytes()))
    }

    fn identity_export_key(&self) -> String {
        self.identity.clone()
    }

    fn is_hierarchical(&self) -> bool {
        self.hierarchical
    }
}

fn hash(data: &[u8]) -> [u8; HASH_LEN] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest[..HASH_LEN]);
    out
}

fn hash_of_path(keys: &TestKeys, path: &str) -> [u8; HASH_LEN] {
    let address = keys.derive_address(path);
    script::decode_address(&address)
        .map(|(_, hash)| hash)
        .unwrap_or([0u8; HASH_LEN])
}

pub fn p2pkh_for(keys: &TestKeys, path: &str) -> Vec<u8> {
    script::p2pkh_script(&hash_of_path(keys, path))
}

/// P2CS script with our key on the given side(s); a foreign hash elsewhere.
pub fn cold_script_for(keys: &TestKeys, staker: Option<&str>, owner: Option<&str>) -> Vec<u8> {
    let foreign = [0xee; HASH_LEN];
    let staker = staker.map_or(foreign, |path| hash_of_path(keys, path));
    let owner = owner.map_or(foreign, |path| hash_of_path(keys, path));
    script::p2cs_script(&staker, &owner)
}

pub struct TxBuilder {
    pub txid: String,
    pub height: Option<u32>,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub time: Option<i64>,
}

impl TxBuilder {
    pub fn new(txid: &str, height: Option<u32>) -> Self {
        Self {
            txid: txid.to_string(),
            height,
            vin: Vec::new(),
            vout: Vec::new(),
            time: height.map(|h| 1_700_000_000 + i64::from(h) * 60),
        }
    }

    pub fn input(mut self, txid: &str, n: u32) -> Self {
        self.vin.push(TxIn {
            prevout: Some(Outpoint::new(txid, n)),
            script_sig: Vec::new(),
        });
        self
    }

    pub fn coinbase(mut self) -> Self {
        self.vin.push(TxIn {
            prevout: None,
            script_sig: vec![0x01],
        });
        self
    }

    pub fn output(mut self, script: Vec<u8>, value: u64) -> Self {
        let n = self.vout.len() as u32;
        self.vout.push(TxOut {
            outpoint: Outpoint::new(self.txid.clone(), n),
            script,
            value,
        });
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            txid: self.txid,
            block_height: self.height,
            vin: self.vin,
            vout: self.vout,
            block_time: self.time,
        }
    }
}

impl From<Transaction> for TxBuilder {
    fn from(tx: Transaction) -> Self {
        Self {
            txid: tx.txid,
            height: tx.block_height,
            vin: tx.vin,
            vout: tx.vout,
            time: tx.block_time,
        }
    }
}
