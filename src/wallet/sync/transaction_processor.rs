use crate::explorer::{RawTransaction, RawVin, RawVout, is_txid};
use crate::wallet::model::{Outpoint, Transaction, TxIn, TxOut};
use crate::wallet::types::WalletSyncError;

use tracing::{debug, error};

/// Converts explorer records into ledger transactions
#[derive(Clone, Default)]
pub struct TransactionProcessor;

impl TransactionProcessor {
    pub fn new() -> Self {
        Self
    }

    fn decode_hex(
        field: &str,
        txid: &str,
        hex_str: Option<&str>,
    ) -> Result<Vec<u8>, WalletSyncError> {
        hex::decode(hex_str.unwrap_or_default()).map_err(|e| {
            error!("[PARSE_TRANSACTION] Bad {} hex in {}: {}", field, txid, e);
            WalletSyncError::ParseError(format!("Failed to decode {} of {}: {}", field, txid, e))
        })
    }

    fn parse_input(txid: &str, vin: &RawVin) -> Result<TxIn, WalletSyncError> {
        if let Some(prev) = vin.txid.as_deref().filter(|prev| !is_txid(prev)) {
            return Err(WalletSyncError::ParseError(format!(
                "Invalid prevout txid {:?} in {}",
                prev, txid
            )));
        }
        Ok(TxIn {
            prevout: vin
                .txid
                .as_ref()
                .map(|prev| Outpoint::new(prev.clone(), vin.vout)),
            script_sig: Self::decode_hex("input script", txid, vin.hex.as_deref())?,
        })
    }

    fn parse_output(txid: &str, vout: &RawVout) -> Result<TxOut, WalletSyncError> {
        let value = vout.value.parse::<u64>().map_err(|e| {
            WalletSyncError::ParseError(format!(
                "Invalid value {:?} in {}:{}: {}",
                vout.value, txid, vout.n, e
            ))
        })?;
        Ok(TxOut {
            outpoint: Outpoint::new(txid, vout.n),
            script: Self::decode_hex("output script", txid, vout.hex.as_deref())?,
            value,
        })
    }

    /// Parse a raw explorer record into a Transaction.
    ///
    /// Txids end up as record keys on disk, so every txid must be 64 hex characters.
    pub fn parse_transaction(&self, raw: &RawTransaction) -> Result<Transaction, WalletSyncError> {
        if !is_txid(&raw.txid) {
            return Err(WalletSyncError::ParseError(format!(
                "Invalid txid {:?}",
                raw.txid
            )));
        }
        let vin = raw
            .vin
            .iter()
            .map(|vin| Self::parse_input(&raw.txid, vin))
            .collect::<Result<Vec<_>, _>>()?;
        let vout = raw
            .vout
            .iter()
            .map(|vout| Self::parse_output(&raw.txid, vout))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transaction {
            txid: raw.txid.clone(),
            block_height: u32::try_from(raw.block_height).ok(),
            vin,
            vout,
            block_time: raw.block_time,
        })
    }

    /// Batch process a page of records, ascending by block height with pending ones last.
    ///
    /// Malformed records are skipped; one bad transaction does not fail the page.
    pub fn process_page(&self, raws: &[RawTransaction]) -> Vec<Transaction> {
        let mut processed: Vec<Transaction> = raws
            .iter()
            .filter_map(|raw| match self.parse_transaction(raw) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    error!("Skipping transaction {}: {}", raw.txid, e);
                    None
                }
            })
            .collect();
        processed.sort_by_key(|tx| tx.block_height.unwrap_or(u32::MAX));
        debug!("Processed {} of {} transactions", processed.len(), raws.len());
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    fn raw(txid: &str, height: i64) -> RawTransaction {
        RawTransaction {
            txid: txid.to_string(),
            block_height: height,
            vin: vec![RawVin {
                txid: Some(id(0xf0)),
                vout: 2,
                hex: Some("00".to_string()),
            }],
            vout: vec![RawVout {
                value: "1500".to_string(),
                n: 0,
                hex: Some("76a9".to_string()),
            }],
            block_time: Some(1_700_000_000),
        }
    }

    #[test]
    fn test_parse_transaction() {
        let tx = TransactionProcessor::new()
            .parse_transaction(&raw(&id(0xaa), 12))
            .unwrap();
        assert_eq!(tx.block_height, Some(12));
        assert_eq!(tx.vin[0].prevout, Some(Outpoint::new(id(0xf0), 2)));
        assert_eq!(tx.vout[0].value, 1500);
        assert_eq!(tx.vout[0].script, vec![0x76, 0xa9]);
        assert_eq!(tx.vout[0].outpoint, Outpoint::new(id(0xaa), 0));
    }

    #[test]
    fn test_pending_and_coinbase() {
        let mut coinbase = raw(&id(0xcb), -1);
        coinbase.vin = vec![RawVin::default()];
        let tx = TransactionProcessor::new()
            .parse_transaction(&coinbase)
            .unwrap();
        assert!(!tx.is_confirmed());
        assert!(tx.is_coinbase());
    }

    #[test]
    fn test_process_page_orders_and_skips_bad_records() {
        let mut bad = raw(&id(0xbd), 5);
        bad.vout[0].value = "not-a-number".to_string();
        let page = vec![raw(&id(0xc0), 30), raw(&id(0x90), -1), bad, raw(&id(0xa0), 10)];

        let txs = TransactionProcessor::new().process_page(&page);
        let ids: Vec<String> = txs.iter().map(|tx| tx.txid.clone()).collect();
        assert_eq!(ids, vec![id(0xa0), id(0xc0), id(0x90)]);
    }

    #[test]
    fn test_rejects_txids_that_are_not_hashes() {
        let processor = TransactionProcessor::new();
        assert!(matches!(
            processor.parse_transaction(&raw("../../../escaped", 7)),
            Err(WalletSyncError::ParseError(_))
        ));

        let mut bad_prevout = raw(&id(0xab), 7);
        bad_prevout.vin[0].txid = Some("../prev".to_string());
        assert!(matches!(
            processor.parse_transaction(&bad_prevout),
            Err(WalletSyncError::ParseError(_))
        ));

        let page = vec![raw("../../../escaped", 8), bad_prevout, raw(&id(0xac), 9)];
        let txs = processor.process_page(&page);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].txid, id(0xac));
    }
}
