//! Script templates understood by the wallet.
//!
//! Only two templates are recognised, both by fixed byte offsets:
//!
//! - P2PKH: `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
//! - P2CS:  `OP_DUP OP_HASH160 OP_ROT OP_IF OP_CHECKCOLDSTAKEVERIFY[_LOF] <staker 20>
//!   OP_ELSE <owner 20> OP_ENDIF OP_EQUALVERIFY OP_CHECKSIG`
//!
//! Everything else decodes to [`ScriptTemplate::Unknown`].

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_ROT: u8 = 0x7b;
const OP_IF: u8 = 0x63;
const OP_ELSE: u8 = 0x67;
const OP_ENDIF: u8 = 0x68;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKCOLDSTAKEVERIFY_LOF: u8 = 0xd1;
const OP_CHECKCOLDSTAKEVERIFY: u8 = 0xd2;
const PUSH_20: u8 = 0x14;

pub const HASH_LEN: usize = 20;
pub const P2PKH_LEN: usize = 25;
pub const P2CS_LEN: usize = 51;

/// Offset of the key hash in a P2PKH script
pub const P2PKH_START_INDEX: usize = 3;
/// Offset of the staker key hash in a P2CS script
pub const STAKER_START_INDEX: usize = 6;
/// Offset of the owner key hash in a P2CS script
pub const OWNER_START_INDEX: usize = 28;

/// Decoded view over a redeem script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate<'a> {
    P2pkh { hash: &'a [u8] },
    P2cs { staker: &'a [u8], owner: &'a [u8] },
    Unknown,
}

pub fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == P2PKH_LEN
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == PUSH_20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

pub fn is_p2cs(script: &[u8]) -> bool {
    script.len() == P2CS_LEN
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == OP_ROT
        && script[3] == OP_IF
        && matches!(script[4], OP_CHECKCOLDSTAKEVERIFY | OP_CHECKCOLDSTAKEVERIFY_LOF)
        && script[5] == PUSH_20
        && script[26] == OP_ELSE
        && script[27] == PUSH_20
        && script[48] == OP_ENDIF
        && script[49] == OP_EQUALVERIFY
        && script[50] == OP_CHECKSIG
}

/// Decode a script. Foreign or malformed scripts are not an error.
pub fn decode(script: &[u8]) -> ScriptTemplate<'_> {
    if is_p2pkh(script) {
        ScriptTemplate::P2pkh {
            hash: &script[P2PKH_START_INDEX..P2PKH_START_INDEX + HASH_LEN],
        }
    } else if is_p2cs(script) {
        ScriptTemplate::P2cs {
            staker: &script[STAKER_START_INDEX..STAKER_START_INDEX + HASH_LEN],
            owner: &script[OWNER_START_INDEX..OWNER_START_INDEX + HASH_LEN],
        }
    } else {
        ScriptTemplate::Unknown
    }
}

pub fn p2pkh_script(hash: &[u8; HASH_LEN]) -> Vec<u8> {
    let mut script = Vec::with_capacity(P2PKH_LEN);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, PUSH_20]);
    script.extend_from_slice(hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

pub fn p2cs_script(staker: &[u8; HASH_LEN], owner: &[u8; HASH_LEN]) -> Vec<u8> {
    let mut script = Vec::with_capacity(P2CS_LEN);
    script.extend_from_slice(&[
        OP_DUP,
        OP_HASH160,
        OP_ROT,
        OP_IF,
        OP_CHECKCOLDSTAKEVERIFY,
        PUSH_20,
    ]);
    script.extend_from_slice(staker);
    script.extend_from_slice(&[OP_ELSE, PUSH_20]);
    script.extend_from_slice(owner);
    script.extend_from_slice(&[OP_ENDIF, OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// Base58Check-encode a key hash under the given version byte.
pub fn encode_address(version: u8, hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + hash.len());
    payload.push(version);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}

/// Decode a Base58Check address into its version byte and key hash.
pub fn decode_address(address: &str) -> Option<(u8, [u8; HASH_LEN])> {
    let payload = bs58::decode(address).with_check(None).into_vec().ok()?;
    if payload.len() != 1 + HASH_LEN {
        return None;
    }
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(&payload[1..]);
    Some((payload[0], hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2pkh_decodes_hash() {
        let hash = [7u8; HASH_LEN];
        let script = p2pkh_script(&hash);
        assert_eq!(script.len(), P2PKH_LEN);
        assert_eq!(decode(&script), ScriptTemplate::P2pkh { hash: &hash });
    }

    #[test]
    fn test_p2cs_decodes_both_hashes() {
        let staker = [1u8; HASH_LEN];
        let owner = [2u8; HASH_LEN];
        let script = p2cs_script(&staker, &owner);
        assert_eq!(script.len(), P2CS_LEN);
        assert_eq!(
            decode(&script),
            ScriptTemplate::P2cs {
                staker: &staker,
                owner: &owner
            }
        );

        let mut lof = script.clone();
        lof[4] = OP_CHECKCOLDSTAKEVERIFY_LOF;
        assert!(is_p2cs(&lof));
    }

    #[test]
    fn test_foreign_scripts_are_unknown() {
        assert_eq!(decode(&[]), ScriptTemplate::Unknown);
        assert_eq!(decode(&[0xf8]), ScriptTemplate::Unknown);
        // OP_RETURN
        assert_eq!(decode(&[0x6a, 0x04, 1, 2, 3, 4]), ScriptTemplate::Unknown);

        let mut truncated = p2pkh_script(&[3u8; HASH_LEN]);
        truncated.pop();
        assert_eq!(decode(&truncated), ScriptTemplate::Unknown);
    }

    #[test]
    fn test_address_encoding() {
        let hash = [9u8; HASH_LEN];
        let address = encode_address(23, &hash);
        assert!(address.starts_with('A'));
        assert_eq!(decode_address(&address), Some((23, hash)));
        assert_eq!(decode_address("not-an-address"), None);
    }
}
