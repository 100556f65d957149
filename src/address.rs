//! Address codec.
//!
//! Addresses are base58check strings: one version byte, the 20-byte hash and a
//! 4-byte checksum (first four bytes of SHA256(SHA256(version + hash))). The
//! version byte selects the address kind and is network-specific.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SapiError;
use crate::types::{AddressKey, AddressKind};

/// Base58 version prefixes of one network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub pubkey_prefix: u8,
    pub script_prefix: u8,
}

impl Default for NetworkParams {
    /// Mainnet prefixes: 'S' addresses for keys, script hashes on 18
    fn default() -> Self {
        Self { pubkey_prefix: 63, script_prefix: 18 }
    }
}

impl NetworkParams {
    fn kind_for_prefix(&self, prefix: u8) -> Option<AddressKind> {
        if prefix == self.pubkey_prefix {
            Some(AddressKind::PubKeyHash)
        } else if prefix == self.script_prefix {
            Some(AddressKind::ScriptHash)
        } else {
            None
        }
    }

    fn prefix_for_kind(&self, kind: AddressKind) -> u8 {
        match kind {
            AddressKind::PubKeyHash => self.pubkey_prefix,
            AddressKind::ScriptHash => self.script_prefix,
        }
    }
}

fn checksum(data: &[u8]) -> [u8; 4] {
    let first_hash = Sha256::digest(data);
    let second_hash = Sha256::digest(&first_hash);
    let mut out = [0u8; 4];
    out.copy_from_slice(&second_hash[..4]);
    out
}

/// Resolve an address string to its index key
pub fn resolve_address_key(address: &str, params: &NetworkParams) -> Result<AddressKey, SapiError> {
    let invalid = || SapiError::InvalidAddress(address.to_string());

    let data = bs58::decode(address.trim()).into_vec().map_err(|_| invalid())?;
    if data.len() != 25 {
        return Err(invalid());
    }

    let (payload, check) = data.split_at(21);
    if checksum(payload) != check {
        return Err(invalid());
    }

    let kind = params.kind_for_prefix(payload[0]).ok_or_else(invalid)?;
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..21]);
    Ok(AddressKey::new(hash, kind))
}

/// Encode an index key as an address string
pub fn encode_address(key: &AddressKey, params: &NetworkParams) -> String {
    let mut data = Vec::with_capacity(25);
    data.push(params.prefix_for_kind(key.kind));
    data.extend_from_slice(&key.hash);
    let check = checksum(&data);
    data.extend_from_slice(&check);
    bs58::encode(&data).into_string()
}

/// Encode an address from a raw index type code and hash
pub fn address_from_index(
    index_type: u8,
    hash: &[u8; 20],
    params: &NetworkParams,
) -> Result<String, SapiError> {
    let kind = AddressKind::from_index_type(index_type).ok_or(SapiError::UnknownAddressType(index_type))?;
    Ok(encode_address(&AddressKey::new(*hash, kind), params))
}
