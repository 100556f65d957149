use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::is_confirmed_height;
use crate::script;

// Helpers to (de)serialize raw byte vectors as hex strings
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let text: String = Deserialize::deserialize(deserializer)?;
        hex::decode(text.trim()).map_err(|e| Error::custom(format!("invalid hex: {}", e)))
    }
}

/// 32-byte double-SHA256 hash in internal byte order.
///
/// Displays (and serializes) in the conventional reversed order, the same way
/// node RPCs print txids and block hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

pub type Txid = Hash256;
pub type BlockHash = Hash256;

impl Hash256 {
    pub fn to_hex(&self) -> String {
        format!("{:x}", self)
    }
}

impl fmt::LowerHex for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({:x})", self)
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        bytes.reverse();
        Ok(Hash256(bytes))
    }
}

impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let text: String = Deserialize::deserialize(deserializer)?;
        Hash256::from_str(&text).map_err(|e| Error::custom(format!("invalid hash {}: {}", text, e)))
    }
}

/// Reference to one transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// Address kinds the index knows about.
///
/// The numeric codes are the ones stored in index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    PubKeyHash,
    ScriptHash,
}

impl AddressKind {
    pub fn index_type(&self) -> u8 {
        match self {
            AddressKind::PubKeyHash => 1,
            AddressKind::ScriptHash => 2,
        }
    }

    pub fn from_index_type(code: u8) -> Option<Self> {
        match code {
            1 => Some(AddressKind::PubKeyHash),
            2 => Some(AddressKind::ScriptHash),
            _ => None,
        }
    }
}

/// Index lookup key for an address: hash160 plus kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressKey {
    #[serde(with = "hash160_hex")]
    pub hash: [u8; 20],
    pub kind: AddressKind,
}

impl AddressKey {
    pub fn new(hash: [u8; 20], kind: AddressKind) -> Self {
        Self { hash, kind }
    }
}

mod hash160_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 20], D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let text: String = Deserialize::deserialize(deserializer)?;
        let mut out = [0u8; 20];
        hex::decode_to_slice(text.trim(), &mut out)
            .map_err(|e| Error::custom(format!("invalid hash160: {}", e)))?;
        Ok(out)
    }
}

/// One entry of the unspent-output index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutputRecord {
    pub txid: Txid,
    pub output_index: u32,
    pub amount_satoshis: i64,
    pub block_height: i32,
}

impl UnspentOutputRecord {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.output_index)
    }
}

/// Signed value change of an address at a ledger height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressIndexDelta {
    pub txid: Txid,
    pub block_height: i32,
    /// Input (spend) rather than output (receive) entry
    #[serde(default)]
    pub spending: bool,
    pub amount_satoshis: i64,
}

/// Unconfirmed value change seen in the mempool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolDelta {
    pub txid: Txid,
    /// Output index for receives, input index for spends
    pub index: u32,
    /// Address index type code of the affected address
    pub address_type: u8,
    pub amount_satoshis: i64,
    /// Time the transaction entered the mempool
    pub timestamp: i64,
    /// Previous output consumed, set for negative deltas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevout: Option<OutPoint>,
}

/// Position marker returned with the unspent count.
///
/// Reverse scans start from the marked entry (the newest one).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnspentCursor {
    pub last: Option<OutPoint>,
}

/// Confirmed receipt of an address, keyed by the time of its block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub txid: Txid,
    pub block_height: i32,
    pub timestamp: i64,
    pub amount_satoshis: i64,
}

/// Deposits inside a time range: how many, and the timestamps bounding them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepositSpan {
    pub count: usize,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOut {
    pub value: i64,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// Lock value encoded in front of the output script, zero if none
    pub fn lock_time(&self) -> u32 {
        script::output_lock_time(&self.script_pubkey)
    }

    pub fn destination(&self) -> Option<AddressKey> {
        script::extract_destination(&self.script_pubkey)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: Txid,
    pub outputs: Vec<TxOut>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: i32,
    pub hash: BlockHash,
    #[serde(default)]
    pub time: i64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn find_transaction(&self, txid: &Txid) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| &tx.txid == txid)
    }
}

/// Confirmations of an output mined at `block_height`, 0 when unconfirmed
pub fn confirmations_at(chain_height: i32, block_height: i32) -> i32 {
    if !is_confirmed_height(block_height) || block_height > chain_height {
        return 0;
    }
    chain_height - block_height + 1
}
