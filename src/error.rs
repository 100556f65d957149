//! Engine error taxonomy.
//!
//! Every query returns `Result<_, SapiError>`. Balance batches additionally
//! collect per-address failures as `AddressError`s instead of failing on the
//! first bad address.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::types::Txid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SapiError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("No information available for address: {}", summarize(.0))]
    AddressNotFound(Vec<AddressError>),

    #[error("No unspent outputs available")]
    NoUtxosAvailable,

    #[error("No deposits available for the given time range")]
    NoDepositAvailable,

    #[error("Requested amount {requested} exceeds spendable balance")]
    BalanceInsufficient { requested: i64 },

    #[error("No solution found within {elapsed_ms}ms")]
    SelectionTimedOut { elapsed_ms: u64 },

    #[error("Page number out of range: {page} (valid: 1 - {pages})")]
    PageOutOfRange { page: u64, pages: u64 },

    #[error("Can't read block at height {0}")]
    BlockNotFound(i32),

    #[error("Can't find tx {txid} in block {height}")]
    TransactionNotFound { txid: Txid, height: i32 },

    #[error("Unknown address type: {0}")]
    UnknownAddressType(u8),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl SapiError {
    /// Stable machine-readable code for serializers
    pub fn code(&self) -> &'static str {
        match self {
            SapiError::InvalidAddress(_) => "InvalidAddress",
            SapiError::AddressNotFound(_) => "AddressNotFound",
            SapiError::NoUtxosAvailable => "NoUTXOsAvailable",
            SapiError::NoDepositAvailable => "NoDepositAvailable",
            SapiError::BalanceInsufficient { .. } => "BalanceInsufficient",
            SapiError::SelectionTimedOut { .. } => "SelectionTimedOut",
            SapiError::PageOutOfRange { .. } => "PageOutOfRange",
            SapiError::BlockNotFound(_) => "BlockNotFound",
            SapiError::TransactionNotFound { .. } => "TransactionNotFound",
            SapiError::UnknownAddressType(_) => "UnknownAddressType",
            SapiError::InvalidParameter(_) => "InvalidParameter",
        }
    }

    /// Errors a batch records per address instead of aborting on
    pub fn is_per_address(&self) -> bool {
        matches!(self, SapiError::InvalidAddress(_) | SapiError::AddressNotFound(_))
    }
}

/// Failure attached to one address of a batch request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{address}: {error}")]
pub struct AddressError {
    pub address: String,
    pub error: SapiError,
}

impl AddressError {
    pub fn new(address: impl Into<String>, error: SapiError) -> Self {
        Self { address: address.into(), error }
    }
}

impl Serialize for AddressError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorEntry::from(self).serialize(serializer)
    }
}

fn summarize(errors: &[AddressError]) -> String {
    if errors.is_empty() {
        return "no addresses given".to_string();
    }
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Serializable error body for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub address: String,
    pub code: &'static str,
    pub message: String,
}

impl From<&AddressError> for ErrorEntry {
    fn from(err: &AddressError) -> Self {
        ErrorEntry { address: err.address.clone(), code: err.error.code(), message: err.error.to_string() }
    }
}

impl From<&SapiError> for ErrorBody {
    fn from(err: &SapiError) -> Self {
        let errors = match err {
            SapiError::AddressNotFound(list) => list.iter().map(ErrorEntry::from).collect(),
            _ => Vec::new(),
        };
        ErrorBody { code: err.code(), message: err.to_string(), errors }
    }
}
