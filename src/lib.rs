//! Address accounting and UTXO selection over an address-indexed ledger.
//!
//! Queries read through the collaborator traits in [`ledger`]; nothing here
//! mutates ledger state.

pub mod address;
pub mod amount;
pub mod balance;
pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod deposits;
pub mod error;
pub mod fee;
pub mod history;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod paging;
pub mod script;
pub mod selection;
pub mod telemetry;
pub mod timelock;
pub mod types;
pub mod unspent;


pub use error::{AddressError, SapiError};
pub use ledger::{AddressIndex, ChainView, Collaborators, DepositIndex, MempoolView};
