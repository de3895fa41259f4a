//! # Domain Layer
//!
//! Configuration, frame classification, transaction ids and errors. No I/O.

pub mod config;
pub mod errors;
pub mod frame;
pub mod transaction;

pub use config::{
    local_uid, AddressFamily, CtrlEndpoint, EngineLogging, TincanConfig, TurnConfig, VnetConfig,
    LOCAL_UID_HEX_LEN,
};
pub use errors::TincanError;
pub use frame::{classify_dataframe, ethertype, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_IPV6};
pub use transaction::TransactionCounter;
