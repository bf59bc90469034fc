//! Common - Shared Types for the Peggy Bridge
//!
//! This package provides the counterparty address type and the 256-bit coin
//! type used by the bridge coordination core and by anything that talks to it.

pub mod coin;
pub mod eth_address;

pub use coin::Coin256;
pub use eth_address::{EthAddress, EthAddressError};
