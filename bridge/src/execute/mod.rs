//! Execute handlers for the Peggy bridge
//!
//! Organized by message family:
//! - `keys` - validator key delegation
//! - `confirms` - snapshot and batch signatures
//! - `outgoing` - withdrawals and batch requests
//! - `claims` - counterparty event claims
//! - `evidence` - bad counterparty signature evidence

mod claims;
mod confirms;
mod evidence;
mod keys;
mod outgoing;

pub use claims::*;
pub use confirms::*;
pub use evidence::*;
pub use keys::*;
pub use outgoing::*;
