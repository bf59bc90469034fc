//! Peggy Bridge Core - coordination between a Cosmos chain and an EVM bridge contract
//!
//! Validators run an orchestrator that watches the counterparty bridge
//! contract and reports its events as claims. The core aggregates those
//! claims into attestations and applies an event once validators holding
//! 66% of the voting power agree on it.
//!
//! # Outgoing Flow
//! 1. A user queues a withdrawal with `SendToEth`; the coins are locked or burned
//! 2. Anyone requests a batch of the best-paying withdrawals of a token
//! 3. Validators sign the batch checkpoint with their counterparty keys
//! 4. A relayer submits the batch; the executed event comes back as a claim
//!
//! # Incoming Flow
//! 1. A user locks tokens in the bridge contract
//! 2. Orchestrators submit deposit claims in event-nonce order
//! 3. At block end the attestation is tallied and the receiver is credited
//!
//! # Validator Set
//! Snapshots of the bonded set are requested whenever power drifts by more
//! than 5% and are signed the same way as batches. Validators that fail to
//! sign snapshots or batches within a window, or that sign anything the chain
//! never produced, are slashed and jailed.
//!
//! The host chain modules (staking, bank, slashing, accounts) are reached
//! through the traits in [`keepers`].

pub mod attestation;
pub mod batch;
pub mod cache;
pub mod claims;
pub mod contract;
pub mod denom;
pub mod deps;
pub mod error;
pub mod events;
mod execute;
pub mod handler;
pub mod hash;
pub mod keepers;
pub mod msg;
pub mod pool;
pub mod query;
pub mod signature;
pub mod slashing;
pub mod state;
pub mod valset;

pub use crate::cache::{with_cache, CacheStorage};
pub use crate::deps::{BridgeDeps, BridgeRef};
pub use crate::error::ContractError;
pub use crate::hash::{batch_checkpoint, delegate_keys_sign_bytes, keccak256, valset_checkpoint};
pub use crate::keepers::{AccountKeeper, BankKeeper, Keepers, SlashingKeeper, StakingKeeper};
