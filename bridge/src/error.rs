//! Error types for the Peggy bridge coordination core
//!
//! Kinds are grouped the way off-chain observers classify them. Only the
//! attestation handler path swallows errors (after logging them); every other
//! error fails the surrounding message atomically.

use common::EthAddressError;
use cosmwasm_std::{StdError, Uint256};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    // ========================================================================
    // Event Nonce Errors
    // ========================================================================

    #[error("non contiguous event nonce: expected {expected}, got {got}")]
    NonContiguousEventNonce { expected: u64, got: u64 },

    // ========================================================================
    // Lookup / Validation Errors
    // ========================================================================

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("unknown: {0}")]
    Unknown(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("empty: {0}")]
    Empty(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid eth address: {0}")]
    InvalidEthAddress(#[from] EthAddressError),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    // ========================================================================
    // Coin Errors
    // ========================================================================

    #[error("insufficient funds: {denom} balance {balance}, need {required}")]
    InsufficientFunds {
        denom: String,
        balance: Uint256,
        required: Uint256,
    },

    #[error("supply overflow: minting {amount} of {denom} exceeds 2^256")]
    SupplyOverflow { denom: String, amount: Uint256 },

    // ========================================================================
    // Batch Errors
    // ========================================================================

    #[error("no unbatched txs found")]
    NoUnbatchedTxsFound,

    #[error("new batch would not be more profitable: pool fees {pool_fees}, last batch fees {last_fees}")]
    BatchNotProfitable {
        pool_fees: Uint256,
        last_fees: Uint256,
    },

    #[error("batch timeout projection overflowed")]
    TimeoutOverflow,

    // ========================================================================
    // Key Delegation Errors
    // ========================================================================

    #[error("set orchestrator addresses: {0}")]
    SetOrchAddresses(String),
}

impl ContractError {
    pub fn unknown(what: impl Into<String>) -> Self {
        ContractError::Unknown(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        ContractError::Invalid(what.into())
    }

    pub fn duplicate(what: impl Into<String>) -> Self {
        ContractError::Duplicate(what.into())
    }
}
