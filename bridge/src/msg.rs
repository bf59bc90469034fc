//! Message types for the Peggy bridge coordination core
//!
//! Execute messages are signed by the submitting account (`MessageInfo::sender`):
//! the validator operator for key registration, an orchestrator for signatures
//! and claims, and any account for withdrawals and evidence.

use common::{Coin256, EthAddress};
use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Binary};

use crate::claims::Claim;
use crate::pool::BatchFees;
use crate::state::{
    Attestation, BatchConfirm, LastClaimEvent, LastObservedEthereumBlockHeight,
    OutgoingTransferTx, OutgoingTxBatch, Params, Valset, ValsetConfirm,
};

// ============================================================================
// Instantiate
// ============================================================================

#[cw_serde]
pub struct InstantiateMsg {
    pub params: Params,
}

// ============================================================================
// Execute Messages
// ============================================================================

/// Entity a counterparty signature claims to cover
#[cw_serde]
pub enum SignedSubject {
    Valset(Valset),
    Batch(OutgoingTxBatch),
}

#[cw_serde]
pub enum ExecuteMsg {
    // ========================================================================
    // Key Delegation
    // ========================================================================
    /// Bind an orchestrator account and a counterparty key to the sending validator
    SetOrchestratorAddresses {
        /// Defaults to the sender
        orchestrator: Option<String>,
        eth_address: EthAddress,
        /// personal_sign over keccak256(abi.encode(validator, sequence - 1))
        eth_signature: Binary,
    },

    // ========================================================================
    // Signatures
    // ========================================================================
    /// Sign a stored snapshot
    ValsetConfirm {
        nonce: u64,
        eth_address: EthAddress,
        signature: Binary,
    },

    /// Sign a stored batch
    ConfirmBatch {
        nonce: u64,
        token_contract: EthAddress,
        eth_signer: EthAddress,
        signature: Binary,
    },

    // ========================================================================
    // Outgoing Transfers
    // ========================================================================
    /// Queue a withdrawal to the counterparty; `amount + bridge_fee` leaves the sender
    SendToEth {
        eth_dest: EthAddress,
        amount: Coin256,
        bridge_fee: Coin256,
    },

    /// Cancel an unbatched withdrawal and refund it
    CancelSendToEth { transaction_id: u64 },

    /// Build a batch from the best-paying unbatched withdrawals of a denom
    RequestBatch { denom: String },

    // ========================================================================
    // Claims and Evidence
    // ========================================================================
    /// Report a counterparty event
    SubmitClaim { claim: Claim },

    /// Prove a validator's counterparty key signed something the chain never produced
    SubmitBadSignatureEvidence {
        subject: SignedSubject,
        signature: Binary,
    },
}

// ============================================================================
// Query Messages
// ============================================================================

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    #[returns(Params)]
    Params {},

    /// Snapshot the bonded set would produce right now
    #[returns(ValsetResponse)]
    CurrentValset {},

    #[returns(ValsetResponse)]
    ValsetRequest { nonce: u64 },

    /// Latest five stored snapshots, newest first
    #[returns(ValsetsResponse)]
    LastValsetRequests {},

    #[returns(ValsetConfirmResponse)]
    ValsetConfirm { nonce: u64, validator: String },

    #[returns(ValsetConfirmsResponse)]
    ValsetConfirmsByNonce { nonce: u64 },

    /// Stored snapshots the orchestrator's validator has not signed yet
    #[returns(ValsetsResponse)]
    LastPendingValsetRequestByAddr { orchestrator: String },

    /// Fee totals of the best batch that could be built per token contract
    #[returns(BatchFeesResponse)]
    BatchFees {},

    #[returns(BatchesResponse)]
    OutgoingTxBatches {},

    #[returns(BatchResponse)]
    BatchRequestByNonce { token_contract: EthAddress, nonce: u64 },

    #[returns(BatchConfirmsResponse)]
    BatchConfirms { token_contract: EthAddress, nonce: u64 },

    /// Oldest stored batch the orchestrator's validator has not signed yet
    #[returns(BatchResponse)]
    LastPendingBatchRequestByAddr { orchestrator: String },

    #[returns(LastClaimEvent)]
    LastEventByAddr { orchestrator: String },

    #[returns(DenomToErc20Response)]
    DenomToErc20 { denom: String },

    #[returns(Erc20ToDenomResponse)]
    Erc20ToDenom { token_contract: EthAddress },

    #[returns(DelegateKeysResponse)]
    DelegateKeysByValidator { validator: String },

    #[returns(DelegateKeysResponse)]
    DelegateKeysByOrchestrator { orchestrator: String },

    #[returns(DelegateKeysResponse)]
    DelegateKeysByEth { eth_address: EthAddress },

    #[returns(PendingSendToEthResponse)]
    PendingSendToEth { sender: String },

    #[returns(ModuleStateResponse)]
    ModuleState {},
}

// ============================================================================
// Query Responses
// ============================================================================

#[cw_serde]
pub struct ValsetResponse {
    pub valset: Option<Valset>,
}

#[cw_serde]
pub struct ValsetsResponse {
    pub valsets: Vec<Valset>,
}

#[cw_serde]
pub struct ValsetConfirmResponse {
    pub confirm: Option<ValsetConfirm>,
}

#[cw_serde]
pub struct ValsetConfirmsResponse {
    pub confirms: Vec<ValsetConfirm>,
}

#[cw_serde]
pub struct BatchFeesResponse {
    pub batch_fees: Vec<BatchFees>,
}

#[cw_serde]
pub struct BatchesResponse {
    pub batches: Vec<OutgoingTxBatch>,
}

#[cw_serde]
pub struct BatchResponse {
    pub batch: Option<OutgoingTxBatch>,
}

#[cw_serde]
pub struct BatchConfirmsResponse {
    pub confirms: Vec<BatchConfirm>,
}

#[cw_serde]
pub struct DenomToErc20Response {
    pub token_contract: EthAddress,
    pub cosmos_originated: bool,
}

#[cw_serde]
pub struct Erc20ToDenomResponse {
    pub denom: String,
    pub cosmos_originated: bool,
}

#[cw_serde]
pub struct DelegateKeysResponse {
    pub validator: Addr,
    pub orchestrator: Addr,
    pub eth_address: EthAddress,
}

#[cw_serde]
pub struct PendingSendToEthResponse {
    pub transfers_in_batches: Vec<OutgoingTransferTx>,
    pub unbatched_transfers: Vec<OutgoingTransferTx>,
}

/// Chain-originated denom binding
#[cw_serde]
pub struct Erc20ToDenom {
    pub erc20: EthAddress,
    pub denom: String,
}

/// Full export of the module's state
#[cw_serde]
pub struct ModuleStateResponse {
    pub params: Params,
    pub last_observed_nonce: u64,
    pub last_observed_ethereum_height: LastObservedEthereumBlockHeight,
    pub last_observed_valset: Option<Valset>,
    pub latest_valset_nonce: u64,
    pub last_tx_pool_id: u64,
    pub last_batch_nonce: u64,
    pub last_slashed_valset_nonce: u64,
    pub last_slashed_batch_block: u64,
    pub last_slashed_claim_nonce: u64,
    pub valsets: Vec<Valset>,
    pub valset_confirms: Vec<ValsetConfirm>,
    pub batches: Vec<OutgoingTxBatch>,
    pub batch_confirms: Vec<BatchConfirm>,
    pub attestations: Vec<Attestation>,
    pub orchestrator_addresses: Vec<DelegateKeysResponse>,
    pub erc20_to_denoms: Vec<Erc20ToDenom>,
    pub unbatched_transfers: Vec<OutgoingTransferTx>,
}
