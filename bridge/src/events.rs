//! Events emitted for off-chain observers
//!
//! Every event carries the bridge contract address and chain id so relayers
//! watching several bridges can tell them apart.

use common::EthAddress;
use cosmwasm_std::{Addr, Decimal, Event};

use crate::claims::ClaimType;
use crate::state::{OutgoingTransferTx, OutgoingTxBatch, Params, Valset};

fn bridge_event(kind: &str, params: &Params) -> Event {
    Event::new(kind)
        .add_attribute("bridge_contract", params.bridge_contract_address.to_string())
        .add_attribute("bridge_chain_id", params.bridge_chain_id.to_string())
}

/// Storage-key style identifier of an attestation: `hex(nonce_be || claim_hash)`
pub fn attestation_id(event_nonce: u64, claim_hash: &[u8]) -> String {
    let mut key = event_nonce.to_be_bytes().to_vec();
    key.extend_from_slice(claim_hash);
    hex::encode(key)
}

// ============================================================================
// Attestations
// ============================================================================

pub fn claim_submitted(
    params: &Params,
    claim_type: ClaimType,
    event_nonce: u64,
    orchestrator: &Addr,
    validator: &Addr,
) -> Event {
    bridge_event("claim_submitted", params)
        .add_attribute("claim_type", claim_type.as_str())
        .add_attribute("event_nonce", event_nonce.to_string())
        .add_attribute("orchestrator", orchestrator)
        .add_attribute("validator", validator)
}

pub fn attestation_vote(params: &Params, event_nonce: u64, claim_hash: &[u8], validator: &Addr) -> Event {
    bridge_event("attestation_vote", params)
        .add_attribute("event_nonce", event_nonce.to_string())
        .add_attribute("attestation_id", attestation_id(event_nonce, claim_hash))
        .add_attribute("voter", validator)
}

pub fn attestation_observed(
    params: &Params,
    claim_type: ClaimType,
    event_nonce: u64,
    claim_hash: &[u8],
) -> Event {
    bridge_event("attestation_observed", params)
        .add_attribute("claim_type", claim_type.as_str())
        .add_attribute("event_nonce", event_nonce.to_string())
        .add_attribute("attestation_id", attestation_id(event_nonce, claim_hash))
}

pub fn erc20_deployed(params: &Params, denom: &str, token_contract: &EthAddress) -> Event {
    bridge_event("erc20_deployed", params)
        .add_attribute("cosmos_denom", denom)
        .add_attribute("token_contract", token_contract.to_string())
}

// ============================================================================
// Validator Sets
// ============================================================================

pub fn valset_created(params: &Params, valset: &Valset) -> Event {
    bridge_event("valset_created", params)
        .add_attribute("valset_nonce", valset.nonce.to_string())
        .add_attribute("members", valset.members.len().to_string())
}

pub fn valset_confirm(params: &Params, nonce: u64, validator: &Addr) -> Event {
    bridge_event("valset_confirm", params)
        .add_attribute("valset_nonce", nonce.to_string())
        .add_attribute("validator", validator)
}

pub fn set_orchestrator_address(
    params: &Params,
    validator: &Addr,
    orchestrator: &Addr,
    eth_address: &EthAddress,
) -> Event {
    bridge_event("set_orchestrator_address", params)
        .add_attribute("validator", validator)
        .add_attribute("orchestrator", orchestrator)
        .add_attribute("eth_address", eth_address.to_string())
}

// ============================================================================
// Pool and Batches
// ============================================================================

pub fn withdraw_enqueued(params: &Params, tx: &OutgoingTransferTx) -> Event {
    bridge_event("withdraw_enqueued", params)
        .add_attribute("tx_id", tx.id.to_string())
        .add_attribute("sender", &tx.sender)
        .add_attribute("dest_address", tx.dest_address.to_string())
        .add_attribute("token_contract", tx.erc20_token.contract.to_string())
        .add_attribute("amount", tx.erc20_token.amount.to_string())
        .add_attribute("fee", tx.erc20_fee.amount.to_string())
}

pub fn withdraw_cancelled(params: &Params, tx: &OutgoingTransferTx) -> Event {
    bridge_event("withdraw_cancelled", params)
        .add_attribute("tx_id", tx.id.to_string())
        .add_attribute("sender", &tx.sender)
}

pub fn batch_created(params: &Params, batch: &OutgoingTxBatch) -> Event {
    bridge_event("batch_created", params)
        .add_attribute("batch_nonce", batch.batch_nonce.to_string())
        .add_attribute("token_contract", batch.token_contract.to_string())
        .add_attribute("batch_timeout", batch.batch_timeout.to_string())
        .add_attribute("tx_count", batch.transactions.len().to_string())
}

pub fn batch_cancelled(params: &Params, token_contract: &EthAddress, nonce: u64) -> Event {
    bridge_event("batch_cancelled", params)
        .add_attribute("batch_nonce", nonce.to_string())
        .add_attribute("token_contract", token_contract.to_string())
}

pub fn batch_executed(params: &Params, token_contract: &EthAddress, nonce: u64) -> Event {
    bridge_event("batch_executed", params)
        .add_attribute("batch_nonce", nonce.to_string())
        .add_attribute("token_contract", token_contract.to_string())
}

pub fn batch_confirm(params: &Params, token_contract: &EthAddress, nonce: u64, validator: &Addr) -> Event {
    bridge_event("batch_confirm", params)
        .add_attribute("batch_nonce", nonce.to_string())
        .add_attribute("token_contract", token_contract.to_string())
        .add_attribute("validator", validator)
}

// ============================================================================
// Slashing
// ============================================================================

pub fn validator_slashed(
    params: &Params,
    reason: &str,
    validator: &Addr,
    subject_nonce: u64,
    fraction: Decimal,
    jailed: bool,
) -> Event {
    bridge_event("validator_slashed", params)
        .add_attribute("reason", reason)
        .add_attribute("validator", validator)
        .add_attribute("nonce", subject_nonce.to_string())
        .add_attribute("fraction", fraction.to_string())
        .add_attribute("jailed", jailed.to_string())
}

pub fn bad_signature_slashed(
    params: &Params,
    validator: &Addr,
    eth_signer: &EthAddress,
    checkpoint: &[u8; 32],
) -> Event {
    bridge_event("bad_signature_slashed", params)
        .add_attribute("validator", validator)
        .add_attribute("eth_signer", eth_signer.to_string())
        .add_attribute("checkpoint", hex::encode(checkpoint))
}
