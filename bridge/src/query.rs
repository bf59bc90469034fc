//! Query handlers for the Peggy bridge core.
//!
//! Orchestrators poll these to find work (unsigned snapshots and batches,
//! their next event nonce). Relayers and wallets read batches, fees and the
//! denom registry.

use std::collections::BTreeSet;

use common::EthAddress;
use cosmwasm_std::{Addr, Env, Order, StdError, StdResult};

use crate::attestation::{last_event_by_validator, last_observed_event_nonce, last_observed_eth_height};
use crate::batch::{all_batches, get_batch};
use crate::denom::{denom_to_erc20, erc20_to_denom};
use crate::deps::BridgeRef;
use crate::msg::{
    BatchConfirmsResponse, BatchFeesResponse, BatchResponse, BatchesResponse,
    DelegateKeysResponse, DenomToErc20Response, Erc20ToDenom, Erc20ToDenomResponse,
    ModuleStateResponse, PendingSendToEthResponse, ValsetConfirmResponse, ValsetConfirmsResponse,
    ValsetResponse, ValsetsResponse,
};
use crate::pool::all_batch_fees;
use crate::state::{
    LastClaimEvent, OutgoingTransferTx, Params, ATTESTATIONS, BATCH_CONFIRMS, ERC20_TO_DENOM,
    ETH_ADDRESS_VALIDATOR, LAST_BATCH_NONCE, LAST_OBSERVED_VALSET, LAST_SLASHED_BATCH_BLOCK,
    LAST_SLASHED_CLAIM_NONCE, LAST_SLASHED_VALSET_NONCE, LAST_TX_POOL_ID, ORCHESTRATOR_VALIDATOR,
    OUTGOING_POOL, PARAMS, VALIDATOR_ETH_ADDRESS, VALIDATOR_ORCHESTRATOR, VALSETS,
    VALSET_CONFIRMS,
};
use crate::valset::{get_current_valset, get_valset, latest_valset_nonce, valset_confirms};

/// Snapshots returned by `LastValsetRequests`
pub const LAST_VALSET_REQUESTS: usize = 5;

/// Cap on list responses an orchestrator polls
pub const MAX_RESULTS: usize = 100;

fn validator_for_orchestrator(deps: BridgeRef, orchestrator: &str) -> StdResult<Addr> {
    let orchestrator = deps.api.addr_validate(orchestrator)?;
    ORCHESTRATOR_VALIDATOR
        .may_load(deps.storage, &orchestrator)?
        .ok_or_else(|| StdError::not_found(format!("validator for orchestrator {}", orchestrator)))
}

// ============================================================================
// Params
// ============================================================================

pub fn query_params(deps: BridgeRef) -> StdResult<Params> {
    PARAMS.load(deps.storage)
}

// ============================================================================
// Snapshots
// ============================================================================

/// Snapshot the bonded set would produce at the current height
pub fn query_current_valset(deps: BridgeRef, env: Env) -> StdResult<ValsetResponse> {
    let params = PARAMS.load(deps.storage)?;
    let valset = get_current_valset(deps, &params, env.block.height)
        .map_err(|e| StdError::generic_err(e.to_string()))?;
    Ok(ValsetResponse {
        valset: Some(valset),
    })
}

pub fn query_valset_request(deps: BridgeRef, nonce: u64) -> StdResult<ValsetResponse> {
    Ok(ValsetResponse {
        valset: get_valset(deps.storage, nonce)?,
    })
}

/// Latest stored snapshots, newest first
pub fn query_last_valset_requests(deps: BridgeRef) -> StdResult<ValsetsResponse> {
    let valsets = VALSETS
        .range(deps.storage, None, None, Order::Descending)
        .take(LAST_VALSET_REQUESTS)
        .map(|entry| entry.map(|(_, valset)| valset))
        .collect::<StdResult<Vec<_>>>()?;
    Ok(ValsetsResponse { valsets })
}

pub fn query_valset_confirm(
    deps: BridgeRef,
    nonce: u64,
    validator: String,
) -> StdResult<ValsetConfirmResponse> {
    let validator = deps.api.addr_validate(&validator)?;
    Ok(ValsetConfirmResponse {
        confirm: VALSET_CONFIRMS.may_load(deps.storage, (nonce, &validator))?,
    })
}

pub fn query_valset_confirms_by_nonce(deps: BridgeRef, nonce: u64) -> StdResult<ValsetConfirmsResponse> {
    Ok(ValsetConfirmsResponse {
        confirms: valset_confirms(deps.storage, nonce)?,
    })
}

/// Stored snapshots the orchestrator's validator has not signed, newest first
pub fn query_last_pending_valset_request_by_addr(
    deps: BridgeRef,
    orchestrator: String,
) -> StdResult<ValsetsResponse> {
    let validator = validator_for_orchestrator(deps, &orchestrator)?;

    let mut valsets = Vec::new();
    for entry in VALSETS.range(deps.storage, None, None, Order::Descending) {
        let (nonce, valset) = entry?;
        if !VALSET_CONFIRMS.has(deps.storage, (nonce, &validator)) {
            valsets.push(valset);
            if valsets.len() == MAX_RESULTS {
                break;
            }
        }
    }
    Ok(ValsetsResponse { valsets })
}

// ============================================================================
// Batches
// ============================================================================

/// Fee totals of the best batch currently buildable per token contract
pub fn query_batch_fees(deps: BridgeRef) -> StdResult<BatchFeesResponse> {
    let params = PARAMS.load(deps.storage)?;
    Ok(BatchFeesResponse {
        batch_fees: all_batch_fees(deps.storage, params.outgoing_tx_batch_size as usize)?,
    })
}

pub fn query_outgoing_tx_batches(deps: BridgeRef) -> StdResult<BatchesResponse> {
    let mut batches = all_batches(deps.storage)?;
    batches.truncate(MAX_RESULTS);
    Ok(BatchesResponse { batches })
}

pub fn query_batch_request_by_nonce(
    deps: BridgeRef,
    token_contract: EthAddress,
    nonce: u64,
) -> StdResult<BatchResponse> {
    Ok(BatchResponse {
        batch: get_batch(deps.storage, &token_contract, nonce)?,
    })
}

pub fn query_batch_confirms(
    deps: BridgeRef,
    token_contract: EthAddress,
    nonce: u64,
) -> StdResult<BatchConfirmsResponse> {
    let confirms = BATCH_CONFIRMS
        .prefix((token_contract.as_bytes().as_slice(), nonce))
        .range(deps.storage, None, None, Order::Ascending)
        .map(|entry| entry.map(|(_, confirm)| confirm))
        .collect::<StdResult<Vec<_>>>()?;
    Ok(BatchConfirmsResponse { confirms })
}

/// Lowest-nonce stored batch the orchestrator's validator has not signed
pub fn query_last_pending_batch_request_by_addr(
    deps: BridgeRef,
    orchestrator: String,
) -> StdResult<BatchResponse> {
    let validator = validator_for_orchestrator(deps, &orchestrator)?;

    let mut batches = all_batches(deps.storage)?;
    batches.sort_by_key(|batch| batch.batch_nonce);
    let batch = batches.into_iter().find(|batch| {
        !BATCH_CONFIRMS.has(
            deps.storage,
            (
                batch.token_contract.as_bytes().as_slice(),
                batch.batch_nonce,
                &validator,
            ),
        )
    });
    Ok(BatchResponse { batch })
}

// ============================================================================
// Claims and Denoms
// ============================================================================

/// Event nonce the orchestrator's next claim must follow
pub fn query_last_event_by_addr(deps: BridgeRef, orchestrator: String) -> StdResult<LastClaimEvent> {
    let validator = validator_for_orchestrator(deps, &orchestrator)?;
    let params = PARAMS.load(deps.storage)?;
    last_event_by_validator(deps.storage, &params, &validator)
}

pub fn query_denom_to_erc20(deps: BridgeRef, denom: String) -> StdResult<DenomToErc20Response> {
    let (origin, token_contract) =
        denom_to_erc20(deps.storage, &denom).map_err(|e| StdError::generic_err(e.to_string()))?;
    Ok(DenomToErc20Response {
        token_contract,
        cosmos_originated: origin.is_cosmos(),
    })
}

pub fn query_erc20_to_denom(deps: BridgeRef, token_contract: EthAddress) -> StdResult<Erc20ToDenomResponse> {
    let (origin, denom) = erc20_to_denom(deps.storage, &token_contract)?;
    Ok(Erc20ToDenomResponse {
        denom,
        cosmos_originated: origin.is_cosmos(),
    })
}

// ============================================================================
// Key Delegation
// ============================================================================

fn delegate_keys(deps: BridgeRef, validator: Addr) -> StdResult<DelegateKeysResponse> {
    let orchestrator = VALIDATOR_ORCHESTRATOR
        .may_load(deps.storage, &validator)?
        .ok_or_else(|| StdError::not_found(format!("orchestrator for validator {}", validator)))?;
    let eth_address = VALIDATOR_ETH_ADDRESS
        .may_load(deps.storage, &validator)?
        .ok_or_else(|| StdError::not_found(format!("eth address for validator {}", validator)))?;
    Ok(DelegateKeysResponse {
        validator,
        orchestrator,
        eth_address,
    })
}

pub fn query_delegate_keys_by_validator(deps: BridgeRef, validator: String) -> StdResult<DelegateKeysResponse> {
    let validator = deps.api.addr_validate(&validator)?;
    delegate_keys(deps, validator)
}

pub fn query_delegate_keys_by_orchestrator(
    deps: BridgeRef,
    orchestrator: String,
) -> StdResult<DelegateKeysResponse> {
    let validator = validator_for_orchestrator(deps, &orchestrator)?;
    delegate_keys(deps, validator)
}

pub fn query_delegate_keys_by_eth(deps: BridgeRef, eth_address: EthAddress) -> StdResult<DelegateKeysResponse> {
    let validator = ETH_ADDRESS_VALIDATOR
        .may_load(deps.storage, eth_address.as_bytes())?
        .ok_or_else(|| StdError::not_found(format!("validator for eth address {}", eth_address)))?;
    delegate_keys(deps, validator)
}

// ============================================================================
// Pool
// ============================================================================

/// Ids of every transfer currently held by a batch
fn batched_ids(deps: BridgeRef) -> StdResult<BTreeSet<u64>> {
    Ok(all_batches(deps.storage)?
        .iter()
        .flat_map(|batch| batch.transactions.iter().map(|tx| tx.id))
        .collect())
}

fn unbatched_pool(deps: BridgeRef, batched: &BTreeSet<u64>) -> StdResult<Vec<OutgoingTransferTx>> {
    let mut out = Vec::new();
    for entry in OUTGOING_POOL.range(deps.storage, None, None, Order::Ascending) {
        let (id, tx) = entry?;
        if !batched.contains(&id) {
            out.push(tx);
        }
    }
    Ok(out)
}

/// A sender's withdrawals that have not executed yet, split by batch membership
pub fn query_pending_send_to_eth(deps: BridgeRef, sender: String) -> StdResult<PendingSendToEthResponse> {
    let sender = deps.api.addr_validate(&sender)?;

    let transfers_in_batches: Vec<OutgoingTransferTx> = all_batches(deps.storage)?
        .into_iter()
        .flat_map(|batch| batch.transactions)
        .filter(|tx| tx.sender == sender)
        .collect();
    let batched = batched_ids(deps)?;
    let unbatched_transfers = unbatched_pool(deps, &batched)?
        .into_iter()
        .filter(|tx| tx.sender == sender)
        .collect();

    Ok(PendingSendToEthResponse {
        transfers_in_batches,
        unbatched_transfers,
    })
}

// ============================================================================
// Export
// ============================================================================

/// Full state export, ordered by storage key throughout
pub fn query_module_state(deps: BridgeRef) -> StdResult<ModuleStateResponse> {
    let storage = deps.storage;

    let valsets = VALSETS
        .range(storage, None, None, Order::Ascending)
        .map(|entry| entry.map(|(_, valset)| valset))
        .collect::<StdResult<Vec<_>>>()?;
    let valset_confirms = VALSET_CONFIRMS
        .range(storage, None, None, Order::Ascending)
        .map(|entry| entry.map(|(_, confirm)| confirm))
        .collect::<StdResult<Vec<_>>>()?;
    let batch_confirms = BATCH_CONFIRMS
        .range(storage, None, None, Order::Ascending)
        .map(|entry| entry.map(|(_, confirm)| confirm))
        .collect::<StdResult<Vec<_>>>()?;
    let attestations = ATTESTATIONS
        .range(storage, None, None, Order::Ascending)
        .map(|entry| entry.map(|(_, att)| att))
        .collect::<StdResult<Vec<_>>>()?;

    let orchestrator_addresses = VALIDATOR_ORCHESTRATOR
        .keys(storage, None, None, Order::Ascending)
        .map(|key| key.and_then(|validator| delegate_keys(deps, validator)))
        .collect::<StdResult<Vec<_>>>()?;

    let erc20_to_denoms = ERC20_TO_DENOM
        .range(storage, None, None, Order::Ascending)
        .map(|entry| {
            let (raw, denom) = entry?;
            let erc20 = EthAddress::from_slice(&raw)
                .map_err(|e| StdError::generic_err(e.to_string()))?;
            Ok(Erc20ToDenom { erc20, denom })
        })
        .collect::<StdResult<Vec<_>>>()?;

    let batched = batched_ids(deps)?;

    Ok(ModuleStateResponse {
        params: PARAMS.load(storage)?,
        last_observed_nonce: last_observed_event_nonce(storage)?,
        last_observed_ethereum_height: last_observed_eth_height(storage)?,
        last_observed_valset: LAST_OBSERVED_VALSET.may_load(storage)?,
        latest_valset_nonce: latest_valset_nonce(storage)?,
        last_tx_pool_id: LAST_TX_POOL_ID.may_load(storage)?.unwrap_or(0),
        last_batch_nonce: LAST_BATCH_NONCE.may_load(storage)?.unwrap_or(0),
        last_slashed_valset_nonce: LAST_SLASHED_VALSET_NONCE.may_load(storage)?.unwrap_or(0),
        last_slashed_batch_block: LAST_SLASHED_BATCH_BLOCK.may_load(storage)?.unwrap_or(0),
        last_slashed_claim_nonce: LAST_SLASHED_CLAIM_NONCE.may_load(storage)?.unwrap_or(0),
        valsets,
        valset_confirms,
        batches: all_batches(storage)?,
        batch_confirms,
        attestations,
        orchestrator_addresses,
        erc20_to_denoms,
        unbatched_transfers: unbatched_pool(deps, &batched)?,
    })
}
