//! Peggy Bridge Core - Entry Points
//!
//! The host chain drives the module through four entry points:
//! - `instantiate` stores the module parameters
//! - `execute` runs one transaction message inside its own cache
//! - `end_block` runs the block-end pipeline on the backing store
//! - `query` answers read-only requests
//!
//! The staking module additionally calls `after_validator_begin_unbonding`.

use std::collections::BTreeSet;

use cosmwasm_std::{to_json_binary, Binary, Env, MessageInfo, Order, Response, StdResult, Storage};
use cw2::set_contract_version;
use tracing::debug;

use crate::attestation::{attestation_tally, prune_attestations};
use crate::batch::cleanup_timed_out_batches;
use crate::cache::with_cache;
use crate::deps::{BridgeDeps, BridgeRef};
use crate::error::ContractError;
use crate::execute::{
    execute_cancel_send_to_eth, execute_confirm_batch, execute_request_batch,
    execute_send_to_eth, execute_set_orchestrator_addresses, execute_submit_bad_signature_evidence,
    execute_submit_claim, execute_valset_confirm,
};
use crate::msg::{ExecuteMsg, InstantiateMsg, QueryMsg};
use crate::pool::fee_key;
use crate::query::{
    query_batch_confirms, query_batch_fees, query_batch_request_by_nonce, query_current_valset,
    query_delegate_keys_by_eth, query_delegate_keys_by_orchestrator,
    query_delegate_keys_by_validator, query_denom_to_erc20, query_erc20_to_denom,
    query_last_event_by_addr, query_last_pending_batch_request_by_addr,
    query_last_pending_valset_request_by_addr, query_last_valset_requests, query_module_state,
    query_outgoing_tx_batches, query_params, query_pending_send_to_eth, query_valset_confirm,
    query_valset_confirms_by_nonce, query_valset_request,
};
use crate::slashing::slashing;
use crate::state::{
    BATCHES, BATCH_BLOCK_INDEX, CONTRACT_NAME, CONTRACT_VERSION, FEE_INDEX, OUTGOING_POOL, PARAMS,
};
use crate::valset::{self, maybe_create_valset, prune_valsets};

// ============================================================================
// Instantiate
// ============================================================================

pub fn instantiate(
    deps: BridgeDeps,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    msg.params.validate()?;
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;
    PARAMS.save(deps.storage, &msg.params)?;

    Ok(Response::new()
        .add_attribute("action", "instantiate")
        .add_attribute("bridge_id", msg.params.bridge_id)
        .add_attribute("bridge_contract", msg.params.bridge_contract_address.to_string())
        .add_attribute("version", CONTRACT_VERSION))
}

// ============================================================================
// Execute
// ============================================================================

/// Run one message; its writes reach the backing store only if it succeeds
pub fn execute(
    deps: BridgeDeps,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    let api = deps.api;
    let keepers = deps.keepers;
    with_cache(deps.storage, |storage| {
        dispatch(BridgeDeps { storage, api, keepers }, &env, &info, msg)
    })
}

fn dispatch(
    deps: BridgeDeps,
    env: &Env,
    info: &MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        // Key delegation
        ExecuteMsg::SetOrchestratorAddresses {
            orchestrator,
            eth_address,
            eth_signature,
        } => execute_set_orchestrator_addresses(deps, info, orchestrator, eth_address, eth_signature),

        // Signatures
        ExecuteMsg::ValsetConfirm {
            nonce,
            eth_address,
            signature,
        } => execute_valset_confirm(deps, info, nonce, eth_address, signature),
        ExecuteMsg::ConfirmBatch {
            nonce,
            token_contract,
            eth_signer,
            signature,
        } => execute_confirm_batch(deps, info, nonce, token_contract, eth_signer, signature),

        // Outgoing transfers
        ExecuteMsg::SendToEth {
            eth_dest,
            amount,
            bridge_fee,
        } => execute_send_to_eth(deps, info, eth_dest, amount, bridge_fee),
        ExecuteMsg::CancelSendToEth { transaction_id } => {
            execute_cancel_send_to_eth(deps, info, transaction_id)
        }
        ExecuteMsg::RequestBatch { denom } => execute_request_batch(deps, env, denom),

        // Claims and evidence
        ExecuteMsg::SubmitClaim { claim } => execute_submit_claim(deps, env, info, claim),
        ExecuteMsg::SubmitBadSignatureEvidence { subject, signature } => {
            execute_submit_bad_signature_evidence(deps, env, subject, signature)
        }
    }
}

// ============================================================================
// End Block
// ============================================================================

/// Block-end pipeline
///
/// Slashing runs before the tally so a validator's missed signatures are
/// judged against the state the block started with. Snapshot creation runs
/// after the tally and timeout sweep so it sees this block's power changes.
pub fn end_block(mut deps: BridgeDeps, env: Env) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let height = env.block.height;

    let mut events = slashing(deps.branch(), &params, height)?;
    events.extend(attestation_tally(deps.branch(), &params, height)?);
    events.extend(cleanup_timed_out_batches(deps.storage, &params)?);
    if let Some(created) = maybe_create_valset(deps.branch(), &params, height)? {
        events.push(created);
    }
    prune_valsets(deps.storage, &params, height)?;
    prune_attestations(deps.storage, &params)?;

    debug!(height, events = events.len(), "end block done");
    Ok(Response::new()
        .add_attribute("action", "end_block")
        .add_attribute("height", height.to_string())
        .add_events(events))
}

/// Staking hook: a validator began unbonding in the current block
pub fn after_validator_begin_unbonding(storage: &mut dyn Storage, env: &Env) -> StdResult<()> {
    valset::after_validator_begin_unbonding(storage, env.block.height)
}

// ============================================================================
// Query
// ============================================================================

pub fn query(deps: BridgeRef, env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Params {} => to_json_binary(&query_params(deps)?),

        // Snapshots
        QueryMsg::CurrentValset {} => to_json_binary(&query_current_valset(deps, env)?),
        QueryMsg::ValsetRequest { nonce } => to_json_binary(&query_valset_request(deps, nonce)?),
        QueryMsg::LastValsetRequests {} => to_json_binary(&query_last_valset_requests(deps)?),
        QueryMsg::ValsetConfirm { nonce, validator } => {
            to_json_binary(&query_valset_confirm(deps, nonce, validator)?)
        }
        QueryMsg::ValsetConfirmsByNonce { nonce } => {
            to_json_binary(&query_valset_confirms_by_nonce(deps, nonce)?)
        }
        QueryMsg::LastPendingValsetRequestByAddr { orchestrator } => {
            to_json_binary(&query_last_pending_valset_request_by_addr(deps, orchestrator)?)
        }

        // Batches
        QueryMsg::BatchFees {} => to_json_binary(&query_batch_fees(deps)?),
        QueryMsg::OutgoingTxBatches {} => to_json_binary(&query_outgoing_tx_batches(deps)?),
        QueryMsg::BatchRequestByNonce {
            token_contract,
            nonce,
        } => to_json_binary(&query_batch_request_by_nonce(deps, token_contract, nonce)?),
        QueryMsg::BatchConfirms {
            token_contract,
            nonce,
        } => to_json_binary(&query_batch_confirms(deps, token_contract, nonce)?),
        QueryMsg::LastPendingBatchRequestByAddr { orchestrator } => {
            to_json_binary(&query_last_pending_batch_request_by_addr(deps, orchestrator)?)
        }

        // Claims and denoms
        QueryMsg::LastEventByAddr { orchestrator } => {
            to_json_binary(&query_last_event_by_addr(deps, orchestrator)?)
        }
        QueryMsg::DenomToErc20 { denom } => to_json_binary(&query_denom_to_erc20(deps, denom)?),
        QueryMsg::Erc20ToDenom { token_contract } => {
            to_json_binary(&query_erc20_to_denom(deps, token_contract)?)
        }

        // Key delegation
        QueryMsg::DelegateKeysByValidator { validator } => {
            to_json_binary(&query_delegate_keys_by_validator(deps, validator)?)
        }
        QueryMsg::DelegateKeysByOrchestrator { orchestrator } => {
            to_json_binary(&query_delegate_keys_by_orchestrator(deps, orchestrator)?)
        }
        QueryMsg::DelegateKeysByEth { eth_address } => {
            to_json_binary(&query_delegate_keys_by_eth(deps, eth_address)?)
        }

        // Pool and export
        QueryMsg::PendingSendToEth { sender } => {
            to_json_binary(&query_pending_send_to_eth(deps, sender)?)
        }
        QueryMsg::ModuleState {} => to_json_binary(&query_module_state(deps)?),
    }
}

// ============================================================================
// Index Consistency
// ============================================================================

/// Check that both secondary indexes mirror their primary records
///
/// Every pool transfer must sit either in exactly one fee-index entry (while
/// unbatched) or in exactly one stored batch, and every batch must have
/// exactly one block-index entry.
pub fn check_index_consistency(storage: &dyn Storage) -> Result<(), ContractError> {
    let inconsistent = |what: String| -> Result<(), ContractError> {
        Err(ContractError::invalid(format!("index mismatch: {}", what)))
    };

    let mut placed: BTreeSet<u64> = BTreeSet::new();
    for entry in FEE_INDEX.range(storage, None, None, Order::Ascending) {
        let ((contract, fee), ids) = entry?;
        for id in ids {
            let Some(tx) = OUTGOING_POOL.may_load(storage, id)? else {
                return inconsistent(format!("fee index lists missing transfer {}", id));
            };
            if tx.erc20_fee.contract.as_bytes().as_slice() != contract.as_slice()
                || fee_key(&tx.erc20_fee.amount).as_slice() != fee.as_slice()
            {
                return inconsistent(format!("transfer {} indexed under the wrong key", id));
            }
            if !placed.insert(id) {
                return inconsistent(format!("transfer {} indexed twice", id));
            }
        }
    }

    let mut indexed_batches = 0usize;
    for entry in BATCHES.range(storage, None, None, Order::Ascending) {
        let ((contract, nonce), batch) = entry?;
        if !BATCH_BLOCK_INDEX.has(storage, (batch.block, contract.as_slice(), nonce)) {
            return inconsistent(format!("batch {} has no block index entry", nonce));
        }
        indexed_batches += 1;
        for tx in &batch.transactions {
            if !OUTGOING_POOL.has(storage, tx.id) {
                return inconsistent(format!("batch {} holds missing transfer {}", nonce, tx.id));
            }
            if !placed.insert(tx.id) {
                return inconsistent(format!("transfer {} is both batched and indexed", tx.id));
            }
        }
    }

    for key in BATCH_BLOCK_INDEX.keys(storage, None, None, Order::Ascending) {
        let (block, contract, nonce) = key?;
        match BATCHES.may_load(storage, (contract.as_slice(), nonce))? {
            Some(batch) if batch.block == block => {}
            _ => return inconsistent(format!("block index entry for missing batch {}", nonce)),
        }
    }
    let block_entries = BATCH_BLOCK_INDEX
        .keys(storage, None, None, Order::Ascending)
        .count();
    if block_entries != indexed_batches {
        return inconsistent(format!(
            "{} block index entries for {} batches",
            block_entries, indexed_batches
        ));
    }

    for key in OUTGOING_POOL.keys(storage, None, None, Order::Ascending) {
        let id = key?;
        if !placed.contains(&id) {
            return inconsistent(format!("transfer {} is neither indexed nor batched", id));
        }
    }
    Ok(())
}
