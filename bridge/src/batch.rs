//! Batch engine
//!
//! A batch takes the best-paying unbatched transfers of one token contract
//! out of the fee index. Its transfers stay in `OUTGOING_POOL` until the batch
//! executes on the counterparty. A cancelled batch puts them back at the head
//! of their fee level.

use common::EthAddress;
use cosmwasm_std::{Empty, Event, Order, StdResult, Storage};
use cw_storage_plus::Bound;
use tracing::{debug, info};

use crate::error::ContractError;
use crate::events;
use crate::hash::batch_checkpoint;
use crate::pool::{hypothetical_batch_fees, prepend_to_fee_index, remove_from_fee_index, top_transfer_ids};
use crate::state::{
    LastObservedEthereumBlockHeight, OutgoingTxBatch, Params, BATCHES, BATCH_BLOCK_INDEX,
    BATCH_CONFIRMS, LAST_BATCH_NONCE, LAST_OBSERVED_ETH_HEIGHT, OUTGOING_POOL, PAST_CHECKPOINTS,
};

// ============================================================================
// Height Projection
// ============================================================================

/// Counterparty height a batch built now should time out at
///
/// Projects the counterparty height at the current chain height from the last
/// observed (counterparty height, chain height) anchor, then adds
/// `target_batch_timeout` worth of counterparty blocks. Returns 0 while no
/// counterparty height has been observed.
pub fn project_batch_timeout(
    params: &Params,
    anchor: &LastObservedEthereumBlockHeight,
    current_height: u64,
) -> Result<u64, ContractError> {
    if anchor.ethereum_block_height == 0 || anchor.cosmos_block_height == 0 {
        return Ok(0);
    }

    let blocks_since_anchor = current_height.saturating_sub(anchor.cosmos_block_height);
    let elapsed_ms = blocks_since_anchor
        .checked_mul(params.average_block_time)
        .ok_or(ContractError::TimeoutOverflow)?;
    let projected_current = anchor
        .ethereum_block_height
        .checked_add(elapsed_ms / params.average_ethereum_block_time)
        .ok_or(ContractError::TimeoutOverflow)?;

    projected_current
        .checked_add(params.target_batch_timeout / params.average_ethereum_block_time)
        .ok_or(ContractError::TimeoutOverflow)
}

// ============================================================================
// Lookups
// ============================================================================

pub fn get_batch(
    storage: &dyn Storage,
    contract: &EthAddress,
    nonce: u64,
) -> StdResult<Option<OutgoingTxBatch>> {
    BATCHES.may_load(storage, (contract.as_bytes().as_slice(), nonce))
}

/// Highest-nonce stored batch of `contract`
pub fn last_batch_for_contract(
    storage: &dyn Storage,
    contract: &EthAddress,
) -> StdResult<Option<OutgoingTxBatch>> {
    BATCHES
        .prefix(contract.as_bytes().as_slice())
        .range(storage, None, None, Order::Descending)
        .next()
        .transpose()
        .map(|entry| entry.map(|(_, batch)| batch))
}

/// Every stored batch, ordered by (contract, nonce)
pub fn all_batches(storage: &dyn Storage) -> StdResult<Vec<OutgoingTxBatch>> {
    BATCHES
        .range(storage, None, None, Order::Ascending)
        .map(|entry| entry.map(|(_, batch)| batch))
        .collect()
}

/// Batches created in blocks `(after_block, up_to_block]`, oldest first
pub fn batches_created_between(
    storage: &dyn Storage,
    after_block: u64,
    up_to_block: u64,
) -> StdResult<Vec<OutgoingTxBatch>> {
    let mut out = Vec::new();
    for key in BATCH_BLOCK_INDEX.keys(storage, None, None, Order::Ascending) {
        let (block, contract, nonce) = key?;
        if block <= after_block {
            continue;
        }
        if block > up_to_block {
            break;
        }
        out.push(BATCHES.load(storage, (contract.as_slice(), nonce))?);
    }
    Ok(out)
}

// ============================================================================
// Build
// ============================================================================

/// Assemble the best-paying unbatched transfers of `contract` into a new batch
pub fn build_outgoing_batch(
    storage: &mut dyn Storage,
    params: &Params,
    current_height: u64,
    contract: EthAddress,
    max_elements: usize,
) -> Result<OutgoingTxBatch, ContractError> {
    if max_elements == 0 {
        return Err(ContractError::invalid("max elements value must be non-zero"));
    }

    if let Some(last) = last_batch_for_contract(storage, &contract)? {
        let pool = hypothetical_batch_fees(storage, &contract, max_elements)?;
        let last_fees = last.fees()?;
        if pool.total_fees <= last_fees {
            return Err(ContractError::BatchNotProfitable {
                pool_fees: pool.total_fees,
                last_fees,
            });
        }
    }

    let ids = top_transfer_ids(storage, &contract, max_elements)?;
    if ids.is_empty() {
        return Err(ContractError::NoUnbatchedTxsFound);
    }
    let mut transactions = Vec::with_capacity(ids.len());
    for id in ids {
        let tx = OUTGOING_POOL.load(storage, id)?;
        remove_from_fee_index(storage, &contract, &tx.erc20_fee.amount, id)?;
        transactions.push(tx);
    }

    let batch_nonce = LAST_BATCH_NONCE.may_load(storage)?.unwrap_or(0) + 1;
    LAST_BATCH_NONCE.save(storage, &batch_nonce)?;

    let anchor = LAST_OBSERVED_ETH_HEIGHT.may_load(storage)?.unwrap_or_default();
    let batch = OutgoingTxBatch {
        batch_nonce,
        batch_timeout: project_batch_timeout(params, &anchor, current_height)?,
        transactions,
        token_contract: contract,
        block: current_height,
    };
    store_batch(storage, params, &batch)?;

    info!(
        batch_nonce,
        token_contract = %contract,
        tx_count = batch.transactions.len(),
        batch_timeout = batch.batch_timeout,
        "built outgoing batch"
    );
    Ok(batch)
}

/// Persist a batch under both indexes and remember its checkpoint
pub fn store_batch(
    storage: &mut dyn Storage,
    params: &Params,
    batch: &OutgoingTxBatch,
) -> StdResult<()> {
    let contract = batch.token_contract.as_bytes().as_slice();
    BATCHES.save(storage, (contract, batch.batch_nonce), batch)?;
    BATCH_BLOCK_INDEX.save(storage, (batch.block, contract, batch.batch_nonce), &Empty {})?;
    let checkpoint = batch_checkpoint(&params.bridge_id, batch);
    PAST_CHECKPOINTS.save(storage, checkpoint.as_slice(), &Empty {})
}

fn delete_batch(storage: &mut dyn Storage, batch: &OutgoingTxBatch) -> StdResult<()> {
    let contract = batch.token_contract.as_bytes().as_slice();
    BATCHES.remove(storage, (contract, batch.batch_nonce));
    BATCH_BLOCK_INDEX.remove(storage, (batch.block, contract, batch.batch_nonce));

    let signers = BATCH_CONFIRMS
        .prefix((contract, batch.batch_nonce))
        .keys(storage, None, None, Order::Ascending)
        .collect::<StdResult<Vec<_>>>()?;
    for validator in signers {
        BATCH_CONFIRMS.remove(storage, (contract, batch.batch_nonce, &validator));
    }
    Ok(())
}

// ============================================================================
// Cancel / Execute / Timeout
// ============================================================================

/// Delete a batch and return its transfers to the head of their fee levels
pub fn cancel_outgoing_batch(
    storage: &mut dyn Storage,
    params: &Params,
    contract: &EthAddress,
    nonce: u64,
) -> Result<Event, ContractError> {
    let batch = get_batch(storage, contract, nonce)?
        .ok_or_else(|| ContractError::unknown(format!("batch {} of {}", nonce, contract)))?;

    // reverse so transfers of equal fee keep their relative order at the head
    for tx in batch.transactions.iter().rev() {
        prepend_to_fee_index(storage, contract, &tx.erc20_fee.amount, tx.id)?;
    }
    delete_batch(storage, &batch)?;

    info!(batch_nonce = nonce, token_contract = %contract, "cancelled outgoing batch");
    Ok(events::batch_cancelled(params, contract, nonce))
}

/// Reconcile a batch the counterparty executed
///
/// Its transfers leave the pool for good. Every lower-nonce batch of the same
/// contract can no longer execute on the counterparty and is cancelled.
pub fn outgoing_tx_batch_executed(
    storage: &mut dyn Storage,
    params: &Params,
    contract: &EthAddress,
    nonce: u64,
) -> Result<Vec<Event>, ContractError> {
    let batch = get_batch(storage, contract, nonce)?
        .ok_or_else(|| ContractError::unknown(format!("batch {} of {}", nonce, contract)))?;

    for tx in &batch.transactions {
        OUTGOING_POOL.remove(storage, tx.id);
    }

    let superseded: Vec<u64> = BATCHES
        .prefix(contract.as_bytes().as_slice())
        .keys(storage, None, Some(Bound::exclusive(nonce)), Order::Ascending)
        .collect::<StdResult<_>>()?;

    let mut events = Vec::with_capacity(superseded.len() + 1);
    for lower in superseded {
        events.push(cancel_outgoing_batch(storage, params, contract, lower)?);
    }

    delete_batch(storage, &batch)?;
    events.push(events::batch_executed(params, contract, nonce));
    Ok(events)
}

/// Whether the timeout sweep should cancel `batch`
///
/// A batch with a timeout times out once the observed counterparty height has
/// passed it. A batch built before any counterparty height was known
/// (`batch_timeout == 0`) times out once a counterparty height is learned in a
/// block after the batch was created.
pub fn is_timed_out(batch: &OutgoingTxBatch, observed: &LastObservedEthereumBlockHeight) -> bool {
    if observed.ethereum_block_height == 0 {
        return false;
    }
    if batch.batch_timeout == 0 {
        return observed.cosmos_block_height > batch.block;
    }
    batch.batch_timeout < observed.ethereum_block_height
}

/// Cancel every batch whose counterparty timeout has passed
pub fn cleanup_timed_out_batches(
    storage: &mut dyn Storage,
    params: &Params,
) -> Result<Vec<Event>, ContractError> {
    let observed = LAST_OBSERVED_ETH_HEIGHT.may_load(storage)?.unwrap_or_default();
    let mut events = Vec::new();
    for batch in all_batches(storage)? {
        if is_timed_out(&batch, &observed) {
            debug!(
                batch_nonce = batch.batch_nonce,
                batch_timeout = batch.batch_timeout,
                ethereum_height = observed.ethereum_block_height,
                "batch timed out"
            );
            events.push(cancel_outgoing_batch(
                storage,
                params,
                &batch.token_contract,
                batch.batch_nonce,
            )?);
        }
    }
    Ok(events)
}
