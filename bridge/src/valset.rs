//! Validator-set engine
//!
//! Snapshots of the bonded set are what the counterparty contract verifies
//! signatures against. A snapshot's nonce is the chain height it was taken at.

use std::collections::BTreeMap;

use common::EthAddress;
use cosmwasm_std::{Event, Order, StdResult, Storage, Uint256};
use tracing::{debug, info};

use crate::denom::denom_to_erc20;
use crate::deps::{BridgeDeps, BridgeRef};
use crate::error::ContractError;
use crate::events;
use crate::hash::valset_checkpoint;
use crate::state::{
    BridgeValidator, Params, Valset, ValsetConfirm, LAST_OBSERVED_VALSET,
    LAST_UNBONDING_BLOCK_HEIGHT, LATEST_VALSET_NONCE, MAX_NORMALIZED_POWER, PAST_CHECKPOINTS,
    VALIDATOR_ETH_ADDRESS, VALSETS, VALSET_CONFIRMS,
};

/// Normalized power change (in parts of 100) above which a new snapshot is requested
const POWER_DIFF_THRESHOLD_PERCENT: u128 = 5;

// ============================================================================
// Current Set
// ============================================================================

/// Scale raw powers so they sum to at most 2^32 - 1
///
/// Truncating division keeps the total at or below the maximum.
pub fn normalize_powers(raw: &[(EthAddress, u64)]) -> Vec<BridgeValidator> {
    let total: u128 = raw.iter().map(|(_, power)| *power as u128).sum();
    if total == 0 {
        return Vec::new();
    }
    raw.iter()
        .map(|(address, power)| BridgeValidator {
            power: (*power as u128 * MAX_NORMALIZED_POWER as u128 / total) as u64,
            ethereum_address: *address,
        })
        .collect()
}

/// Snapshot of the bonded set as it stands at `height`
///
/// Bonded validators without a registered counterparty address are left out.
pub fn get_current_valset(
    deps: BridgeRef,
    params: &Params,
    height: u64,
) -> Result<Valset, ContractError> {
    let staking = deps.keepers.staking;
    let mut raw = Vec::new();
    for validator in staking.bonded_validators_by_power(deps.storage)? {
        if let Some(address) = VALIDATOR_ETH_ADDRESS.may_load(deps.storage, &validator.operator)? {
            let power = staking.last_validator_power(deps.storage, &validator.operator)?;
            raw.push((address, power));
        }
    }

    let (reward_amount, reward_token) = if params.valset_reward.denom.is_empty() {
        (Uint256::zero(), EthAddress::ZERO)
    } else {
        let (_, contract) = denom_to_erc20(deps.storage, &params.valset_reward.denom)?;
        (params.valset_reward.amount, contract)
    };

    Ok(Valset {
        nonce: height,
        members: normalize_powers(&raw),
        height,
        reward_amount,
        reward_token,
    })
}

// ============================================================================
// Storage
// ============================================================================

pub fn get_valset(storage: &dyn Storage, nonce: u64) -> StdResult<Option<Valset>> {
    VALSETS.may_load(storage, nonce)
}

pub fn latest_valset_nonce(storage: &dyn Storage) -> StdResult<u64> {
    Ok(LATEST_VALSET_NONCE.may_load(storage)?.unwrap_or(0))
}

pub fn latest_valset(storage: &dyn Storage) -> StdResult<Option<Valset>> {
    VALSETS
        .range(storage, None, None, Order::Descending)
        .next()
        .transpose()
        .map(|entry| entry.map(|(_, valset)| valset))
}

/// Persist a snapshot, bump the latest nonce and remember its checkpoint
pub fn store_valset(storage: &mut dyn Storage, params: &Params, valset: &Valset) -> StdResult<()> {
    VALSETS.save(storage, valset.nonce, valset)?;
    LATEST_VALSET_NONCE.save(storage, &valset.nonce)?;
    let checkpoint = valset_checkpoint(&params.bridge_id, valset);
    PAST_CHECKPOINTS.save(storage, checkpoint.as_slice(), &cosmwasm_std::Empty {})
}

/// Delete a snapshot together with its signatures
pub fn delete_valset(storage: &mut dyn Storage, nonce: u64) -> StdResult<()> {
    VALSETS.remove(storage, nonce);
    let signers = VALSET_CONFIRMS
        .prefix(nonce)
        .keys(storage, None, None, Order::Ascending)
        .collect::<StdResult<Vec<_>>>()?;
    for validator in signers {
        VALSET_CONFIRMS.remove(storage, (nonce, &validator));
    }
    Ok(())
}

/// Signatures collected for snapshot `nonce`, ordered by validator
pub fn valset_confirms(storage: &dyn Storage, nonce: u64) -> StdResult<Vec<ValsetConfirm>> {
    VALSET_CONFIRMS
        .prefix(nonce)
        .range(storage, None, None, Order::Ascending)
        .map(|entry| entry.map(|(_, confirm)| confirm))
        .collect()
}

/// Take and store a snapshot of the current bonded set
///
/// Returns `None` without storing anything when no bonded validator has
/// registered a counterparty address.
pub fn set_valset_request(
    deps: BridgeDeps,
    params: &Params,
    height: u64,
) -> Result<Option<Valset>, ContractError> {
    let valset = get_current_valset(deps.as_ref(), params, height)?;
    if valset.members.is_empty() {
        debug!(height, "no bonded validator has a registered eth address, skipping valset");
        return Ok(None);
    }
    store_valset(deps.storage, params, &valset)?;
    info!(
        nonce = valset.nonce,
        members = valset.members.len(),
        "created valset request"
    );
    Ok(Some(valset))
}

// ============================================================================
// Trigger
// ============================================================================

/// Sum of absolute normalized power changes, matched by counterparty address
pub fn power_diff(current: &[BridgeValidator], previous: &[BridgeValidator]) -> u64 {
    let mut deltas: BTreeMap<EthAddress, i128> = BTreeMap::new();
    for member in current {
        *deltas.entry(member.ethereum_address).or_default() += member.power as i128;
    }
    for member in previous {
        *deltas.entry(member.ethereum_address).or_default() -= member.power as i128;
    }
    deltas
        .values()
        .map(|delta| delta.unsigned_abs() as u64)
        .fold(0u64, u64::saturating_add)
}

/// Whether a diff from [`power_diff`] is above 5% of the normalized total
pub fn power_diff_exceeds_threshold(diff: u64) -> bool {
    diff as u128 * 100 > POWER_DIFF_THRESHOLD_PERCENT * MAX_NORMALIZED_POWER as u128
}

/// Request a new snapshot if none exists, a validator began unbonding this
/// block, or the bonded set drifted more than 5% from the latest snapshot
pub fn maybe_create_valset(
    deps: BridgeDeps,
    params: &Params,
    height: u64,
) -> Result<Option<Event>, ContractError> {
    let latest = latest_valset(deps.storage)?;
    let last_unbonding = LAST_UNBONDING_BLOCK_HEIGHT.may_load(deps.storage)?.unwrap_or(0);

    let triggered = match &latest {
        None => true,
        Some(_) if last_unbonding == height => true,
        Some(latest) => {
            let current = get_current_valset(deps.as_ref(), params, height)?;
            power_diff_exceeds_threshold(power_diff(&current.members, &latest.members))
        }
    };
    if !triggered {
        return Ok(None);
    }

    Ok(set_valset_request(deps, params, height)?
        .map(|valset| events::valset_created(params, &valset)))
}

/// Drop snapshots the counterparty has moved past once their signing window closed
pub fn prune_valsets(storage: &mut dyn Storage, params: &Params, height: u64) -> StdResult<()> {
    let Some(last_observed) = LAST_OBSERVED_VALSET.may_load(storage)? else {
        return Ok(());
    };
    if height < params.signed_valsets_window {
        return Ok(());
    }
    let earliest_to_keep = height - params.signed_valsets_window;

    let stale: Vec<u64> = VALSETS
        .range(storage, None, None, Order::Ascending)
        .filter_map(|entry| match entry {
            Ok((nonce, valset))
                if nonce < last_observed.nonce && valset.height < earliest_to_keep =>
            {
                Some(Ok(nonce))
            }
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<StdResult<_>>()?;

    for nonce in stale {
        debug!(nonce, "pruning valset");
        delete_valset(storage, nonce)?;
    }
    Ok(())
}

/// Staking hook: a validator started unbonding at `height`
pub fn after_validator_begin_unbonding(storage: &mut dyn Storage, height: u64) -> StdResult<()> {
    LAST_UNBONDING_BLOCK_HEIGHT.save(storage, &height)
}
