//! Attestation engine
//!
//! Validators vote on counterparty events by submitting claims. Votes for the
//! same (event nonce, claim hash) pair collect in one attestation, and the
//! block-end tally applies an attestation once its voters hold at least 66% of
//! the last total power. Events are applied strictly in event-nonce order.

use std::collections::BTreeMap;

use cosmwasm_std::{Addr, Event, Order, StdResult, Storage};
use tracing::{debug, error, info};

use crate::cache::with_cache;
use crate::claims::Claim;
use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::handler::handle_claim;
use crate::state::{
    Attestation, LastClaimEvent, LastObservedEthereumBlockHeight, Params, ATTESTATIONS,
    LAST_EVENT_BY_VALIDATOR, LAST_OBSERVED_ETH_HEIGHT, LAST_OBSERVED_EVENT_NONCE,
    LAST_SLASHED_CLAIM_NONCE,
};

/// Percentage of the last total power an attestation needs
pub const ATTESTATION_POWER_THRESHOLD_PERCENT: u128 = 66;

/// `ceil(66 * total / 100)`
pub fn required_power(total_power: u64) -> u128 {
    (ATTESTATION_POWER_THRESHOLD_PERCENT * total_power as u128 + 99) / 100
}

// ============================================================================
// Lookups
// ============================================================================

pub fn last_observed_event_nonce(storage: &dyn Storage) -> StdResult<u64> {
    Ok(LAST_OBSERVED_EVENT_NONCE.may_load(storage)?.unwrap_or(0))
}

pub fn last_observed_eth_height(storage: &dyn Storage) -> StdResult<LastObservedEthereumBlockHeight> {
    Ok(LAST_OBSERVED_ETH_HEIGHT.may_load(storage)?.unwrap_or_default())
}

pub fn get_attestation(
    storage: &dyn Storage,
    event_nonce: u64,
    claim_hash: &[u8; 32],
) -> StdResult<Option<Attestation>> {
    ATTESTATIONS.may_load(storage, (event_nonce, claim_hash.as_slice()))
}

pub fn save_attestation(storage: &mut dyn Storage, att: &Attestation) -> StdResult<()> {
    let hash = att.claim.claim_hash();
    ATTESTATIONS.save(storage, (att.claim.event_nonce(), hash.as_slice()), att)
}

pub fn delete_attestation(storage: &mut dyn Storage, att: &Attestation) {
    let hash = att.claim.claim_hash();
    ATTESTATIONS.remove(storage, (att.claim.event_nonce(), hash.as_slice()));
}

/// Every stored attestation grouped by event nonce, in ascending nonce order
///
/// Within a nonce, attestations come back in claim-hash order.
pub fn attestation_mapping(storage: &dyn Storage) -> StdResult<BTreeMap<u64, Vec<Attestation>>> {
    let mut out: BTreeMap<u64, Vec<Attestation>> = BTreeMap::new();
    for entry in ATTESTATIONS.range(storage, None, None, Order::Ascending) {
        let ((nonce, _), att) = entry?;
        out.entry(nonce).or_default().push(att);
    }
    Ok(out)
}

/// Last claim `validator` submitted, or where a validator with no history starts
pub fn last_event_by_validator(
    storage: &dyn Storage,
    params: &Params,
    validator: &Addr,
) -> StdResult<LastClaimEvent> {
    if let Some(last) = LAST_EVENT_BY_VALIDATOR.may_load(storage, validator)? {
        return Ok(last);
    }

    let last_observed_nonce = last_observed_event_nonce(storage)?;
    if last_observed_nonce == 0 {
        // nothing observed yet: scan from the bridge contract's deployment
        return Ok(LastClaimEvent {
            ethereum_event_nonce: 0,
            ethereum_event_height: params.bridge_contract_start_height,
        });
    }

    let mapping = attestation_mapping(storage)?;
    if mapping.is_empty() {
        return Ok(LastClaimEvent {
            ethereum_event_nonce: last_observed_nonce,
            ethereum_event_height: last_observed_eth_height(storage)?.ethereum_block_height,
        });
    }

    // lowest observed event still stored, so the validator votes on everything
    // it can still be slashed for
    let lowest = mapping
        .iter()
        .filter(|(nonce, _)| **nonce < last_observed_nonce)
        .find_map(|(nonce, atts)| {
            atts.iter().find(|att| att.observed).map(|att| LastClaimEvent {
                ethereum_event_nonce: *nonce,
                ethereum_event_height: att.claim.block_height(),
            })
        });
    Ok(lowest.unwrap_or_default())
}

// ============================================================================
// Voting
// ============================================================================

/// Record `validator`'s vote for `claim`
///
/// The claim's event nonce must directly follow the validator's last claimed
/// nonce. A vote for an attestation that is already observed is recorded but
/// the event is not applied again.
pub fn attest(
    deps: BridgeDeps,
    params: &Params,
    height: u64,
    claim: &Claim,
    validator: &Addr,
) -> Result<Attestation, ContractError> {
    let bonded = deps
        .keepers
        .staking
        .validator(deps.storage, validator)?
        .map(|v| v.is_bonded())
        .unwrap_or(false);
    if !bonded {
        return Err(ContractError::invalid(format!(
            "validator {} is not bonded",
            validator
        )));
    }

    let last = last_event_by_validator(deps.storage, params, validator)?;
    let event_nonce = claim.event_nonce();
    if event_nonce != last.ethereum_event_nonce + 1 {
        return Err(ContractError::NonContiguousEventNonce {
            expected: last.ethereum_event_nonce + 1,
            got: event_nonce,
        });
    }

    let hash = claim.claim_hash();
    let mut att = get_attestation(deps.storage, event_nonce, &hash)?.unwrap_or_else(|| Attestation {
        observed: false,
        height,
        votes: Vec::new(),
        claim: claim.clone(),
    });
    if att.votes.contains(validator) {
        return Err(ContractError::duplicate(format!(
            "validator {} already voted for event {}",
            validator, event_nonce
        )));
    }
    if att.observed {
        debug!(event_nonce, %validator, "late vote for observed attestation");
    }
    att.votes.push(validator.clone());

    save_attestation(deps.storage, &att)?;
    LAST_EVENT_BY_VALIDATOR.save(
        deps.storage,
        validator,
        &LastClaimEvent {
            ethereum_event_nonce: event_nonce,
            ethereum_event_height: claim.block_height(),
        },
    )?;

    Ok(att)
}

// ============================================================================
// Tally
// ============================================================================

/// Apply `att` if its voters hold enough power
///
/// The claim handler runs in its own cache: a failing handler is logged and
/// its writes dropped, but the attestation still becomes observed.
pub fn try_attestation(
    deps: BridgeDeps,
    params: &Params,
    height: u64,
    mut att: Attestation,
) -> Result<Vec<Event>, ContractError> {
    if att.observed {
        panic!("attempting to process an observed attestation");
    }

    let staking = deps.keepers.staking;
    let total_power = staking.last_total_power(deps.storage)?;
    if total_power == 0 {
        return Ok(vec![]);
    }
    let required = required_power(total_power);

    let mut attestation_power = 0u128;
    let mut passed = false;
    for voter in &att.votes {
        attestation_power += staking.last_validator_power(deps.storage, voter)? as u128;
        if attestation_power >= required {
            passed = true;
            break;
        }
    }
    if !passed {
        return Ok(vec![]);
    }

    let event_nonce = att.claim.event_nonce();
    let last_nonce = last_observed_event_nonce(deps.storage)?;
    if event_nonce != last_nonce + 1 {
        panic!(
            "attempting to apply event {} out of order, last observed is {}",
            event_nonce, last_nonce
        );
    }

    LAST_OBSERVED_EVENT_NONCE.save(deps.storage, &event_nonce)?;
    LAST_OBSERVED_ETH_HEIGHT.save(
        deps.storage,
        &LastObservedEthereumBlockHeight {
            cosmos_block_height: height,
            ethereum_block_height: att.claim.block_height(),
        },
    )?;
    att.observed = true;
    save_attestation(deps.storage, &att)?;

    let claim_type = att.claim.claim_type();
    let hash = att.claim.claim_hash();
    info!(event_nonce, %claim_type, "attestation observed");

    let api = deps.api;
    let keepers = deps.keepers;
    let claim = &att.claim;
    let outcome = with_cache(deps.storage, |storage| {
        handle_claim(BridgeDeps { storage, api, keepers }, params, claim)
    });

    let mut out = match outcome {
        Ok(events) => events,
        Err(err) => {
            error!(
                event_nonce,
                %claim_type,
                id = %events::attestation_id(event_nonce, &hash),
                error = %err,
                "attestation handler failed"
            );
            vec![]
        }
    };
    out.push(events::attestation_observed(params, claim_type, event_nonce, &hash));
    Ok(out)
}

/// Block-end sweep: try every attestation at the next expected event nonce
///
/// Nonces are visited in ascending order, so a run of ready attestations is
/// applied in one block. Once an attestation at a nonce is observed, the rest
/// of that nonce's group no longer matches and is left for pruning.
///
/// A nonce's attestations are tried in claim-hash order, not arrival order.
/// A validator votes once per nonce, so vote sets at one nonce are disjoint and
/// at most one of them can hold the 66% threshold. The order never changes
/// which attestation is observed.
pub fn attestation_tally(
    mut deps: BridgeDeps,
    params: &Params,
    height: u64,
) -> Result<Vec<Event>, ContractError> {
    let mut out = Vec::new();
    for (nonce, atts) in attestation_mapping(deps.storage)? {
        for att in atts {
            if nonce != last_observed_event_nonce(deps.storage)? + 1 || att.observed {
                continue;
            }
            out.extend(try_attestation(deps.branch(), params, height, att)?);
        }
    }
    Ok(out)
}

/// Delete attestations below the last observed event nonce
///
/// With claim slashing on, attestations the slashing pass has not reached yet
/// are kept.
pub fn prune_attestations(storage: &mut dyn Storage, params: &Params) -> StdResult<()> {
    let last_observed = last_observed_event_nonce(storage)?;
    let last_slashed = LAST_SLASHED_CLAIM_NONCE.may_load(storage)?.unwrap_or(0);

    let mut stale = Vec::new();
    for entry in ATTESTATIONS.range(storage, None, None, Order::Ascending) {
        let ((nonce, _), att) = entry?;
        if nonce >= last_observed {
            break;
        }
        if params.claim_slashing_enabled && nonce > last_slashed {
            continue;
        }
        stale.push(att);
    }
    for att in stale {
        delete_attestation(storage, &att);
    }
    Ok(())
}
