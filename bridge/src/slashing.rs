//! Slashing controller
//!
//! Runs first in every block end. Each pass keeps a cursor so a snapshot,
//! batch or event nonce is judged at most once.

use std::collections::BTreeSet;

use cosmwasm_std::{Addr, Decimal, Event, Order, StdResult, Storage};
use tracing::{debug, info};

use crate::attestation::{attestation_mapping, delete_attestation};
use crate::batch::batches_created_between;
use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::keepers::Validator;
use crate::state::{
    Params, Valset, BATCH_CONFIRMS, LAST_SLASHED_BATCH_BLOCK, LAST_SLASHED_CLAIM_NONCE,
    LAST_SLASHED_VALSET_NONCE, VALSETS, VALSET_CONFIRMS,
};

/// Why a validator was slashed, used as the event's `reason`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashReason {
    MissingValsetSignature,
    MissingBatchSignature,
    MissingClaim,
    ConflictingClaim,
    BadEthSignature,
}

impl SlashReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlashReason::MissingValsetSignature => "valset",
            SlashReason::MissingBatchSignature => "batch",
            SlashReason::MissingClaim => "claim",
            SlashReason::ConflictingClaim => "conflicting_claim",
            SlashReason::BadEthSignature => "bad_eth_signature",
        }
    }
}

/// Slash `validator` at its current power and jail it unless already jailed
pub(crate) fn slash_and_jail(
    deps: &mut BridgeDeps,
    params: &Params,
    height: u64,
    validator: &Validator,
    reason: SlashReason,
    subject_nonce: u64,
    fraction: Decimal,
) -> Result<Event, ContractError> {
    let staking = deps.keepers.staking;
    staking.slash(deps.storage, &validator.operator, height, validator.power, fraction)?;
    let newly_jailed = !validator.jailed;
    if newly_jailed {
        staking.jail(deps.storage, &validator.operator)?;
    }
    info!(
        validator = %validator.operator,
        reason = reason.as_str(),
        nonce = subject_nonce,
        %fraction,
        "slashed validator"
    );
    Ok(events::validator_slashed(
        params,
        reason.as_str(),
        &validator.operator,
        subject_nonce,
        fraction,
        newly_jailed,
    ))
}

/// Fresh staking view of `operator`; the end block must not see it vanish
fn refresh(deps: &BridgeDeps, operator: &Addr) -> Result<Validator, ContractError> {
    match deps.keepers.staking.validator(deps.storage, operator)? {
        Some(validator) => Ok(validator),
        None => panic!("validator {} left the staking set during end block", operator),
    }
}

fn start_height(deps: &BridgeDeps, operator: &Addr) -> StdResult<Option<u64>> {
    Ok(deps
        .keepers
        .slashing
        .signing_info(deps.storage, operator)?
        .map(|info| info.start_height))
}

/// Run every enabled slashing pass
pub fn slashing(
    mut deps: BridgeDeps,
    params: &Params,
    height: u64,
) -> Result<Vec<Event>, ContractError> {
    let mut out = valset_slashing(&mut deps, params, height)?;
    out.extend(batch_slashing(&mut deps, params, height)?);
    if params.claim_slashing_enabled {
        out.extend(claim_slashing(&mut deps, params, height)?);
    }
    Ok(out)
}

// ============================================================================
// Snapshots
// ============================================================================

fn unslashed_valsets(storage: &dyn Storage, params: &Params, height: u64) -> StdResult<Vec<Valset>> {
    let last_slashed = LAST_SLASHED_VALSET_NONCE.may_load(storage)?.unwrap_or(0);
    let mut out = Vec::new();
    for entry in VALSETS.range(
        storage,
        Some(cw_storage_plus::Bound::exclusive(last_slashed)),
        None,
        Order::Ascending,
    ) {
        let (_, valset) = entry?;
        if valset.height.saturating_add(params.signed_valsets_window) > height {
            break;
        }
        out.push(valset);
    }
    Ok(out)
}

/// Slash validators that never signed a snapshot whose window has closed
pub fn valset_slashing(
    deps: &mut BridgeDeps,
    params: &Params,
    height: u64,
) -> Result<Vec<Event>, ContractError> {
    let valsets = unslashed_valsets(deps.storage, params, height)?;
    if valsets.is_empty() {
        return Ok(vec![]);
    }
    let staking = deps.keepers.staking;
    let bonded = staking.bonded_validators_by_power(deps.storage)?;
    let unbonding = staking.unbonding_validators(deps.storage)?;

    let mut out = Vec::new();
    for vs in valsets {
        let signed: BTreeSet<Addr> = VALSET_CONFIRMS
            .prefix(vs.nonce)
            .keys(deps.storage, None, None, Order::Ascending)
            .collect::<StdResult<_>>()?;

        for val in &bonded {
            let Some(start) = start_height(deps, &val.operator)? else {
                continue;
            };
            if start >= vs.height || signed.contains(&val.operator) {
                continue;
            }
            let val = refresh(deps, &val.operator)?;
            if !val.jailed {
                out.push(slash_and_jail(
                    deps,
                    params,
                    height,
                    &val,
                    SlashReason::MissingValsetSignature,
                    vs.nonce,
                    params.slash_fraction_valset,
                )?);
            }
        }

        // exiting during the window does not avoid the signing duty
        for val in &unbonding {
            let Some(start) = start_height(deps, &val.operator)? else {
                continue;
            };
            let within_unbond_window =
                vs.height < val.unbonding_height.saturating_add(params.unbond_slashing_valsets_window);
            if start >= vs.height
                || !val.is_unbonding()
                || !within_unbond_window
                || signed.contains(&val.operator)
            {
                continue;
            }
            let val = refresh(deps, &val.operator)?;
            out.push(slash_and_jail(
                deps,
                params,
                height,
                &val,
                SlashReason::MissingValsetSignature,
                vs.nonce,
                params.slash_fraction_valset,
            )?);
        }

        LAST_SLASHED_VALSET_NONCE.save(deps.storage, &vs.nonce)?;
    }
    Ok(out)
}

// ============================================================================
// Batches
// ============================================================================

/// Slash bonded validators that never signed a batch whose window has closed
pub fn batch_slashing(
    deps: &mut BridgeDeps,
    params: &Params,
    height: u64,
) -> Result<Vec<Event>, ContractError> {
    if height <= params.signed_batches_window {
        return Ok(vec![]);
    }
    let max_block = height - params.signed_batches_window;
    let last_slashed = LAST_SLASHED_BATCH_BLOCK.may_load(deps.storage)?.unwrap_or(0);
    let batches = batches_created_between(deps.storage, last_slashed, max_block)?;
    if batches.is_empty() {
        return Ok(vec![]);
    }

    let mut out = Vec::new();
    for batch in batches {
        let bonded = deps.keepers.staking.bonded_validators_by_power(deps.storage)?;
        let contract = batch.token_contract.as_bytes().as_slice();
        for val in bonded {
            // joined after the batch was built
            if matches!(start_height(deps, &val.operator)?, Some(start) if start > batch.block) {
                continue;
            }
            let signed = BATCH_CONFIRMS.has(deps.storage, (contract, batch.batch_nonce, &val.operator));
            if signed {
                continue;
            }
            let val = refresh(deps, &val.operator)?;
            if !val.jailed {
                out.push(slash_and_jail(
                    deps,
                    params,
                    height,
                    &val,
                    SlashReason::MissingBatchSignature,
                    batch.batch_nonce,
                    params.slash_fraction_batch,
                )?);
            }
        }
        LAST_SLASHED_BATCH_BLOCK.save(deps.storage, &batch.block)?;
    }
    Ok(out)
}

// ============================================================================
// Claims
// ============================================================================

/// Slash votes for events that lost, and validators that skipped an event
///
/// Walks event nonces above the cursor in order and stops at the first nonce
/// without an observed attestation. Conflicting attestations are punished and
/// deleted as soon as a rival is observed. Missing votes are punished once the
/// claim window of the observed attestation has passed, which also moves the
/// cursor.
pub fn claim_slashing(
    deps: &mut BridgeDeps,
    params: &Params,
    height: u64,
) -> Result<Vec<Event>, ContractError> {
    let last_slashed = LAST_SLASHED_CLAIM_NONCE.may_load(deps.storage)?.unwrap_or(0);
    let mapping = attestation_mapping(deps.storage)?;
    let staking = deps.keepers.staking;

    let mut out = Vec::new();
    for (nonce, atts) in mapping.range(last_slashed + 1..) {
        let Some(observed) = atts.iter().find(|att| att.observed) else {
            break;
        };

        for conflicting in atts.iter().filter(|att| !att.observed) {
            for voter in &conflicting.votes {
                let Some(val) = staking.validator(deps.storage, voter)? else {
                    continue;
                };
                out.push(slash_and_jail(
                    deps,
                    params,
                    height,
                    &val,
                    SlashReason::ConflictingClaim,
                    *nonce,
                    params.slash_fraction_conflicting_claim,
                )?);
            }
            debug!(event_nonce = nonce, "deleting conflicting attestation");
            delete_attestation(deps.storage, conflicting);
        }

        if observed.height.saturating_add(params.signed_claims_window) > height {
            break;
        }

        for val in staking.bonded_validators_by_power(deps.storage)? {
            if observed.votes.contains(&val.operator) {
                continue;
            }
            let Some(start) = start_height(deps, &val.operator)? else {
                continue;
            };
            if start >= observed.height {
                continue;
            }
            let val = refresh(deps, &val.operator)?;
            if !val.jailed {
                out.push(slash_and_jail(
                    deps,
                    params,
                    height,
                    &val,
                    SlashReason::MissingClaim,
                    *nonce,
                    params.slash_fraction_claim,
                )?);
            }
        }
        LAST_SLASHED_CLAIM_NONCE.save(deps.storage, nonce)?;
    }
    Ok(out)
}
