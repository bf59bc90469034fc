//! Claim submission
//!
//! Orchestrators report counterparty events here. Submission only records a
//! vote; the block-end tally decides when the event is applied.

use cosmwasm_std::{Env, MessageInfo, Response};

use crate::attestation::attest;
use crate::claims::Claim;
use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::state::{ORCHESTRATOR_VALIDATOR, PARAMS};

pub fn execute_submit_claim(
    deps: BridgeDeps,
    env: &Env,
    info: &MessageInfo,
    claim: Claim,
) -> Result<Response, ContractError> {
    claim.validate_basic()?;
    if let Claim::Deposit(deposit) = &claim {
        deps.api
            .addr_validate(&deposit.cosmos_receiver)
            .map_err(|e| ContractError::invalid(format!("invalid receiver address: {}", e)))?;
    }

    let params = PARAMS.load(deps.storage)?;
    let validator = ORCHESTRATOR_VALIDATOR
        .may_load(deps.storage, &info.sender)?
        .ok_or_else(|| {
            ContractError::unknown(format!("validator for orchestrator {}", info.sender))
        })?;

    attest(deps, &params, env.block.height, &claim, &validator)?;

    let event_nonce = claim.event_nonce();
    Ok(Response::new()
        .add_attribute("action", "submit_claim")
        .add_attribute("event_nonce", event_nonce.to_string())
        .add_event(events::claim_submitted(
            &params,
            claim.claim_type(),
            event_nonce,
            &info.sender,
            &validator,
        ))
        .add_event(events::attestation_vote(
            &params,
            event_nonce,
            &claim.claim_hash(),
            &validator,
        )))
}
