//! Bad counterparty signature evidence
//!
//! Anyone may show a signature by a validator's counterparty key over a
//! snapshot or batch the chain never produced. Such a signature could only
//! serve to steal from the bridge contract, so its owner is slashed and jailed.

use cosmwasm_std::{Binary, Env, Response};

use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::hash::{batch_checkpoint, valset_checkpoint};
use crate::msg::SignedSubject;
use crate::signature::recover_eth_address;
use crate::slashing::{slash_and_jail, SlashReason};
use crate::state::{ETH_ADDRESS_VALIDATOR, PARAMS, PAST_CHECKPOINTS};

pub fn execute_submit_bad_signature_evidence(
    mut deps: BridgeDeps,
    env: &Env,
    subject: SignedSubject,
    signature: Binary,
) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let (checkpoint, subject_nonce) = match &subject {
        SignedSubject::Valset(valset) => (valset_checkpoint(&params.bridge_id, valset), valset.nonce),
        SignedSubject::Batch(batch) => (batch_checkpoint(&params.bridge_id, batch), batch.batch_nonce),
    };

    if PAST_CHECKPOINTS.has(deps.storage, checkpoint.as_slice()) {
        return Err(ContractError::invalid("checkpoint exists, cannot slash"));
    }

    let eth_signer = recover_eth_address(deps.api, &checkpoint, &signature)?;
    let operator = ETH_ADDRESS_VALIDATOR
        .may_load(deps.storage, eth_signer.as_bytes())?
        .ok_or_else(|| {
            ContractError::invalid(format!("did not find validator for eth address {}", eth_signer))
        })?;
    let validator = deps
        .keepers
        .staking
        .validator(deps.storage, &operator)?
        .ok_or_else(|| ContractError::invalid(format!("validator {} no longer exists", operator)))?;

    let slashed = slash_and_jail(
        &mut deps,
        &params,
        env.block.height,
        &validator,
        SlashReason::BadEthSignature,
        subject_nonce,
        params.slash_fraction_bad_eth_signature,
    )?;

    Ok(Response::new()
        .add_attribute("action", "submit_bad_signature_evidence")
        .add_attribute("validator", &operator)
        .add_event(slashed)
        .add_event(events::bad_signature_slashed(
            &params,
            &operator,
            &eth_signer,
            &checkpoint,
        )))
}
