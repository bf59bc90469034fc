//! Snapshot and batch signatures
//!
//! An orchestrator submits its validator's counterparty signature over a
//! stored checkpoint. The signature must recover to the counterparty key the
//! validator registered.

use common::EthAddress;
use cosmwasm_std::{Addr, Binary, MessageInfo, Response, Storage};

use crate::batch::get_batch;
use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::hash::{batch_checkpoint, bytes32_to_hex, valset_checkpoint};
use crate::signature::validate_eth_signature;
use crate::state::{
    BatchConfirm, ValsetConfirm, BATCH_CONFIRMS, ORCHESTRATOR_VALIDATOR, PARAMS,
    VALIDATOR_ETH_ADDRESS, VALSET_CONFIRMS,
};
use crate::valset::get_valset;

/// Validator behind `orchestrator` and the counterparty key it registered
fn signer_of(storage: &dyn Storage, orchestrator: &Addr) -> Result<(Addr, EthAddress), ContractError> {
    let validator = ORCHESTRATOR_VALIDATOR
        .may_load(storage, orchestrator)?
        .ok_or_else(|| ContractError::unknown(format!("validator for orchestrator {}", orchestrator)))?;
    let eth_address = VALIDATOR_ETH_ADDRESS
        .may_load(storage, &validator)?
        .ok_or_else(|| ContractError::Empty(format!("no eth address for validator {}", validator)))?;
    Ok((validator, eth_address))
}

fn check_claimed_signer(claimed: &EthAddress, registered: &EthAddress) -> Result<(), ContractError> {
    if claimed != registered {
        return Err(ContractError::invalid(format!(
            "eth address {} is not the registered key {}",
            claimed, registered
        )));
    }
    Ok(())
}

pub fn execute_valset_confirm(
    deps: BridgeDeps,
    info: &MessageInfo,
    nonce: u64,
    eth_address: EthAddress,
    signature: Binary,
) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let valset = get_valset(deps.storage, nonce)?
        .ok_or_else(|| ContractError::invalid(format!("couldn't find valset {}", nonce)))?;
    let checkpoint = valset_checkpoint(&params.bridge_id, &valset);

    let (validator, registered) = signer_of(deps.storage, &info.sender)?;
    check_claimed_signer(&eth_address, &registered)?;
    validate_eth_signature(deps.api, &checkpoint, &signature, &registered).map_err(|e| {
        ContractError::invalid(format!(
            "signature verification failed for checkpoint {}: {}",
            bytes32_to_hex(&checkpoint),
            e
        ))
    })?;

    if VALSET_CONFIRMS.has(deps.storage, (nonce, &validator)) {
        return Err(ContractError::duplicate(format!(
            "validator {} already signed valset {}",
            validator, nonce
        )));
    }
    VALSET_CONFIRMS.save(
        deps.storage,
        (nonce, &validator),
        &ValsetConfirm {
            nonce,
            validator: validator.clone(),
            orchestrator: info.sender.clone(),
            eth_address: registered,
            signature,
        },
    )?;

    Ok(Response::new()
        .add_attribute("action", "valset_confirm")
        .add_attribute("valset_nonce", nonce.to_string())
        .add_event(events::valset_confirm(&params, nonce, &validator)))
}

pub fn execute_confirm_batch(
    deps: BridgeDeps,
    info: &MessageInfo,
    nonce: u64,
    token_contract: EthAddress,
    eth_signer: EthAddress,
    signature: Binary,
) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let batch = get_batch(deps.storage, &token_contract, nonce)?.ok_or_else(|| {
        ContractError::invalid(format!("couldn't find batch {} of {}", nonce, token_contract))
    })?;
    let checkpoint = batch_checkpoint(&params.bridge_id, &batch);

    let (validator, registered) = signer_of(deps.storage, &info.sender)?;
    check_claimed_signer(&eth_signer, &registered)?;
    validate_eth_signature(deps.api, &checkpoint, &signature, &registered).map_err(|e| {
        ContractError::invalid(format!(
            "signature verification failed for checkpoint {}: {}",
            bytes32_to_hex(&checkpoint),
            e
        ))
    })?;

    let key = (token_contract.as_bytes().as_slice(), nonce, &validator);
    if BATCH_CONFIRMS.has(deps.storage, key) {
        return Err(ContractError::duplicate(format!(
            "validator {} already signed batch {} of {}",
            validator, nonce, token_contract
        )));
    }
    BATCH_CONFIRMS.save(
        deps.storage,
        key,
        &BatchConfirm {
            nonce,
            token_contract,
            validator: validator.clone(),
            orchestrator: info.sender.clone(),
            eth_signer: registered,
            signature,
        },
    )?;

    Ok(Response::new()
        .add_attribute("action", "confirm_batch")
        .add_attribute("batch_nonce", nonce.to_string())
        .add_event(events::batch_confirm(&params, &token_contract, nonce, &validator)))
}
