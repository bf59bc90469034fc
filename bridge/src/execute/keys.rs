//! Key delegation
//!
//! A validator operator binds one orchestrator account and one counterparty
//! key to itself. The counterparty key proves ownership by signing the
//! operator address together with the operator account's sequence. Bindings
//! are permanent.

use common::EthAddress;
use cosmwasm_std::{Binary, MessageInfo, Response};
use tracing::info;

use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::hash::delegate_keys_sign_bytes;
use crate::signature::validate_eth_signature;
use crate::state::{
    ETH_ADDRESS_VALIDATOR, ORCHESTRATOR_VALIDATOR, PARAMS, VALIDATOR_ETH_ADDRESS,
    VALIDATOR_ORCHESTRATOR,
};

pub fn execute_set_orchestrator_addresses(
    deps: BridgeDeps,
    info: &MessageInfo,
    orchestrator: Option<String>,
    eth_address: EthAddress,
    eth_signature: Binary,
) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let validator = &info.sender;

    if deps.keepers.staking.validator(deps.storage, validator)?.is_none() {
        return Err(ContractError::unknown(format!("validator {}", validator)));
    }

    let orchestrator = match orchestrator {
        Some(addr) => deps.api.addr_validate(&addr)?,
        None => validator.clone(),
    };

    if VALIDATOR_ETH_ADDRESS.has(deps.storage, validator) {
        return Err(ContractError::SetOrchAddresses(format!(
            "validator {} already registered its keys",
            validator
        )));
    }
    if ORCHESTRATOR_VALIDATOR.has(deps.storage, &orchestrator) {
        return Err(ContractError::SetOrchAddresses(format!(
            "orchestrator address {} in use",
            orchestrator
        )));
    }
    if ETH_ADDRESS_VALIDATOR.has(deps.storage, eth_address.as_bytes()) {
        return Err(ContractError::SetOrchAddresses(format!(
            "ethereum address {} in use",
            eth_address
        )));
    }

    // the sequence already counts this transaction
    let sequence = deps.keepers.account.sequence(deps.storage, validator)?;
    let nonce = sequence.saturating_sub(1);
    let sign_bytes = delegate_keys_sign_bytes(validator.as_str(), nonce);
    validate_eth_signature(deps.api, &sign_bytes, &eth_signature, &eth_address).map_err(|e| {
        ContractError::SetOrchAddresses(format!(
            "failed to validate delegate keys signature for {} at nonce {}: {}",
            eth_address, nonce, e
        ))
    })?;

    VALIDATOR_ETH_ADDRESS.save(deps.storage, validator, &eth_address)?;
    ETH_ADDRESS_VALIDATOR.save(deps.storage, eth_address.as_bytes(), validator)?;
    ORCHESTRATOR_VALIDATOR.save(deps.storage, &orchestrator, validator)?;
    VALIDATOR_ORCHESTRATOR.save(deps.storage, validator, &orchestrator)?;

    info!(%validator, %orchestrator, %eth_address, "registered delegate keys");

    Ok(Response::new()
        .add_attribute("action", "set_orchestrator_addresses")
        .add_attribute("validator", validator)
        .add_event(events::set_orchestrator_address(
            &params,
            validator,
            &orchestrator,
            &eth_address,
        )))
}
