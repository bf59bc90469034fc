//! Handlers for observed claims
//!
//! Each handler runs inside the attestation's own cache, so an error here
//! discards the handler's writes without un-observing the attestation.

use cosmwasm_std::{Event, Uint256};
use tracing::info;

use crate::batch::outgoing_tx_batch_executed;
use crate::claims::{Claim, DepositClaim, Erc20DeployedClaim, ValsetUpdatedClaim};
use crate::denom::{bind_cosmos_denom, erc20_to_denom};
use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::keepers::DenomMetadata;
use crate::state::{Params, Valset, LAST_OBSERVED_VALSET, MODULE_NAME};

/// Apply an observed claim to chain state
pub fn handle_claim(
    deps: BridgeDeps,
    params: &Params,
    claim: &Claim,
) -> Result<Vec<Event>, ContractError> {
    match claim {
        Claim::Deposit(deposit) => {
            handle_deposit(deps, deposit)?;
            Ok(vec![])
        }
        Claim::Withdraw(withdraw) => outgoing_tx_batch_executed(
            deps.storage,
            params,
            &withdraw.token_contract,
            withdraw.batch_nonce,
        ),
        Claim::Erc20Deployed(deployed) => {
            handle_erc20_deployed(deps, deployed)?;
            Ok(vec![events::erc20_deployed(
                params,
                &deployed.cosmos_denom,
                &deployed.token_contract,
            )])
        }
        Claim::ValsetUpdated(updated) => {
            handle_valset_updated(deps, updated)?;
            Ok(vec![])
        }
    }
}

// ============================================================================
// Deposit
// ============================================================================

fn handle_deposit(deps: BridgeDeps, claim: &DepositClaim) -> Result<(), ContractError> {
    let receiver = deps
        .api
        .addr_validate(&claim.cosmos_receiver)
        .map_err(|e| ContractError::invalid(format!("invalid receiver address: {}", e)))?;
    let (origin, denom) = erc20_to_denom(deps.storage, &claim.token_contract)?;
    let bank = deps.keepers.bank;

    if !origin.is_cosmos() {
        let supply = bank.supply(deps.storage, &denom)?;
        if supply.checked_add(claim.amount).is_err() {
            return Err(ContractError::SupplyOverflow {
                denom,
                amount: claim.amount,
            });
        }
        bank.mint(deps.storage, MODULE_NAME, &denom, claim.amount)?;
    }
    bank.send_from_module_to_account(deps.storage, MODULE_NAME, &receiver, &denom, claim.amount)?;

    info!(
        event_nonce = claim.event_nonce,
        %receiver,
        %denom,
        amount = %claim.amount,
        "deposit credited"
    );
    Ok(())
}

// ============================================================================
// ERC20 Deployed
// ============================================================================

fn handle_erc20_deployed(deps: BridgeDeps, claim: &Erc20DeployedClaim) -> Result<(), ContractError> {
    let bank = deps.keepers.bank;
    match bank.denom_metadata(deps.storage, &claim.cosmos_denom)? {
        Some(metadata) if !metadata.base.is_empty() => verify_erc20_against_metadata(&metadata, claim)?,
        _ => {
            let supply = bank.supply(deps.storage, &claim.cosmos_denom)?;
            verify_erc20_without_metadata(supply, claim)?;
        }
    }
    bind_cosmos_denom(deps.storage, &claim.cosmos_denom, &claim.token_contract)
}

/// Name and symbol must equal the display denom, decimals its exponent
pub fn verify_erc20_against_metadata(
    metadata: &DenomMetadata,
    claim: &Erc20DeployedClaim,
) -> Result<(), ContractError> {
    if claim.name != metadata.display {
        return Err(ContractError::invalid(format!(
            "ERC20 name {} does not match the denom display {}",
            claim.name, metadata.display
        )));
    }
    if claim.symbol != metadata.display {
        return Err(ContractError::invalid(format!(
            "ERC20 symbol {} does not match the denom display {}",
            claim.symbol, metadata.display
        )));
    }
    let decimals = metadata
        .denom_units
        .iter()
        .find(|unit| unit.denom == metadata.display)
        .map(|unit| unit.exponent)
        .unwrap_or(0);
    if claim.decimals != decimals as u64 {
        return Err(ContractError::invalid(format!(
            "ERC20 decimals {} does not match denom decimals {}",
            claim.decimals, decimals
        )));
    }
    Ok(())
}

/// Tokens without metadata: existing supply, name == denom, no symbol, zero decimals
pub fn verify_erc20_without_metadata(
    supply: Uint256,
    claim: &Erc20DeployedClaim,
) -> Result<(), ContractError> {
    if supply.is_zero() {
        return Err(ContractError::invalid(format!(
            "no supply exists for token {} without metadata",
            claim.cosmos_denom
        )));
    }
    if claim.name != claim.cosmos_denom {
        return Err(ContractError::invalid(format!(
            "invalid ERC20 name for token without metadata; got {}, expected {}",
            claim.name, claim.cosmos_denom
        )));
    }
    if !claim.symbol.is_empty() {
        return Err(ContractError::invalid(format!(
            "expected empty ERC20 symbol for token without metadata; got {}",
            claim.symbol
        )));
    }
    if claim.decimals != 0 {
        return Err(ContractError::invalid(format!(
            "expected zero ERC20 decimals for token without metadata; got {}",
            claim.decimals
        )));
    }
    Ok(())
}

// ============================================================================
// Valset Updated
// ============================================================================

/// Remember what the counterparty accepted; only snapshot pruning reads it
fn handle_valset_updated(deps: BridgeDeps, claim: &ValsetUpdatedClaim) -> Result<(), ContractError> {
    LAST_OBSERVED_VALSET.save(
        deps.storage,
        &Valset {
            nonce: claim.valset_nonce,
            members: claim.members.clone(),
            height: 0,
            reward_amount: claim.reward_amount,
            reward_token: claim.reward_token,
        },
    )?;
    Ok(())
}
