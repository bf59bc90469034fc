//! Denomination registry
//!
//! Counterparty-originated tokens live on the chain as vouchers named
//! `peggy/0x<contract>` and are minted/burned. Chain-originated denoms are
//! bound to a counterparty contract once an ERC20-deployed claim is observed,
//! and are locked/unlocked in the module account.

use common::EthAddress;
use cosmwasm_std::{StdResult, Storage};

use crate::error::ContractError;
use crate::state::{DENOM_PREFIX, DENOM_TO_ERC20, ERC20_TO_DENOM};

/// Where a token was first issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenomOrigin {
    /// Native to the chain, locked in the module account while bridged
    Cosmos,
    /// Native to the counterparty, minted on the chain as a voucher
    Ethereum,
}

impl DenomOrigin {
    pub fn is_cosmos(&self) -> bool {
        *self == DenomOrigin::Cosmos
    }
}

/// Voucher denom for a counterparty-originated token
pub fn voucher_denom(contract: &EthAddress) -> String {
    format!("{}/{}", DENOM_PREFIX, contract.as_hex())
}

/// Contract behind a voucher denom, if `denom` is one
pub fn parse_voucher_denom(denom: &str) -> Option<EthAddress> {
    let (prefix, contract) = denom.split_once('/')?;
    if prefix != DENOM_PREFIX || !contract.starts_with("0x") {
        return None;
    }
    EthAddress::from_hex(contract)
        .ok()
        .filter(|addr| voucher_denom(addr) == denom)
}

/// Resolve a chain denom to its counterparty contract
pub fn denom_to_erc20(
    storage: &dyn Storage,
    denom: &str,
) -> Result<(DenomOrigin, EthAddress), ContractError> {
    if let Some(contract) = DENOM_TO_ERC20.may_load(storage, denom)? {
        return Ok((DenomOrigin::Cosmos, contract));
    }
    match parse_voucher_denom(denom) {
        Some(contract) => Ok((DenomOrigin::Ethereum, contract)),
        None => Err(ContractError::unknown(format!(
            "denom {} is neither a bridge voucher nor bound to a counterparty contract",
            denom
        ))),
    }
}

/// Resolve a counterparty contract to the chain denom it maps to
pub fn erc20_to_denom(storage: &dyn Storage, contract: &EthAddress) -> StdResult<(DenomOrigin, String)> {
    match ERC20_TO_DENOM.may_load(storage, contract.as_bytes())? {
        Some(denom) => Ok((DenomOrigin::Cosmos, denom)),
        None => Ok((DenomOrigin::Ethereum, voucher_denom(contract))),
    }
}

/// Record a chain-originated binding in both directions
pub fn bind_cosmos_denom(
    storage: &mut dyn Storage,
    denom: &str,
    contract: &EthAddress,
) -> Result<(), ContractError> {
    if let Some(existing) = DENOM_TO_ERC20.may_load(storage, denom)? {
        return Err(ContractError::invalid(format!(
            "denom {} already bound to {}",
            denom, existing
        )));
    }
    if let Some(existing) = ERC20_TO_DENOM.may_load(storage, contract.as_bytes())? {
        return Err(ContractError::invalid(format!(
            "contract {} already bound to {}",
            contract, existing
        )));
    }
    if parse_voucher_denom(denom).is_some() {
        return Err(ContractError::invalid(format!(
            "voucher denom {} cannot be bound to a deployed contract",
            denom
        )));
    }
    DENOM_TO_ERC20.save(storage, denom, contract)?;
    ERC20_TO_DENOM.save(storage, contract.as_bytes(), &denom.to_string())?;
    Ok(())
}
