//! Capability traits for the host chain modules the bridge depends on
//!
//! The bridge never owns validator, balance or signing-info state. It reaches
//! it through these traits. Every method receives the same `Storage` handle
//! the bridge is running against, so host state written during a message is
//! rolled back together with bridge state when the message fails.

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Decimal, StdResult, Storage, Uint256};

use crate::error::ContractError;

// ============================================================================
// Staking
// ============================================================================

#[cw_serde]
#[derive(Copy, Eq)]
pub enum BondStatus {
    Bonded,
    Unbonding,
    Unbonded,
}

/// Staking module view of a validator
#[cw_serde]
pub struct Validator {
    /// Operator address, the validator's identity inside the bridge
    pub operator: Addr,
    /// Consensus power as of the last end block
    pub power: u64,
    pub status: BondStatus,
    pub jailed: bool,
    /// Chain height unbonding started at (0 while bonded)
    pub unbonding_height: u64,
}

impl Validator {
    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    pub fn is_unbonding(&self) -> bool {
        self.status == BondStatus::Unbonding
    }
}

pub trait StakingKeeper {
    /// Bonded validators, highest power first (ties by operator address)
    fn bonded_validators_by_power(&self, storage: &dyn Storage) -> StdResult<Vec<Validator>>;

    fn validator(&self, storage: &dyn Storage, operator: &Addr) -> StdResult<Option<Validator>>;

    /// Power of the validator as of the last end block (0 if not bonded)
    fn last_validator_power(&self, storage: &dyn Storage, operator: &Addr) -> StdResult<u64>;

    /// Total bonded power as of the last end block
    fn last_total_power(&self, storage: &dyn Storage) -> StdResult<u64>;

    /// Validators currently in the unbonding queue, ordered by operator
    fn unbonding_validators(&self, storage: &dyn Storage) -> StdResult<Vec<Validator>>;

    fn slash(
        &self,
        storage: &mut dyn Storage,
        operator: &Addr,
        infraction_height: u64,
        power: u64,
        fraction: Decimal,
    ) -> StdResult<()>;

    fn jail(&self, storage: &mut dyn Storage, operator: &Addr) -> StdResult<()>;
}

// ============================================================================
// Bank
// ============================================================================

/// One unit of a denomination's metadata
#[cw_serde]
pub struct DenomUnit {
    pub denom: String,
    pub exponent: u32,
}

/// Bank module denomination metadata
#[cw_serde]
pub struct DenomMetadata {
    pub base: String,
    pub display: String,
    pub denom_units: Vec<DenomUnit>,
}

pub trait BankKeeper {
    fn send_from_account_to_module(
        &self,
        storage: &mut dyn Storage,
        sender: &Addr,
        module: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError>;

    fn send_from_module_to_account(
        &self,
        storage: &mut dyn Storage,
        module: &str,
        recipient: &Addr,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError>;

    /// Mint into the module account
    fn mint(
        &self,
        storage: &mut dyn Storage,
        module: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError>;

    /// Burn from the module account
    fn burn(
        &self,
        storage: &mut dyn Storage,
        module: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError>;

    fn supply(&self, storage: &dyn Storage, denom: &str) -> StdResult<Uint256>;

    fn denom_metadata(&self, storage: &dyn Storage, denom: &str) -> StdResult<Option<DenomMetadata>>;
}

// ============================================================================
// Slashing / Accounts
// ============================================================================

/// Liveness-tracking record kept by the slashing module
#[cw_serde]
pub struct SigningInfo {
    /// Height the validator (last) became bonded at
    pub start_height: u64,
}

pub trait SlashingKeeper {
    fn signing_info(&self, storage: &dyn Storage, operator: &Addr) -> StdResult<Option<SigningInfo>>;
}

pub trait AccountKeeper {
    /// Sequence of the account, counting the transaction being executed
    fn sequence(&self, storage: &dyn Storage, account: &Addr) -> StdResult<u64>;
}

/// Handles to every collaborator module
#[derive(Clone, Copy)]
pub struct Keepers<'a> {
    pub staking: &'a dyn StakingKeeper,
    pub bank: &'a dyn BankKeeper,
    pub slashing: &'a dyn SlashingKeeper,
    pub account: &'a dyn AccountKeeper,
}
