//! Counterparty event claims
//!
//! A claim is one orchestrator's report of an event emitted by the bridge
//! contract. Claims about the same event from different validators must hash
//! identically, so the submitter is never part of the claim or its hash.

use std::fmt;

use common::EthAddress;
use cosmwasm_schema::cw_serde;
use cosmwasm_std::Uint256;

use crate::error::ContractError;
use crate::hash::{abi_encode, fixed_bytes32, keccak256, AbiToken};
use crate::state::BridgeValidator;

/// Tokens locked in the bridge contract for a chain receiver
#[cw_serde]
pub struct DepositClaim {
    pub event_nonce: u64,
    pub block_height: u64,
    pub token_contract: EthAddress,
    pub amount: Uint256,
    pub ethereum_sender: EthAddress,
    pub cosmos_receiver: String,
}

/// A batch was executed by the bridge contract
#[cw_serde]
pub struct WithdrawClaim {
    pub event_nonce: u64,
    pub block_height: u64,
    pub batch_nonce: u64,
    pub token_contract: EthAddress,
}

/// An ERC20 representing a chain-originated denom was deployed
#[cw_serde]
pub struct Erc20DeployedClaim {
    pub event_nonce: u64,
    pub block_height: u64,
    pub cosmos_denom: String,
    pub token_contract: EthAddress,
    pub name: String,
    pub symbol: String,
    pub decimals: u64,
}

/// The bridge contract accepted a validator set snapshot
#[cw_serde]
pub struct ValsetUpdatedClaim {
    pub event_nonce: u64,
    pub valset_nonce: u64,
    pub block_height: u64,
    pub members: Vec<BridgeValidator>,
    pub reward_amount: Uint256,
    pub reward_token: EthAddress,
}

#[cw_serde]
pub enum Claim {
    Deposit(DepositClaim),
    Withdraw(WithdrawClaim),
    Erc20Deployed(Erc20DeployedClaim),
    ValsetUpdated(ValsetUpdatedClaim),
}

#[cw_serde]
#[derive(Copy, Eq)]
pub enum ClaimType {
    Deposit,
    Withdraw,
    Erc20Deployed,
    ValsetUpdated,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Deposit => "deposit",
            ClaimType::Withdraw => "withdraw",
            ClaimType::Erc20Deployed => "erc20_deployed",
            ClaimType::ValsetUpdated => "valset_updated",
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Claim {
    pub fn event_nonce(&self) -> u64 {
        match self {
            Claim::Deposit(c) => c.event_nonce,
            Claim::Withdraw(c) => c.event_nonce,
            Claim::Erc20Deployed(c) => c.event_nonce,
            Claim::ValsetUpdated(c) => c.event_nonce,
        }
    }

    /// Counterparty block height the event was emitted at
    pub fn block_height(&self) -> u64 {
        match self {
            Claim::Deposit(c) => c.block_height,
            Claim::Withdraw(c) => c.block_height,
            Claim::Erc20Deployed(c) => c.block_height,
            Claim::ValsetUpdated(c) => c.block_height,
        }
    }

    pub fn claim_type(&self) -> ClaimType {
        match self {
            Claim::Deposit(_) => ClaimType::Deposit,
            Claim::Withdraw(_) => ClaimType::Withdraw,
            Claim::Erc20Deployed(_) => ClaimType::Erc20Deployed,
            Claim::ValsetUpdated(_) => ClaimType::ValsetUpdated,
        }
    }

    /// `abi.encode` of the event's fields, led by its type tag
    ///
    /// Strings are dynamic ABI tokens, so free-form fields carry their length
    /// and two distinct claims never share an encoding.
    fn abi_tokens(&self) -> Vec<AbiToken> {
        let tag = AbiToken::FixedBytes(fixed_bytes32(self.claim_type().as_str()));
        let nonce = AbiToken::Uint(Uint256::from(self.event_nonce()));
        let height = AbiToken::Uint(Uint256::from(self.block_height()));
        let mut tokens = vec![tag, nonce, height];
        match self {
            Claim::Deposit(c) => tokens.extend([
                AbiToken::Address(c.token_contract),
                AbiToken::Uint(c.amount),
                AbiToken::Address(c.ethereum_sender),
                AbiToken::String(c.cosmos_receiver.clone()),
            ]),
            Claim::Withdraw(c) => tokens.extend([
                AbiToken::Address(c.token_contract),
                AbiToken::Uint(Uint256::from(c.batch_nonce)),
            ]),
            Claim::Erc20Deployed(c) => tokens.extend([
                AbiToken::String(c.cosmos_denom.clone()),
                AbiToken::Address(c.token_contract),
                AbiToken::String(c.name.clone()),
                AbiToken::String(c.symbol.clone()),
                AbiToken::Uint(Uint256::from(c.decimals)),
            ]),
            Claim::ValsetUpdated(c) => tokens.extend([
                AbiToken::Uint(Uint256::from(c.valset_nonce)),
                AbiToken::AddressArray(c.members.iter().map(|m| m.ethereum_address).collect()),
                AbiToken::UintArray(c.members.iter().map(|m| Uint256::from(m.power)).collect()),
                AbiToken::Uint(c.reward_amount),
                AbiToken::Address(c.reward_token),
            ]),
        }
        tokens
    }

    /// Hash identifying the event; identical for every honest reporter
    pub fn claim_hash(&self) -> [u8; 32] {
        keccak256(&abi_encode(&self.abi_tokens()))
    }

    /// Stateless checks run before a claim reaches the attestation engine
    pub fn validate_basic(&self) -> Result<(), ContractError> {
        if self.event_nonce() == 0 {
            return Err(ContractError::invalid("event nonce must be non-zero"));
        }
        match self {
            Claim::Deposit(c) => {
                if c.amount.is_zero() {
                    return Err(ContractError::invalid("deposit amount must be non-zero"));
                }
                if c.cosmos_receiver.is_empty() {
                    return Err(ContractError::invalid("deposit receiver is empty"));
                }
            }
            Claim::Withdraw(c) => {
                if c.batch_nonce == 0 {
                    return Err(ContractError::invalid("batch nonce must be non-zero"));
                }
            }
            Claim::Erc20Deployed(c) => {
                if c.cosmos_denom.is_empty() {
                    return Err(ContractError::invalid("deployed denom is empty"));
                }
            }
            Claim::ValsetUpdated(_) => {}
        }
        Ok(())
    }
}
