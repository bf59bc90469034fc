//! State definitions for the Peggy bridge coordination core
//!
//! Every entity lives under its own one-byte namespace. Numeric key parts are
//! big-endian (cw-storage-plus `u64` keys), counterparty contracts are keyed by
//! their 20 raw bytes and fees by their 32-byte big-endian value, so range
//! scans come back in numeric order.

use common::EthAddress;
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Binary, Decimal, Empty, StdResult, Uint256};
use cw_storage_plus::{Item, Map};

use crate::claims::Claim;
use crate::error::ContractError;

/// Contract name for cw2 migration info
pub const CONTRACT_NAME: &str = "crates.io:peggy";

/// Contract version for cw2 migration info
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name the module account is addressed by in the bank collaborator
pub const MODULE_NAME: &str = "peggy";

/// Prefix for counterparty-originated denominations (`peggy/0x...`)
pub const DENOM_PREFIX: &str = "peggy";

/// Upper bound of a normalized snapshot weight (2^32 - 1)
pub const MAX_NORMALIZED_POWER: u64 = u32::MAX as u64;

// ============================================================================
// Parameters
// ============================================================================

/// Module parameters
#[cw_serde]
pub struct Params {
    /// Bridge identifier mixed into every checkpoint (at most 32 bytes)
    pub bridge_id: String,
    /// Address of the bridge contract on the counterparty
    pub bridge_contract_address: EthAddress,
    /// EVM chain id of the counterparty
    pub bridge_chain_id: u64,
    /// Counterparty height the bridge contract was deployed at
    pub bridge_contract_start_height: u64,
    /// Blocks a validator has to sign a snapshot before being slashable
    pub signed_valsets_window: u64,
    /// Blocks a validator has to sign a batch before being slashable
    pub signed_batches_window: u64,
    /// Blocks a validator has to vote on an attestation before being slashable
    pub signed_claims_window: u64,
    /// Batch lifetime on the counterparty, in milliseconds
    pub target_batch_timeout: u64,
    /// Average chain block time in milliseconds
    pub average_block_time: u64,
    /// Average counterparty block time in milliseconds
    pub average_ethereum_block_time: u64,
    pub slash_fraction_valset: Decimal,
    pub slash_fraction_batch: Decimal,
    pub slash_fraction_claim: Decimal,
    pub slash_fraction_conflicting_claim: Decimal,
    pub slash_fraction_bad_eth_signature: Decimal,
    /// Blocks after unbonding starts during which missing snapshot signatures are still slashed
    pub unbond_slashing_valsets_window: u64,
    /// Whether the claim slashing pass runs at all
    pub claim_slashing_enabled: bool,
    /// Reward attached to every snapshot (empty denom means none)
    pub valset_reward: common::Coin256,
    /// Maximum number of transfers per batch
    pub outgoing_tx_batch_size: u32,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            bridge_id: "peggy-bridge".to_string(),
            bridge_contract_address: EthAddress::ZERO,
            bridge_chain_id: 1,
            bridge_contract_start_height: 0,
            signed_valsets_window: 10_000,
            signed_batches_window: 10_000,
            signed_claims_window: 10_000,
            target_batch_timeout: 43_200_000,
            average_block_time: 5_000,
            average_ethereum_block_time: 15_000,
            slash_fraction_valset: Decimal::permille(1),
            slash_fraction_batch: Decimal::permille(1),
            slash_fraction_claim: Decimal::permille(1),
            slash_fraction_conflicting_claim: Decimal::permille(1),
            slash_fraction_bad_eth_signature: Decimal::permille(1),
            unbond_slashing_valsets_window: 10_000,
            claim_slashing_enabled: false,
            valset_reward: common::Coin256::new(0u128, ""),
            outgoing_tx_batch_size: 100,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.bridge_id.is_empty() || self.bridge_id.len() > 32 {
            return Err(ContractError::InvalidParams(
                "bridge_id must be 1 to 32 bytes".to_string(),
            ));
        }
        if self.average_block_time == 0 || self.average_ethereum_block_time == 0 {
            return Err(ContractError::InvalidParams(
                "average block times must be non-zero".to_string(),
            ));
        }
        if self.signed_valsets_window == 0
            || self.signed_batches_window == 0
            || self.signed_claims_window == 0
        {
            return Err(ContractError::InvalidParams(
                "signing windows must be non-zero".to_string(),
            ));
        }
        let fractions = [
            ("slash_fraction_valset", self.slash_fraction_valset),
            ("slash_fraction_batch", self.slash_fraction_batch),
            ("slash_fraction_claim", self.slash_fraction_claim),
            (
                "slash_fraction_conflicting_claim",
                self.slash_fraction_conflicting_claim,
            ),
            (
                "slash_fraction_bad_eth_signature",
                self.slash_fraction_bad_eth_signature,
            ),
        ];
        for (name, fraction) in fractions {
            if fraction > Decimal::one() {
                return Err(ContractError::InvalidParams(format!(
                    "{} must not exceed 1",
                    name
                )));
            }
        }
        if self.outgoing_tx_batch_size == 0 {
            return Err(ContractError::InvalidParams(
                "outgoing_tx_batch_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Validator Set Snapshots
// ============================================================================

/// One member of a snapshot
#[cw_serde]
pub struct BridgeValidator {
    /// Normalized weight, out of 2^32 - 1
    pub power: u64,
    pub ethereum_address: EthAddress,
}

/// Validator set snapshot signed for the counterparty contract
#[cw_serde]
pub struct Valset {
    /// Equal to the chain height the snapshot was taken at
    pub nonce: u64,
    pub members: Vec<BridgeValidator>,
    pub height: u64,
    pub reward_amount: Uint256,
    /// Zero address when no reward is attached
    pub reward_token: EthAddress,
}

/// A validator's signature over a snapshot checkpoint
#[cw_serde]
pub struct ValsetConfirm {
    pub nonce: u64,
    pub validator: Addr,
    pub orchestrator: Addr,
    pub eth_address: EthAddress,
    pub signature: Binary,
}

// ============================================================================
// Outgoing Transfers and Batches
// ============================================================================

/// Amount of a counterparty token
#[cw_serde]
pub struct Erc20Token {
    pub contract: EthAddress,
    pub amount: Uint256,
}

/// A pending withdrawal to the counterparty
#[cw_serde]
pub struct OutgoingTransferTx {
    pub id: u64,
    pub sender: Addr,
    pub dest_address: EthAddress,
    pub erc20_token: Erc20Token,
    pub erc20_fee: Erc20Token,
}

/// A bundle of withdrawals for a single token contract
#[cw_serde]
pub struct OutgoingTxBatch {
    pub batch_nonce: u64,
    /// Counterparty height after which the batch can no longer execute (0 = none yet)
    pub batch_timeout: u64,
    pub transactions: Vec<OutgoingTransferTx>,
    pub token_contract: EthAddress,
    /// Chain height the batch was created at
    pub block: u64,
}

impl OutgoingTxBatch {
    /// Total fee paid by the batch's transfers
    pub fn fees(&self) -> StdResult<Uint256> {
        let total = self
            .transactions
            .iter()
            .try_fold(Uint256::zero(), |acc, tx| acc.checked_add(tx.erc20_fee.amount))?;
        Ok(total)
    }
}

/// A validator's signature over a batch checkpoint
#[cw_serde]
pub struct BatchConfirm {
    pub nonce: u64,
    pub token_contract: EthAddress,
    pub validator: Addr,
    pub orchestrator: Addr,
    pub eth_signer: EthAddress,
    pub signature: Binary,
}

// ============================================================================
// Attestations
// ============================================================================

/// Votes gathered for one (event nonce, claim hash) pair
#[cw_serde]
pub struct Attestation {
    pub observed: bool,
    /// Chain height the first vote arrived at
    pub height: u64,
    /// Validator operators that voted, in arrival order
    pub votes: Vec<Addr>,
    pub claim: Claim,
}

/// Last claim a validator submitted
#[cw_serde]
#[derive(Default)]
pub struct LastClaimEvent {
    pub ethereum_event_nonce: u64,
    pub ethereum_event_height: u64,
}

/// Counterparty height last learned from an observed claim, with the chain
/// height it was learned at
#[cw_serde]
#[derive(Default)]
pub struct LastObservedEthereumBlockHeight {
    pub cosmos_block_height: u64,
    pub ethereum_block_height: u64,
}

// ============================================================================
// Storage
// ============================================================================

/// Module parameters
pub const PARAMS: Item<Params> = Item::new("\x1c");

/// Key delegation: Key = validator operator, Value = counterparty signing address
pub const VALIDATOR_ETH_ADDRESS: Map<&Addr, EthAddress> = Map::new("\x01");

/// Key delegation: Key = counterparty address bytes (20), Value = validator operator
pub const ETH_ADDRESS_VALIDATOR: Map<&[u8], Addr> = Map::new("\x0f");

/// Key delegation: Key = orchestrator account, Value = validator operator
pub const ORCHESTRATOR_VALIDATOR: Map<&Addr, Addr> = Map::new("\x0d");

/// Key delegation: Key = validator operator, Value = orchestrator account
pub const VALIDATOR_ORCHESTRATOR: Map<&Addr, Addr> = Map::new("\x0e");

/// Snapshots: Key = nonce
pub const VALSETS: Map<u64, Valset> = Map::new("\x02");

/// Snapshot signatures: Key = (nonce, validator operator)
pub const VALSET_CONFIRMS: Map<(u64, &Addr), ValsetConfirm> = Map::new("\x03");

/// Attestations: Key = (event nonce, claim hash)
pub const ATTESTATIONS: Map<(u64, &[u8]), Attestation> = Map::new("\x05");

/// Unbatched pool entries: Key = transfer id
pub const OUTGOING_POOL: Map<u64, OutgoingTransferTx> = Map::new("\x06");

/// Last allocated transfer id
pub const LAST_TX_POOL_ID: Item<u64> = Item::new("\x07");

/// Last allocated batch nonce
pub const LAST_BATCH_NONCE: Item<u64> = Item::new("\x08");

/// Fee index: Key = (token contract bytes, 32-byte big-endian fee), Value = transfer ids in priority order
pub const FEE_INDEX: Map<(&[u8], &[u8]), Vec<u64>> = Map::new("\x09");

/// Batches: Key = (token contract bytes, batch nonce)
pub const BATCHES: Map<(&[u8], u64), OutgoingTxBatch> = Map::new("\x0a");

/// Batch block index: Key = (creation block, token contract bytes, batch nonce)
pub const BATCH_BLOCK_INDEX: Map<(u64, &[u8], u64), Empty> = Map::new("\x0b");

/// Batch signatures: Key = (token contract bytes, batch nonce, validator operator)
pub const BATCH_CONFIRMS: Map<(&[u8], u64, &Addr), BatchConfirm> = Map::new("\x0c");

/// Key = validator operator, Value = last claim it submitted
pub const LAST_EVENT_BY_VALIDATOR: Map<&Addr, LastClaimEvent> = Map::new("\x10");

/// Highest event nonce applied to chain state
pub const LAST_OBSERVED_EVENT_NONCE: Item<u64> = Item::new("\x11");

/// Denom registry: Key = chain denom, Value = counterparty contract
pub const DENOM_TO_ERC20: Map<&str, EthAddress> = Map::new("\x12");

/// Denom registry: Key = counterparty contract bytes, Value = chain denom
pub const ERC20_TO_DENOM: Map<&[u8], String> = Map::new("\x13");

pub const LAST_SLASHED_VALSET_NONCE: Item<u64> = Item::new("\x14");

pub const LATEST_VALSET_NONCE: Item<u64> = Item::new("\x15");

pub const LAST_SLASHED_BATCH_BLOCK: Item<u64> = Item::new("\x16");

/// Chain height at which a validator last began unbonding
pub const LAST_UNBONDING_BLOCK_HEIGHT: Item<u64> = Item::new("\x17");

pub const LAST_OBSERVED_ETH_HEIGHT: Item<LastObservedEthereumBlockHeight> = Item::new("\x18");

/// Snapshot the counterparty last reported as accepted
pub const LAST_OBSERVED_VALSET: Item<Valset> = Item::new("\x19");

/// Highest event nonce the claim slashing pass has finished with
pub const LAST_SLASHED_CLAIM_NONCE: Item<u64> = Item::new("\x1a");

/// Presence set of every checkpoint the chain produced
pub const PAST_CHECKPOINTS: Map<&[u8], Empty> = Map::new("\x1b");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        Params::default().validate().unwrap();
    }

    #[test]
    fn test_params_validation() {
        let mut params = Params {
            bridge_id: "x".repeat(33),
            ..Params::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ContractError::InvalidParams(_))
        ));

        params.bridge_id = "peggy".to_string();
        params.average_ethereum_block_time = 0;
        assert!(params.validate().is_err());

        params.average_ethereum_block_time = 15_000;
        params.slash_fraction_batch = Decimal::percent(101);
        assert!(params.validate().is_err());

        params.slash_fraction_batch = Decimal::one();
        params.validate().unwrap();
    }

    #[test]
    fn test_batch_fees() {
        let contract = EthAddress([1u8; 20]);
        let tx = |id: u64, fee: u64| OutgoingTransferTx {
            id,
            sender: Addr::unchecked("sender"),
            dest_address: EthAddress([2u8; 20]),
            erc20_token: Erc20Token {
                contract,
                amount: Uint256::from(10u64),
            },
            erc20_fee: Erc20Token {
                contract,
                amount: Uint256::from(fee),
            },
        };
        let batch = OutgoingTxBatch {
            batch_nonce: 1,
            batch_timeout: 0,
            transactions: vec![tx(1, 3), tx(2, 2)],
            token_contract: contract,
            block: 1,
        };
        assert_eq!(batch.fees().unwrap(), Uint256::from(5u64));

        let mut whale = tx(3, 0);
        whale.erc20_fee.amount = Uint256::MAX;
        let overflowing = OutgoingTxBatch {
            transactions: vec![tx(1, 3), whale],
            ..batch
        };
        assert!(overflowing.fees().is_err());
    }
}
