//! Outgoing transfer pool
//!
//! Transfers are stored by id in `OUTGOING_POOL` until their batch executes.
//! While unbatched, each id also sits in `FEE_INDEX` under
//! (token contract, 32-byte big-endian fee), so a descending scan of one
//! contract's index yields transfers by fee, oldest first within a fee.

use common::{Coin256, EthAddress};
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Order, StdResult, Storage, Uint256};

use crate::denom::{denom_to_erc20, erc20_to_denom};
use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::state::{
    Erc20Token, OutgoingTransferTx, FEE_INDEX, LAST_TX_POOL_ID, MODULE_NAME, OUTGOING_POOL,
};

/// Fee totals of the best batch that could be built right now for a contract
#[cw_serde]
pub struct BatchFees {
    pub token: EthAddress,
    pub total_fees: Uint256,
    pub tx_count: u64,
}

/// Big-endian fee bytes used as the second fee-index key part
pub fn fee_key(fee: &Uint256) -> [u8; 32] {
    fee.to_be_bytes()
}

// ============================================================================
// Enqueue / Cancel
// ============================================================================

/// Lock or burn `amount + fee` from the sender and queue the transfer
pub fn add_to_outgoing_pool(
    deps: BridgeDeps,
    sender: &Addr,
    dest_address: EthAddress,
    amount: &Coin256,
    fee: &Coin256,
) -> Result<OutgoingTransferTx, ContractError> {
    if amount.denom != fee.denom {
        return Err(ContractError::invalid(format!(
            "fee denom {} differs from amount denom {}",
            fee.denom, amount.denom
        )));
    }
    if amount.amount.is_zero() || fee.amount.is_zero() {
        return Err(ContractError::invalid("amount and fee must be non-zero"));
    }
    let total = amount
        .amount
        .checked_add(fee.amount)
        .map_err(|e| ContractError::invalid(e.to_string()))?;

    let (origin, contract) = denom_to_erc20(deps.storage, &amount.denom)?;

    let bank = deps.keepers.bank;
    bank.send_from_account_to_module(deps.storage, sender, MODULE_NAME, &amount.denom, total)?;
    if !origin.is_cosmos() {
        bank.burn(deps.storage, MODULE_NAME, &amount.denom, total)?;
    }

    let id = LAST_TX_POOL_ID.may_load(deps.storage)?.unwrap_or(0) + 1;
    LAST_TX_POOL_ID.save(deps.storage, &id)?;

    let tx = OutgoingTransferTx {
        id,
        sender: sender.clone(),
        dest_address,
        erc20_token: Erc20Token {
            contract,
            amount: amount.amount,
        },
        erc20_fee: Erc20Token {
            contract,
            amount: fee.amount,
        },
    };
    OUTGOING_POOL.save(deps.storage, id, &tx)?;
    append_to_fee_index(deps.storage, &contract, &fee.amount, id)?;

    Ok(tx)
}

/// Remove an unbatched transfer and give the sender back `amount + fee`
pub fn remove_from_outgoing_pool_and_refund(
    deps: BridgeDeps,
    tx_id: u64,
    sender: &Addr,
) -> Result<OutgoingTransferTx, ContractError> {
    let tx = OUTGOING_POOL
        .may_load(deps.storage, tx_id)?
        .ok_or_else(|| ContractError::unknown(format!("pool transaction {}", tx_id)))?;

    if &tx.sender != sender {
        return Err(ContractError::invalid(format!(
            "sender {} did not send transaction {}",
            sender, tx_id
        )));
    }
    if tx.erc20_token.contract != tx.erc20_fee.contract {
        return Err(ContractError::invalid(format!(
            "inconsistent token and fee contracts in transaction {}",
            tx_id
        )));
    }

    // only unbatched transfers are in the fee index
    remove_from_fee_index(deps.storage, &tx.erc20_fee.contract, &tx.erc20_fee.amount, tx_id)?;
    OUTGOING_POOL.remove(deps.storage, tx_id);

    let (origin, denom) = erc20_to_denom(deps.storage, &tx.erc20_token.contract)?;
    let total = tx
        .erc20_token
        .amount
        .checked_add(tx.erc20_fee.amount)
        .map_err(|e| ContractError::invalid(e.to_string()))?;

    let bank = deps.keepers.bank;
    if !origin.is_cosmos() {
        bank.mint(deps.storage, MODULE_NAME, &denom, total)?;
    }
    bank.send_from_module_to_account(deps.storage, MODULE_NAME, sender, &denom, total)?;

    Ok(tx)
}

// ============================================================================
// Fee Index
// ============================================================================

pub fn append_to_fee_index(
    storage: &mut dyn Storage,
    contract: &EthAddress,
    fee: &Uint256,
    id: u64,
) -> StdResult<()> {
    let fee_bytes = fee_key(fee);
    let key = (contract.as_bytes().as_slice(), fee_bytes.as_slice());
    let mut ids = FEE_INDEX.may_load(storage, key)?.unwrap_or_default();
    ids.push(id);
    FEE_INDEX.save(storage, key, &ids)
}

/// Put `id` ahead of every transfer already waiting at the same fee
pub fn prepend_to_fee_index(
    storage: &mut dyn Storage,
    contract: &EthAddress,
    fee: &Uint256,
    id: u64,
) -> StdResult<()> {
    let fee_bytes = fee_key(fee);
    let key = (contract.as_bytes().as_slice(), fee_bytes.as_slice());
    let mut ids = FEE_INDEX.may_load(storage, key)?.unwrap_or_default();
    ids.insert(0, id);
    FEE_INDEX.save(storage, key, &ids)
}

pub fn remove_from_fee_index(
    storage: &mut dyn Storage,
    contract: &EthAddress,
    fee: &Uint256,
    id: u64,
) -> Result<(), ContractError> {
    let fee_bytes = fee_key(fee);
    let key = (contract.as_bytes().as_slice(), fee_bytes.as_slice());
    let mut ids = FEE_INDEX.may_load(storage, key)?.unwrap_or_default();
    let position = ids.iter().position(|&x| x == id).ok_or_else(|| {
        ContractError::invalid(format!("transaction {} is not in the unbatched pool", id))
    })?;
    ids.remove(position);
    if ids.is_empty() {
        FEE_INDEX.remove(storage, key);
    } else {
        FEE_INDEX.save(storage, key, &ids)?;
    }
    Ok(())
}

/// Up to `limit` unbatched transfer ids of `contract`, best fee first
pub fn top_transfer_ids(storage: &dyn Storage, contract: &EthAddress, limit: usize) -> StdResult<Vec<u64>> {
    let mut picked = Vec::new();
    if limit == 0 {
        return Ok(picked);
    }
    for entry in FEE_INDEX
        .prefix(contract.as_bytes().as_slice())
        .range(storage, None, None, Order::Descending)
    {
        let (_, ids) = entry?;
        for id in ids {
            picked.push(id);
            if picked.len() == limit {
                return Ok(picked);
            }
        }
    }
    Ok(picked)
}

/// Sum of the top `limit` unbatched fees for `contract`
pub fn hypothetical_batch_fees(
    storage: &dyn Storage,
    contract: &EthAddress,
    limit: usize,
) -> StdResult<BatchFees> {
    let mut total_fees = Uint256::zero();
    let mut tx_count = 0u64;
    for entry in FEE_INDEX
        .prefix(contract.as_bytes().as_slice())
        .range(storage, None, None, Order::Descending)
    {
        let (fee_bytes, ids) = entry?;
        let fee = uint256_from_key(&fee_bytes);
        for _ in ids {
            if tx_count as usize == limit {
                return Ok(BatchFees {
                    token: *contract,
                    total_fees,
                    tx_count,
                });
            }
            total_fees = total_fees.checked_add(fee)?;
            tx_count += 1;
        }
    }
    Ok(BatchFees {
        token: *contract,
        total_fees,
        tx_count,
    })
}

/// Best-batch fee totals for every contract with unbatched transfers, ordered by contract
pub fn all_batch_fees(storage: &dyn Storage, limit: usize) -> StdResult<Vec<BatchFees>> {
    let mut contracts: Vec<Vec<u8>> = Vec::new();
    for key in FEE_INDEX.keys(storage, None, None, Order::Ascending) {
        let (contract, _) = key?;
        if contracts.last() != Some(&contract) {
            contracts.push(contract);
        }
    }

    contracts
        .into_iter()
        .filter_map(|raw| EthAddress::from_slice(&raw).ok())
        .map(|contract| hypothetical_batch_fees(storage, &contract, limit))
        .collect()
}

/// Every unbatched transfer of `contract` in pick order
pub fn unbatched_transfers(
    storage: &dyn Storage,
    contract: &EthAddress,
) -> StdResult<Vec<OutgoingTransferTx>> {
    top_transfer_ids(storage, contract, usize::MAX)?
        .into_iter()
        .map(|id| OUTGOING_POOL.load(storage, id))
        .collect()
}

fn uint256_from_key(bytes: &[u8]) -> Uint256 {
    let mut word = [0u8; 32];
    let len = bytes.len().min(32);
    word[32 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    Uint256::from_be_bytes(word)
}
