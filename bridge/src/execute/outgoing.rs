//! Withdrawals to the counterparty and batch requests

use common::{Coin256, EthAddress};
use cosmwasm_std::{Env, MessageInfo, Response};

use crate::batch::build_outgoing_batch;
use crate::denom::denom_to_erc20;
use crate::deps::BridgeDeps;
use crate::error::ContractError;
use crate::events;
use crate::pool::{add_to_outgoing_pool, remove_from_outgoing_pool_and_refund};
use crate::state::PARAMS;

/// Queue a withdrawal, taking `amount + bridge_fee` from the sender
pub fn execute_send_to_eth(
    deps: BridgeDeps,
    info: &MessageInfo,
    eth_dest: EthAddress,
    amount: Coin256,
    bridge_fee: Coin256,
) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let tx = add_to_outgoing_pool(deps, &info.sender, eth_dest, &amount, &bridge_fee)?;

    Ok(Response::new()
        .add_attribute("action", "send_to_eth")
        .add_attribute("tx_id", tx.id.to_string())
        .add_event(events::withdraw_enqueued(&params, &tx)))
}

/// Refund an unbatched withdrawal to its sender
pub fn execute_cancel_send_to_eth(
    deps: BridgeDeps,
    info: &MessageInfo,
    transaction_id: u64,
) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let tx = remove_from_outgoing_pool_and_refund(deps, transaction_id, &info.sender)?;

    Ok(Response::new()
        .add_attribute("action", "cancel_send_to_eth")
        .add_attribute("tx_id", tx.id.to_string())
        .add_event(events::withdraw_cancelled(&params, &tx)))
}

/// Build a batch for the contract behind `denom`; anyone may ask
pub fn execute_request_batch(
    deps: BridgeDeps,
    env: &Env,
    denom: String,
) -> Result<Response, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let (_, token_contract) = denom_to_erc20(deps.storage, &denom)?;
    let batch = build_outgoing_batch(
        deps.storage,
        &params,
        env.block.height,
        token_contract,
        params.outgoing_tx_batch_size as usize,
    )?;

    Ok(Response::new()
        .add_attribute("action", "request_batch")
        .add_attribute("batch_nonce", batch.batch_nonce.to_string())
        .add_event(events::batch_created(&params, &batch)))
}
