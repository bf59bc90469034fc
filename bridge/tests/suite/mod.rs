//! Shared fixture for the integration tests.
//!
//! Host modules are mocked on top of the same `MockStorage` the bridge runs
//! against, under namespaces the bridge never uses. A failing message
//! therefore rolls back mock balances and slashes together with bridge state.

#![allow(dead_code)]

use common::{Coin256, EthAddress};
use cosmwasm_schema::cw_serde;
use cosmwasm_std::testing::{mock_env, MockApi, MockStorage};
use cosmwasm_std::{from_json, Addr, Binary, Decimal, Env, MessageInfo, Response, StdResult, Storage, Uint256};
use cw_storage_plus::Map;
use k256::ecdsa::SigningKey;
use serde::de::DeserializeOwned;

use peggy::claims::{Claim, DepositClaim, WithdrawClaim};
use peggy::contract;
use peggy::denom::voucher_denom;
use peggy::error::ContractError;
use peggy::keepers::{
    AccountKeeper, BankKeeper, BondStatus, DenomMetadata, SigningInfo, SlashingKeeper,
    StakingKeeper, Validator,
};
use peggy::msg::{ExecuteMsg, InstantiateMsg, QueryMsg};
use peggy::signature::personal_sign_hash;
use peggy::state::{OutgoingTxBatch, Params, Valset, PARAMS};
use peggy::{batch_checkpoint, delegate_keys_sign_bytes, keccak256, valset_checkpoint};
use peggy::{BridgeDeps, BridgeRef, Keepers};

// ============================================================================
// Mock Host Modules
// ============================================================================

#[cw_serde]
pub struct SlashRecord {
    pub infraction_height: u64,
    pub power: u64,
    pub fraction: Decimal,
}

const VALIDATORS: Map<&Addr, Validator> = Map::new("mock_staking_validators");
const SLASHES: Map<&Addr, Vec<SlashRecord>> = Map::new("mock_staking_slashes");
const BALANCES: Map<(&str, &str), Uint256> = Map::new("mock_bank_balances");
const SUPPLY: Map<&str, Uint256> = Map::new("mock_bank_supply");
const METADATA: Map<&str, DenomMetadata> = Map::new("mock_bank_metadata");
const SIGNING_INFO: Map<&Addr, SigningInfo> = Map::new("mock_slashing_signing_info");
const SEQUENCES: Map<&Addr, u64> = Map::new("mock_account_sequences");

fn module_account(module: &str) -> String {
    format!("module/{}", module)
}

fn all_validators(storage: &dyn Storage) -> StdResult<Vec<Validator>> {
    VALIDATORS
        .range(storage, None, None, cosmwasm_std::Order::Ascending)
        .map(|entry| entry.map(|(_, val)| val))
        .collect()
}

pub struct MockStaking;

impl StakingKeeper for MockStaking {
    fn bonded_validators_by_power(&self, storage: &dyn Storage) -> StdResult<Vec<Validator>> {
        let mut bonded: Vec<Validator> = all_validators(storage)?
            .into_iter()
            .filter(|val| val.is_bonded())
            .collect();
        bonded.sort_by(|a, b| b.power.cmp(&a.power).then_with(|| a.operator.cmp(&b.operator)));
        Ok(bonded)
    }

    fn validator(&self, storage: &dyn Storage, operator: &Addr) -> StdResult<Option<Validator>> {
        VALIDATORS.may_load(storage, operator)
    }

    fn last_validator_power(&self, storage: &dyn Storage, operator: &Addr) -> StdResult<u64> {
        Ok(VALIDATORS
            .may_load(storage, operator)?
            .filter(|val| val.is_bonded())
            .map(|val| val.power)
            .unwrap_or(0))
    }

    fn last_total_power(&self, storage: &dyn Storage) -> StdResult<u64> {
        Ok(all_validators(storage)?
            .iter()
            .filter(|val| val.is_bonded())
            .map(|val| val.power)
            .sum())
    }

    fn unbonding_validators(&self, storage: &dyn Storage) -> StdResult<Vec<Validator>> {
        Ok(all_validators(storage)?
            .into_iter()
            .filter(|val| val.is_unbonding())
            .collect())
    }

    fn slash(
        &self,
        storage: &mut dyn Storage,
        operator: &Addr,
        infraction_height: u64,
        power: u64,
        fraction: Decimal,
    ) -> StdResult<()> {
        let mut records = SLASHES.may_load(storage, operator)?.unwrap_or_default();
        records.push(SlashRecord {
            infraction_height,
            power,
            fraction,
        });
        SLASHES.save(storage, operator, &records)
    }

    fn jail(&self, storage: &mut dyn Storage, operator: &Addr) -> StdResult<()> {
        VALIDATORS.update(storage, operator, |val| match val {
            Some(mut val) => {
                val.jailed = true;
                Ok(val)
            }
            None => Err(cosmwasm_std::StdError::not_found("validator")),
        })?;
        Ok(())
    }
}

pub struct MockBank;

impl MockBank {
    fn sub_balance(
        storage: &mut dyn Storage,
        account: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError> {
        let balance = BALANCES.may_load(storage, (account, denom))?.unwrap_or_default();
        if balance < amount {
            return Err(ContractError::InsufficientFunds {
                denom: denom.to_string(),
                balance,
                required: amount,
            });
        }
        BALANCES.save(storage, (account, denom), &(balance - amount))?;
        Ok(())
    }

    fn add_balance(
        storage: &mut dyn Storage,
        account: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError> {
        let balance = BALANCES.may_load(storage, (account, denom))?.unwrap_or_default();
        BALANCES.save(storage, (account, denom), &(balance + amount))?;
        Ok(())
    }
}

impl BankKeeper for MockBank {
    fn send_from_account_to_module(
        &self,
        storage: &mut dyn Storage,
        sender: &Addr,
        module: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError> {
        Self::sub_balance(storage, sender.as_str(), denom, amount)?;
        Self::add_balance(storage, &module_account(module), denom, amount)
    }

    fn send_from_module_to_account(
        &self,
        storage: &mut dyn Storage,
        module: &str,
        recipient: &Addr,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError> {
        Self::sub_balance(storage, &module_account(module), denom, amount)?;
        Self::add_balance(storage, recipient.as_str(), denom, amount)
    }

    fn mint(
        &self,
        storage: &mut dyn Storage,
        module: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError> {
        let supply = SUPPLY.may_load(storage, denom)?.unwrap_or_default();
        let supply = supply.checked_add(amount).map_err(|_| ContractError::SupplyOverflow {
            denom: denom.to_string(),
            amount,
        })?;
        SUPPLY.save(storage, denom, &supply)?;
        Self::add_balance(storage, &module_account(module), denom, amount)
    }

    fn burn(
        &self,
        storage: &mut dyn Storage,
        module: &str,
        denom: &str,
        amount: Uint256,
    ) -> Result<(), ContractError> {
        Self::sub_balance(storage, &module_account(module), denom, amount)?;
        let supply = SUPPLY.may_load(storage, denom)?.unwrap_or_default();
        SUPPLY.save(storage, denom, &supply.saturating_sub(amount))?;
        Ok(())
    }

    fn supply(&self, storage: &dyn Storage, denom: &str) -> StdResult<Uint256> {
        Ok(SUPPLY.may_load(storage, denom)?.unwrap_or_default())
    }

    fn denom_metadata(&self, storage: &dyn Storage, denom: &str) -> StdResult<Option<DenomMetadata>> {
        METADATA.may_load(storage, denom)
    }
}

pub struct MockSlashing;

impl SlashingKeeper for MockSlashing {
    fn signing_info(&self, storage: &dyn Storage, operator: &Addr) -> StdResult<Option<SigningInfo>> {
        SIGNING_INFO.may_load(storage, operator)
    }
}

pub struct MockAccount;

impl AccountKeeper for MockAccount {
    fn sequence(&self, storage: &dyn Storage, account: &Addr) -> StdResult<u64> {
        Ok(SEQUENCES.may_load(storage, account)?.unwrap_or(0))
    }
}

pub fn keepers() -> Keepers<'static> {
    Keepers {
        staking: &MockStaking,
        bank: &MockBank,
        slashing: &MockSlashing,
        account: &MockAccount,
    }
}

// ============================================================================
// Keys
// ============================================================================

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

pub fn eth_address_of(key: &SigningKey) -> EthAddress {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    EthAddress::from_slice(&hash[12..]).unwrap()
}

/// personal_sign style signature over `hash`, with a 27/28 recovery byte
pub fn eth_sign(key: &SigningKey, hash: &[u8; 32]) -> Binary {
    let (sig, recid) = key
        .sign_prehash_recoverable(&personal_sign_hash(hash))
        .unwrap();
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(recid.to_byte() + 27);
    Binary::from(bytes)
}

pub struct TestValidator {
    pub operator: Addr,
    pub orchestrator: Addr,
    pub key: SigningKey,
    pub eth_address: EthAddress,
}

// ============================================================================
// Suite
// ============================================================================

pub const POWER: u64 = 20;
pub const TOKEN: EthAddress = EthAddress([0xaa; 20]);
pub const BRIDGE_CONTRACT: EthAddress = EthAddress([0xbb; 20]);

pub fn test_params() -> Params {
    Params {
        bridge_id: "peggy-test".to_string(),
        bridge_contract_address: BRIDGE_CONTRACT,
        signed_valsets_window: 50,
        signed_batches_window: 50,
        signed_claims_window: 50,
        ..Params::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Suite {
    pub storage: MockStorage,
    pub api: MockApi,
    pub height: u64,
    pub validators: Vec<TestValidator>,
}

impl Suite {
    /// Five bonded validators of power 20 with registered keys
    pub fn new() -> Self {
        Self::with_params(test_params())
    }

    pub fn with_params(params: Params) -> Self {
        Self::with_powers(params, &[POWER; 5])
    }

    pub fn with_powers(params: Params, powers: &[u64]) -> Self {
        init_tracing();
        let mut suite = Suite {
            storage: MockStorage::new(),
            api: MockApi::default(),
            height: 10,
            validators: Vec::new(),
        };
        let env = suite.env();
        let info = MessageInfo {
            sender: Addr::unchecked("creator"),
            funds: vec![],
        };
        contract::instantiate(suite.deps(), env, info, InstantiateMsg { params }).unwrap();
        for power in powers {
            suite.add_validator(*power);
        }
        suite
    }

    pub fn deps(&mut self) -> BridgeDeps<'_> {
        BridgeDeps {
            storage: &mut self.storage,
            api: &self.api,
            keepers: keepers(),
        }
    }

    pub fn as_ref(&self) -> BridgeRef<'_> {
        BridgeRef {
            storage: &self.storage,
            api: &self.api,
            keepers: keepers(),
        }
    }

    pub fn env(&self) -> Env {
        let mut env = mock_env();
        env.block.height = self.height;
        env
    }

    pub fn params(&self) -> Params {
        PARAMS.load(&self.storage).unwrap()
    }

    pub fn update_params(&mut self, update: impl FnOnce(&mut Params)) {
        let mut params = self.params();
        update(&mut params);
        PARAMS.save(&mut self.storage, &params).unwrap();
    }

    // ------------------------------------------------------------------------
    // Staking
    // ------------------------------------------------------------------------

    /// Bond a new validator and register its delegate keys
    pub fn add_validator(&mut self, power: u64) -> usize {
        let index = self.validators.len();
        let operator = Addr::unchecked(format!("valoper{}", index + 1));
        let orchestrator = Addr::unchecked(format!("orchestrator{}", index + 1));
        let key = signing_key(index as u8 + 1);
        let eth_address = eth_address_of(&key);

        self.set_validator(Validator {
            operator: operator.clone(),
            power,
            status: BondStatus::Bonded,
            jailed: false,
            unbonding_height: 0,
        });
        self.set_start_height(&operator, 1);
        SEQUENCES.save(&mut self.storage, &operator, &1).unwrap();

        let signature = eth_sign(&key, &delegate_keys_sign_bytes(operator.as_str(), 0));
        self.execute(
            &operator,
            ExecuteMsg::SetOrchestratorAddresses {
                orchestrator: Some(orchestrator.to_string()),
                eth_address,
                eth_signature: signature,
            },
        )
        .unwrap();

        self.validators.push(TestValidator {
            operator,
            orchestrator,
            key,
            eth_address,
        });
        index
    }

    pub fn set_validator(&mut self, validator: Validator) {
        VALIDATORS.save(&mut self.storage, &validator.operator.clone(), &validator).unwrap();
    }

    pub fn validator(&self, index: usize) -> Validator {
        VALIDATORS.load(&self.storage, &self.validators[index].operator).unwrap()
    }

    pub fn set_power(&mut self, index: usize, power: u64) {
        let mut val = self.validator(index);
        val.power = power;
        self.set_validator(val);
    }

    pub fn set_start_height(&mut self, operator: &Addr, start_height: u64) {
        SIGNING_INFO
            .save(&mut self.storage, operator, &SigningInfo { start_height })
            .unwrap();
    }

    pub fn set_sequence(&mut self, account: &Addr, sequence: u64) {
        SEQUENCES.save(&mut self.storage, account, &sequence).unwrap();
    }

    pub fn slashes(&self, index: usize) -> Vec<SlashRecord> {
        SLASHES
            .may_load(&self.storage, &self.validators[index].operator)
            .unwrap()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Bank
    // ------------------------------------------------------------------------

    pub fn fund(&mut self, account: &Addr, denom: &str, amount: u128) {
        let amount = Uint256::from(amount);
        MockBank::add_balance(&mut self.storage, account.as_str(), denom, amount).unwrap();
        let supply = SUPPLY.may_load(&self.storage, denom).unwrap().unwrap_or_default();
        SUPPLY.save(&mut self.storage, denom, &(supply + amount)).unwrap();
    }

    pub fn balance(&self, account: &Addr, denom: &str) -> Uint256 {
        BALANCES
            .may_load(&self.storage, (account.as_str(), denom))
            .unwrap()
            .unwrap_or_default()
    }

    pub fn module_balance(&self, denom: &str) -> Uint256 {
        BALANCES
            .may_load(&self.storage, (module_account("peggy").as_str(), denom))
            .unwrap()
            .unwrap_or_default()
    }

    pub fn supply(&self, denom: &str) -> Uint256 {
        SUPPLY.may_load(&self.storage, denom).unwrap().unwrap_or_default()
    }

    pub fn set_supply(&mut self, denom: &str, amount: Uint256) {
        SUPPLY.save(&mut self.storage, denom, &amount).unwrap();
    }

    pub fn set_metadata(&mut self, metadata: DenomMetadata) {
        METADATA.save(&mut self.storage, &metadata.base.clone(), &metadata).unwrap();
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    pub fn execute(&mut self, sender: &Addr, msg: ExecuteMsg) -> Result<Response, ContractError> {
        let env = self.env();
        let info = MessageInfo {
            sender: sender.clone(),
            funds: vec![],
        };
        contract::execute(self.deps(), env, info, msg)
    }

    pub fn query<T: DeserializeOwned>(&self, msg: QueryMsg) -> T {
        from_json(contract::query(self.as_ref(), self.env(), msg).unwrap()).unwrap()
    }

    /// Run the block-end pipeline for the current height and move to the next block
    pub fn end_block(&mut self) -> Response {
        let env = self.env();
        let response = contract::end_block(self.deps(), env).unwrap();
        self.height += 1;
        response
    }

    /// Run end blocks until the current height is `height`
    pub fn advance_to(&mut self, height: u64) -> Vec<Response> {
        let mut responses = Vec::new();
        while self.height < height {
            responses.push(self.end_block());
        }
        responses
    }

    pub fn submit_claim(&mut self, index: usize, claim: &Claim) -> Result<Response, ContractError> {
        let orchestrator = self.validators[index].orchestrator.clone();
        self.execute(
            &orchestrator,
            ExecuteMsg::SubmitClaim {
                claim: claim.clone(),
            },
        )
    }

    /// Submit `claim` from each listed validator, panicking on rejection
    pub fn vote(&mut self, voters: &[usize], claim: &Claim) {
        for index in voters {
            self.submit_claim(*index, claim).unwrap();
        }
    }

    pub fn confirm_valset(&mut self, index: usize, valset: &Valset) -> Result<Response, ContractError> {
        let checkpoint = valset_checkpoint(&self.params().bridge_id, valset);
        let val = &self.validators[index];
        let signature = eth_sign(&val.key, &checkpoint);
        let (orchestrator, eth_address) = (val.orchestrator.clone(), val.eth_address);
        self.execute(
            &orchestrator,
            ExecuteMsg::ValsetConfirm {
                nonce: valset.nonce,
                eth_address,
                signature,
            },
        )
    }

    pub fn confirm_batch(&mut self, index: usize, batch: &OutgoingTxBatch) -> Result<Response, ContractError> {
        let checkpoint = batch_checkpoint(&self.params().bridge_id, batch);
        let val = &self.validators[index];
        let signature = eth_sign(&val.key, &checkpoint);
        let (orchestrator, eth_signer) = (val.orchestrator.clone(), val.eth_address);
        self.execute(
            &orchestrator,
            ExecuteMsg::ConfirmBatch {
                nonce: batch.batch_nonce,
                token_contract: batch.token_contract,
                eth_signer,
                signature,
            },
        )
    }

    pub fn send_to_eth(
        &mut self,
        sender: &Addr,
        denom: &str,
        amount: u128,
        fee: u128,
    ) -> Result<Response, ContractError> {
        self.execute(
            sender,
            ExecuteMsg::SendToEth {
                eth_dest: EthAddress([0x0d; 20]),
                amount: Coin256::new(amount, denom),
                bridge_fee: Coin256::new(fee, denom),
            },
        )
    }

    pub fn request_batch(&mut self, denom: &str) -> Result<Response, ContractError> {
        self.execute(
            &Addr::unchecked("relayer"),
            ExecuteMsg::RequestBatch {
                denom: denom.to_string(),
            },
        )
    }

    pub fn check_indexes(&self) {
        contract::check_index_consistency(&self.storage).unwrap();
    }
}

// ============================================================================
// Claims and Responses
// ============================================================================

pub fn token_denom() -> String {
    voucher_denom(&TOKEN)
}

pub fn deposit(event_nonce: u64, block_height: u64, amount: u128, receiver: &str) -> Claim {
    Claim::Deposit(DepositClaim {
        event_nonce,
        block_height,
        token_contract: TOKEN,
        amount: Uint256::from(amount),
        ethereum_sender: EthAddress([0x0e; 20]),
        cosmos_receiver: receiver.to_string(),
    })
}

pub fn withdraw(event_nonce: u64, block_height: u64, token_contract: EthAddress, batch_nonce: u64) -> Claim {
    Claim::Withdraw(WithdrawClaim {
        event_nonce,
        block_height,
        batch_nonce,
        token_contract,
    })
}

pub fn events_of<'a>(response: &'a Response, kind: &str) -> Vec<&'a cosmwasm_std::Event> {
    response.events.iter().filter(|event| event.ty == kind).collect()
}

pub fn attr<'a>(event: &'a cosmwasm_std::Event, key: &str) -> &'a str {
    event
        .attributes
        .iter()
        .find(|attr| attr.key == key)
        .map(|attr| attr.value.as_str())
        .unwrap()
}
