//! Claim submission, tally and the observed-claim handlers.

mod suite;

use suite::*;
use common::EthAddress;
use cosmwasm_std::{Addr, Uint256};

use peggy::claims::{Claim, Erc20DeployedClaim};
use peggy::error::ContractError;
use peggy::keepers::{BondStatus, DenomMetadata, DenomUnit};
use peggy::msg::{DenomToErc20Response, ModuleStateResponse, QueryMsg};
use peggy::state::LastClaimEvent;

fn state(suite: &Suite) -> ModuleStateResponse {
    suite.query(QueryMsg::ModuleState {})
}

// ============================================================================
// Deposits
// ============================================================================

#[test]
fn test_deposit_observed_once_threshold_reached() {
    let mut suite = Suite::new();
    let receiver = Addr::unchecked("receiver");
    let claim = deposit(1, 10, 100, "receiver");

    suite.vote(&[0], &claim);
    let st = state(&suite);
    assert_eq!(st.attestations.len(), 1);
    assert_eq!(st.attestations[0].votes, vec![suite.validators[0].operator.clone()]);
    assert!(!st.attestations[0].observed);

    // 60 of 100 is below the 66 threshold
    suite.vote(&[1, 2], &claim);
    suite.end_block();
    let st = state(&suite);
    assert!(!st.attestations[0].observed);
    assert_eq!(st.last_observed_nonce, 0);
    assert_eq!(suite.balance(&receiver, &token_denom()), Uint256::zero());

    suite.vote(&[3], &claim);
    let response = suite.end_block();
    let observed = events_of(&response, "attestation_observed");
    assert_eq!(observed.len(), 1);
    assert_eq!(attr(observed[0], "event_nonce"), "1");

    let st = state(&suite);
    assert!(st.attestations[0].observed);
    assert_eq!(st.last_observed_nonce, 1);
    assert_eq!(st.last_observed_ethereum_height.ethereum_block_height, 10);
    assert_eq!(suite.balance(&receiver, &token_denom()), Uint256::from(100u64));
    assert_eq!(suite.supply(&token_denom()), Uint256::from(100u64));
}

#[test]
fn test_late_vote_joins_observed_attestation_without_effect() {
    let mut suite = Suite::new();
    let receiver = Addr::unchecked("receiver");
    let first = deposit(1, 10, 100, "receiver");
    let second = deposit(2, 11, 50, "receiver");

    suite.vote(&[0, 1, 2, 3], &first);
    suite.end_block();

    // a validator that already voted cannot vote on the same nonce again
    assert_eq!(
        suite.submit_claim(0, &first).unwrap_err(),
        ContractError::NonContiguousEventNonce {
            expected: 2,
            got: 1
        }
    );

    // the fifth validator has to start at nonce 1
    assert_eq!(
        suite.submit_claim(4, &second).unwrap_err(),
        ContractError::NonContiguousEventNonce {
            expected: 1,
            got: 2
        }
    );
    suite.submit_claim(4, &first).unwrap();
    suite.end_block();
    assert_eq!(suite.balance(&receiver, &token_denom()), Uint256::from(100u64));
    assert_eq!(state(&suite).attestations[0].votes.len(), 5);

    suite.vote(&[4, 0, 1, 2], &second);
    suite.end_block();
    assert_eq!(suite.balance(&receiver, &token_denom()), Uint256::from(150u64));
}

#[test]
fn test_nonce_gap_rejected() {
    let mut suite = Suite::new();
    suite.vote(&[0], &deposit(1, 10, 100, "receiver"));

    assert_eq!(
        suite.submit_claim(0, &deposit(3, 12, 100, "receiver")).unwrap_err(),
        ContractError::NonContiguousEventNonce {
            expected: 2,
            got: 3
        }
    );
    suite.submit_claim(0, &deposit(2, 11, 100, "receiver")).unwrap();
}

#[test]
fn test_exact_threshold_is_enough() {
    let mut suite = Suite::with_powers(test_params(), &[66, 34]);
    suite.vote(&[0], &deposit(1, 10, 100, "receiver"));
    suite.end_block();
    assert_eq!(state(&suite).last_observed_nonce, 1);

    let mut suite = Suite::with_powers(test_params(), &[65, 35]);
    suite.vote(&[0], &deposit(1, 10, 100, "receiver"));
    suite.end_block();
    assert_eq!(state(&suite).last_observed_nonce, 0);
}

#[test]
fn test_events_applied_in_nonce_order_within_one_block() {
    let mut suite = Suite::new();
    let receiver = Addr::unchecked("receiver");
    for nonce in 1..=3 {
        suite.vote(&[0, 1, 2, 3], &deposit(nonce, 10 + nonce, 10, "receiver"));
    }

    let response = suite.end_block();
    let nonces: Vec<&str> = events_of(&response, "attestation_observed")
        .iter()
        .map(|event| attr(event, "event_nonce"))
        .collect();
    assert_eq!(nonces, vec!["1", "2", "3"]);
    assert_eq!(suite.balance(&receiver, &token_denom()), Uint256::from(30u64));
    assert_eq!(state(&suite).last_observed_ethereum_height.ethereum_block_height, 13);
}

#[test]
fn test_conflicting_attestation_pruned_after_next_event() {
    let mut suite = Suite::new();
    let honest = deposit(1, 10, 100, "receiver");
    let forged = deposit(1, 10, 100, "attacker");

    suite.vote(&[0, 1, 2, 3], &honest);
    suite.vote(&[4], &forged);
    suite.end_block();

    let st = state(&suite);
    let at_one: Vec<_> = st
        .attestations
        .iter()
        .filter(|att| att.claim.event_nonce() == 1)
        .collect();
    assert_eq!(at_one.len(), 2);
    assert_eq!(at_one.iter().filter(|att| att.observed).count(), 1);
    assert_eq!(suite.balance(&Addr::unchecked("attacker"), &token_denom()), Uint256::zero());

    suite.vote(&[0, 1, 2, 3, 4], &deposit(2, 11, 5, "receiver"));
    suite.end_block();
    let st = state(&suite);
    assert_eq!(st.last_observed_nonce, 2);
    assert!(st.attestations.iter().all(|att| att.claim.event_nonce() == 2));
    assert_eq!(st.attestations.len(), 1);
}

#[test]
fn test_failed_handler_keeps_attestation_observed() {
    let mut suite = Suite::new();
    let receiver = Addr::unchecked("receiver");
    suite.set_supply(&token_denom(), Uint256::MAX);

    suite.vote(&[0, 1, 2, 3], &deposit(1, 10, 100, "receiver"));
    let response = suite.end_block();
    assert_eq!(events_of(&response, "attestation_observed").len(), 1);

    let st = state(&suite);
    assert_eq!(st.last_observed_nonce, 1);
    assert!(st.attestations[0].observed);
    assert_eq!(suite.balance(&receiver, &token_denom()), Uint256::zero());
    assert_eq!(suite.supply(&token_denom()), Uint256::MAX);
}

// ============================================================================
// Submission Checks
// ============================================================================

#[test]
fn test_claim_submission_checks() {
    let mut suite = Suite::new();

    let err = suite
        .execute(
            &Addr::unchecked("stranger"),
            peggy::msg::ExecuteMsg::SubmitClaim {
                claim: deposit(1, 10, 100, "receiver"),
            },
        )
        .unwrap_err();
    assert!(matches!(err, ContractError::Unknown(_)));

    let err = suite.submit_claim(0, &deposit(0, 10, 100, "receiver")).unwrap_err();
    assert!(matches!(err, ContractError::Invalid(_)));

    let err = suite.submit_claim(0, &deposit(1, 10, 0, "receiver")).unwrap_err();
    assert!(matches!(err, ContractError::Invalid(_)));

    let err = suite.submit_claim(0, &deposit(1, 10, 100, "x")).unwrap_err();
    assert!(matches!(err, ContractError::Invalid(_)));

    let mut val = suite.validator(1);
    val.status = BondStatus::Unbonded;
    suite.set_validator(val);
    let err = suite.submit_claim(1, &deposit(1, 10, 100, "receiver")).unwrap_err();
    assert!(matches!(err, ContractError::Invalid(_)));

    // rejected submissions leave nothing behind
    assert!(state(&suite).attestations.is_empty());
}

#[test]
fn test_claim_response_events() {
    let mut suite = Suite::new();
    let response = suite.submit_claim(0, &deposit(1, 10, 100, "receiver")).unwrap();

    let submitted = events_of(&response, "claim_submitted");
    assert_eq!(submitted.len(), 1);
    assert_eq!(attr(submitted[0], "claim_type"), "deposit");
    assert_eq!(attr(submitted[0], "bridge_contract"), BRIDGE_CONTRACT.to_string());
    assert_eq!(events_of(&response, "attestation_vote").len(), 1);
}

// ============================================================================
// Last Event
// ============================================================================

#[test]
fn test_last_event_starts_at_bridge_deployment() {
    let mut params = test_params();
    params.bridge_contract_start_height = 1234;
    let suite = Suite::with_params(params);

    let last: LastClaimEvent = suite.query(QueryMsg::LastEventByAddr {
        orchestrator: suite.validators[0].orchestrator.to_string(),
    });
    assert_eq!(
        last,
        LastClaimEvent {
            ethereum_event_nonce: 0,
            ethereum_event_height: 1234
        }
    );
}

#[test]
fn test_last_event_follows_submissions_and_lowest_observed() {
    let mut params = test_params();
    params.claim_slashing_enabled = true;
    let mut suite = Suite::with_params(params);

    suite.vote(&[0, 1, 2, 3, 4], &deposit(1, 10, 100, "receiver"));
    suite.end_block();
    suite.vote(&[0, 1, 2, 3, 4], &deposit(2, 17, 100, "receiver"));
    suite.end_block();

    let last: LastClaimEvent = suite.query(QueryMsg::LastEventByAddr {
        orchestrator: suite.validators[0].orchestrator.to_string(),
    });
    assert_eq!(last.ethereum_event_nonce, 2);
    assert_eq!(last.ethereum_event_height, 17);

    // a newcomer starts at the lowest observed event still stored
    let newcomer = suite.add_validator(20);
    let last: LastClaimEvent = suite.query(QueryMsg::LastEventByAddr {
        orchestrator: suite.validators[newcomer].orchestrator.to_string(),
    });
    assert_eq!(
        last,
        LastClaimEvent {
            ethereum_event_nonce: 1,
            ethereum_event_height: 10
        }
    );
}

// ============================================================================
// ERC20 Deployed
// ============================================================================

fn deployed(event_nonce: u64, denom: &str, name: &str, symbol: &str, decimals: u64) -> Claim {
    Claim::Erc20Deployed(Erc20DeployedClaim {
        event_nonce,
        block_height: 10 + event_nonce,
        cosmos_denom: denom.to_string(),
        token_contract: peggy_token(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals,
    })
}

fn peggy_token() -> EthAddress {
    EthAddress([0xcc; 20])
}

#[test]
fn test_erc20_deployed_binds_denom() {
    let mut suite = Suite::new();
    suite.set_metadata(DenomMetadata {
        base: "uatom".to_string(),
        display: "atom".to_string(),
        denom_units: vec![
            DenomUnit {
                denom: "uatom".to_string(),
                exponent: 0,
            },
            DenomUnit {
                denom: "atom".to_string(),
                exponent: 6,
            },
        ],
    });

    // wrong decimals: observed, but nothing is bound
    suite.vote(&[0, 1, 2, 3], &deployed(1, "uatom", "atom", "atom", 18));
    let response = suite.end_block();
    assert!(events_of(&response, "erc20_deployed").is_empty());
    assert_eq!(state(&suite).last_observed_nonce, 1);
    assert!(state(&suite).erc20_to_denoms.is_empty());

    suite.vote(&[0, 1, 2, 3], &deployed(2, "uatom", "atom", "atom", 6));
    let response = suite.end_block();
    assert_eq!(events_of(&response, "erc20_deployed").len(), 1);

    let resp: DenomToErc20Response = suite.query(QueryMsg::DenomToErc20 {
        denom: "uatom".to_string(),
    });
    assert_eq!(resp.token_contract, peggy_token());
    assert!(resp.cosmos_originated);
}

#[test]
fn test_claims_differing_in_text_fields_attest_separately() {
    let mut suite = Suite::new();
    suite.set_supply("ibc/ABCD", Uint256::from(1_000u64));

    // same field text, split differently between name and symbol
    let honest = deployed(1, "ibc/ABCD", "ibc/ABCD", "", 0);
    let forged = deployed(1, "ibc/ABCD", "ibc", "ABCD/", 0);
    assert_ne!(honest.claim_hash(), forged.claim_hash());

    suite.vote(&[4], &forged);
    suite.vote(&[0, 1, 2, 3], &honest);
    let response = suite.end_block();
    assert_eq!(events_of(&response, "erc20_deployed").len(), 1);

    let st = state(&suite);
    assert_eq!(st.attestations.len(), 2);
    let observed: Vec<_> = st.attestations.iter().filter(|att| att.observed).collect();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].claim, honest);
    assert_eq!(observed[0].votes.len(), 4);
    let rejected = st.attestations.iter().find(|att| !att.observed).unwrap();
    assert_eq!(rejected.claim, forged);
    assert_eq!(rejected.votes, vec![suite.validators[4].operator.clone()]);

    let resp: DenomToErc20Response = suite.query(QueryMsg::DenomToErc20 {
        denom: "ibc/ABCD".to_string(),
    });
    assert_eq!(resp.token_contract, peggy_token());
    assert!(resp.cosmos_originated);
}
