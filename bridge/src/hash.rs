//! Checkpoint hashing for the counterparty bridge contract
//!
//! Every checkpoint is `keccak256(abi.encode(...))` of a tuple whose layout the
//! counterparty contract reproduces before it verifies signatures. Nothing in
//! this module may change without a matching contract upgrade.
//!
//! # Valset checkpoint
//! ```solidity
//! keccak256(abi.encode(
//!     bytes32 bridgeId,
//!     bytes32 "checkpoint",
//!     uint256 valsetNonce,
//!     address[] validators,
//!     uint256[] powers,
//!     uint256 rewardAmount,
//!     address rewardToken
//! ))
//! ```
//!
//! # Batch checkpoint
//! ```solidity
//! keccak256(abi.encode(
//!     bytes32 bridgeId,
//!     bytes32 "transactionBatch",
//!     uint256[] amounts,
//!     address[] destinations,
//!     uint256[] fees,
//!     uint256 batchNonce,
//!     address tokenContract,
//!     uint256 batchTimeout
//! ))
//! ```

use common::EthAddress;
use cosmwasm_std::Uint256;
use tiny_keccak::{Hasher, Keccak};

use crate::state::{OutgoingTxBatch, Valset};

/// Domain separator for validator set checkpoints
pub const VALSET_CHECKPOINT_TAG: &str = "checkpoint";

/// Domain separator for batch checkpoints
pub const BATCH_CHECKPOINT_TAG: &str = "transactionBatch";

/// Compute keccak256 hash of arbitrary data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// UTF-8 bytes of `s`, right-padded with zeros to 32 bytes (Solidity `bytes32("...")`)
///
/// Inputs longer than 32 bytes are truncated; the bridge id is validated to fit.
pub fn fixed_bytes32(s: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    let len = s.len().min(32);
    out[..len].copy_from_slice(&s.as_bytes()[..len]);
    out
}

/// Convert 32-byte hash to 0x-prefixed hex string
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================================================
// ABI Encoding
// ============================================================================

/// A value in an `abi.encode` tuple
#[derive(Debug, Clone, PartialEq)]
pub enum AbiToken {
    /// `bytes32`
    FixedBytes([u8; 32]),
    /// `uint256`
    Uint(Uint256),
    /// `address`
    Address(EthAddress),
    /// `uint256[]`
    UintArray(Vec<Uint256>),
    /// `address[]`
    AddressArray(Vec<EthAddress>),
    /// `string`
    String(String),
}

impl AbiToken {
    fn is_dynamic(&self) -> bool {
        matches!(
            self,
            AbiToken::UintArray(_) | AbiToken::AddressArray(_) | AbiToken::String(_)
        )
    }

    /// Head word for static tokens
    fn static_word(&self) -> [u8; 32] {
        match self {
            AbiToken::FixedBytes(b) => *b,
            AbiToken::Uint(v) => v.to_be_bytes(),
            AbiToken::Address(a) => a.as_bytes32(),
            _ => [0u8; 32],
        }
    }

    /// Tail encoding for dynamic tokens: length word followed by the elements
    fn tail(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            AbiToken::UintArray(values) => {
                out.extend_from_slice(&u64_word(values.len() as u64));
                for v in values {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            AbiToken::AddressArray(addrs) => {
                out.extend_from_slice(&u64_word(addrs.len() as u64));
                for a in addrs {
                    out.extend_from_slice(&a.as_bytes32());
                }
            }
            AbiToken::String(s) => {
                let bytes = s.as_bytes();
                out.extend_from_slice(&u64_word(bytes.len() as u64));
                out.extend_from_slice(bytes);
                let rem = bytes.len() % 32;
                if rem != 0 {
                    out.extend(std::iter::repeat(0u8).take(32 - rem));
                }
            }
            _ => {}
        }
        out
    }
}

/// Left-pad a u64 to a 32-byte big-endian word
pub fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Solidity `abi.encode(tokens...)`
///
/// Static tokens occupy one head word each. Dynamic tokens put the byte
/// offset of their tail (measured from the start of the encoding) in the head,
/// and their length-prefixed contents in the tail, in argument order.
pub fn abi_encode(tokens: &[AbiToken]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&u64_word((head_len + tail.len()) as u64));
            tail.extend(token.tail());
        } else {
            head.extend_from_slice(&token.static_word());
        }
    }

    head.extend(tail);
    head
}

// ============================================================================
// Checkpoints
// ============================================================================

/// Checkpoint hash of a validator set snapshot
pub fn valset_checkpoint(bridge_id: &str, valset: &Valset) -> [u8; 32] {
    let (addresses, powers): (Vec<EthAddress>, Vec<Uint256>) = valset
        .members
        .iter()
        .map(|m| (m.ethereum_address, Uint256::from(m.power)))
        .unzip();

    let encoded = abi_encode(&[
        AbiToken::FixedBytes(fixed_bytes32(bridge_id)),
        AbiToken::FixedBytes(fixed_bytes32(VALSET_CHECKPOINT_TAG)),
        AbiToken::Uint(Uint256::from(valset.nonce)),
        AbiToken::AddressArray(addresses),
        AbiToken::UintArray(powers),
        AbiToken::Uint(valset.reward_amount),
        AbiToken::Address(valset.reward_token),
    ]);
    keccak256(&encoded)
}

/// Checkpoint hash of an outgoing transaction batch
pub fn batch_checkpoint(bridge_id: &str, batch: &OutgoingTxBatch) -> [u8; 32] {
    let txs = &batch.transactions;
    let amounts = txs.iter().map(|tx| tx.erc20_token.amount).collect();
    let destinations = txs.iter().map(|tx| tx.dest_address).collect();
    let fees = txs.iter().map(|tx| tx.erc20_fee.amount).collect();

    let encoded = abi_encode(&[
        AbiToken::FixedBytes(fixed_bytes32(bridge_id)),
        AbiToken::FixedBytes(fixed_bytes32(BATCH_CHECKPOINT_TAG)),
        AbiToken::UintArray(amounts),
        AbiToken::AddressArray(destinations),
        AbiToken::UintArray(fees),
        AbiToken::Uint(Uint256::from(batch.batch_nonce)),
        AbiToken::Address(batch.token_contract),
        AbiToken::Uint(Uint256::from(batch.batch_timeout)),
    ]);
    keccak256(&encoded)
}

/// Message a validator's counterparty key signs to bind itself to the validator
///
/// `keccak256(abi.encode(string validatorOperator, uint256 nonce))`
pub fn delegate_keys_sign_bytes(validator: &str, nonce: u64) -> [u8; 32] {
    let encoded = abi_encode(&[
        AbiToken::String(validator.to_string()),
        AbiToken::Uint(Uint256::from(nonce)),
    ]);
    keccak256(&encoded)
}
