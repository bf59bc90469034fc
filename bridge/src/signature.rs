//! Counterparty-style (EVM) signature recovery
//!
//! Signatures are 65 bytes `r || s || v` over
//! `keccak256("\x19Ethereum Signed Message:\n32" || hash)`. The recovery byte
//! may be raw (0/1) or legacy (27/28).

use common::EthAddress;
use cosmwasm_std::Api;

use crate::error::ContractError;
use crate::hash::keccak256;

/// Prefix `personal_sign` prepends to a 32-byte message
pub const PERSONAL_SIGN_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Hash actually signed when a counterparty wallet signs `hash` with `personal_sign`
pub fn personal_sign_hash(hash: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(PERSONAL_SIGN_PREFIX.len() + 32);
    data.extend_from_slice(PERSONAL_SIGN_PREFIX);
    data.extend_from_slice(hash);
    keccak256(&data)
}

/// Map a 27/28 recovery byte onto 0/1
pub fn normalize_recovery_id(v: u8) -> Result<u8, ContractError> {
    let v = if v >= 27 { v - 27 } else { v };
    if v > 1 {
        return Err(ContractError::invalid(format!("recovery id {} out of range", v)));
    }
    Ok(v)
}

/// Address of the key that signed `hash` (personal_sign prefixed)
pub fn recover_eth_address(
    api: &dyn Api,
    hash: &[u8; 32],
    signature: &[u8],
) -> Result<EthAddress, ContractError> {
    if signature.len() < 65 {
        return Err(ContractError::invalid(format!(
            "signature too short: {} bytes",
            signature.len()
        )));
    }
    let recovery_id = normalize_recovery_id(signature[64])?;
    let digest = personal_sign_hash(hash);

    let pubkey = api
        .secp256k1_recover_pubkey(&digest, &signature[..64], recovery_id)
        .map_err(|e| ContractError::invalid(format!("signature recovery failed: {}", e)))?;
    if pubkey.len() != 65 {
        return Err(ContractError::invalid("recovered public key is not uncompressed"));
    }

    let pubkey_hash = keccak256(&pubkey[1..]);
    Ok(EthAddress::from_slice(&pubkey_hash[12..])?)
}

/// Check that `signature` over `hash` was produced by `expected`
pub fn validate_eth_signature(
    api: &dyn Api,
    hash: &[u8; 32],
    signature: &[u8],
    expected: &EthAddress,
) -> Result<(), ContractError> {
    let signer = recover_eth_address(api, hash, signature)?;
    if &signer != expected {
        return Err(ContractError::invalid(format!(
            "signature from {} does not match eth address {}",
            signer, expected
        )));
    }
    Ok(())
}
