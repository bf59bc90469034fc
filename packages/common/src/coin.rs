//! 256-bit coin amounts
//!
//! Counterparty token amounts are `uint256`, so bridge-side balances are
//! tracked with [`Uint256`] rather than the host's 128-bit `Coin`.

use std::fmt;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::Uint256;

/// A denomination and a 256-bit amount
#[cw_serde]
pub struct Coin256 {
    pub denom: String,
    pub amount: Uint256,
}

impl Coin256 {
    pub fn new(amount: impl Into<Uint256>, denom: impl Into<String>) -> Self {
        Coin256 {
            denom: denom.into(),
            amount: amount.into(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Coin256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}
