//! Handles an operation runs against, mirroring cosmwasm's `Deps`/`DepsMut`

use cosmwasm_std::{Api, Storage};

use crate::keepers::Keepers;

/// Mutable access to the store plus the collaborator capabilities
pub struct BridgeDeps<'a> {
    pub storage: &'a mut dyn Storage,
    pub api: &'a dyn Api,
    pub keepers: Keepers<'a>,
}

/// Read-only access for queries
#[derive(Clone, Copy)]
pub struct BridgeRef<'a> {
    pub storage: &'a dyn Storage,
    pub api: &'a dyn Api,
    pub keepers: Keepers<'a>,
}

impl<'a> BridgeDeps<'a> {
    /// Reborrow so the handle can be passed down and used again afterwards
    pub fn branch(&'_ mut self) -> BridgeDeps<'_> {
        BridgeDeps {
            storage: self.storage,
            api: self.api,
            keepers: self.keepers,
        }
    }

    pub fn as_ref(&'_ self) -> BridgeRef<'_> {
        BridgeRef {
            storage: self.storage,
            api: self.api,
            keepers: self.keepers,
        }
    }
}
