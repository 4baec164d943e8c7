//! Wallet allow-list. Empty means every verified wallet is admitted.

use super::address::Address;
use std::collections::HashSet;

/// Immutable set of admitted wallets, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    addresses: HashSet<Address>,
}

impl AllowList {
    /// An allow-list that admits every address.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// `true` if the list is empty or contains `address`.
    pub fn permits(&self, address: &Address) -> bool {
        self.addresses.is_empty() || self.addresses.contains(address)
    }
}
