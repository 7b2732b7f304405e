//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use wren_utils::ip::Ipv4AddrExt;

/// Identity of one link-state claim: `sender` asserts a link to `neighbor`
/// over (subnet, mask). A passive stub claim carries the unspecified
/// neighbor.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct AdvKey {
    pub sender: Ipv4Addr,
    pub neighbor: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
}

/// Ordered set of advertisement halves. One instance stages claims awaiting
/// their reverse; per-LSU instances collect the claims confirmed this round.
#[derive(Debug, Default)]
pub struct AdvertisementSet {
    advs: BTreeSet<AdvKey>,
}

// ===== impl AdvKey =====

impl AdvKey {
    pub fn new(
        sender: Ipv4Addr,
        neighbor: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> AdvKey {
        AdvKey {
            sender,
            neighbor,
            subnet: subnet.mask(mask),
            mask,
        }
    }

    /// The same claim as seen from the other side.
    pub fn reversed(&self) -> AdvKey {
        AdvKey {
            sender: self.neighbor,
            neighbor: self.sender,
            subnet: self.subnet,
            mask: self.mask,
        }
    }
}

// ===== impl AdvertisementSet =====

impl AdvertisementSet {
    pub fn new() -> AdvertisementSet {
        AdvertisementSet::default()
    }

    pub fn contains(&self, key: &AdvKey) -> bool {
        self.advs.contains(key)
    }

    pub fn insert(&mut self, key: AdvKey) -> bool {
        self.advs.insert(key)
    }

    pub fn remove(&mut self, key: &AdvKey) -> bool {
        self.advs.remove(key)
    }

    /// Drops every half sent or claimed by `router_id`.
    pub fn remove_router(&mut self, router_id: Ipv4Addr) {
        self.advs
            .retain(|key| key.sender != router_id && key.neighbor != router_id);
    }

    pub fn len(&self) -> usize {
        self.advs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advs.is_empty()
    }
}

// ===== unit tests =====
