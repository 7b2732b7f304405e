//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use wren_forwarding::interface::Interface;

use crate::neighbor::Gateway;

/// Protocol state bound to one underlying interface: the HELLO schedule and
/// the gateways discovered on its wire, indexed by router ID and by on-wire
/// address.
#[derive(Debug)]
pub struct OspfInterface {
    pub iface: Arc<Interface>,
    pub hello_interval: u16,
    last_hello_tx: Option<Instant>,
    gateways: BTreeMap<Ipv4Addr, Gateway>,
    by_addr: BTreeMap<Ipv4Addr, Ipv4Addr>,
}

/// OSPF interfaces keyed by the underlying interface name (stable under
/// readdressing).
#[derive(Debug, Default)]
pub struct InterfaceSet {
    interfaces: BTreeMap<String, OspfInterface>,
}

// ===== impl OspfInterface =====

impl OspfInterface {
    pub fn new(iface: Arc<Interface>, hello_interval: u16) -> OspfInterface {
        OspfInterface {
            iface,
            hello_interval,
            last_hello_tx: None,
            gateways: BTreeMap::new(),
            by_addr: BTreeMap::new(),
        }
    }

    pub fn gateway(&self, router_id: Ipv4Addr) -> Option<&Gateway> {
        self.gateways.get(&router_id)
    }

    pub fn gateway_mut(&mut self, router_id: Ipv4Addr) -> Option<&mut Gateway> {
        self.gateways.get_mut(&router_id)
    }

    pub fn gateway_by_addr(&self, addr: Ipv4Addr) -> Option<&Gateway> {
        self.by_addr
            .get(&addr)
            .and_then(|router_id| self.gateways.get(router_id))
    }

    pub fn insert_gateway(&mut self, gateway: Gateway) {
        self.by_addr.insert(gateway.addr, gateway.router_id);
        self.gateways.insert(gateway.router_id, gateway);
    }

    pub fn remove_gateway(&mut self, router_id: Ipv4Addr) -> Option<Gateway> {
        let removed = self.gateways.remove(&router_id);
        if let Some(removed) = &removed {
            self.by_addr.remove(&removed.addr);
        }
        removed
    }

    pub fn gateways(&self) -> impl Iterator<Item = &Gateway> {
        self.gateways.values()
    }

    pub fn gateways_mut(&mut self) -> impl Iterator<Item = &mut Gateway> {
        self.gateways.values_mut()
    }

    pub fn gateway_count(&self) -> usize {
        self.gateways.len()
    }

    /// Whether a HELLO is due at `now`.
    pub fn hello_due(&self, now: Instant) -> bool {
        match self.last_hello_tx {
            Some(last) => {
                now.duration_since(last)
                    >= Duration::from_secs(self.hello_interval as u64)
            }
            None => true,
        }
    }

    pub fn mark_hello_tx(&mut self, now: Instant) {
        self.last_hello_tx = Some(now);
    }
}

// ===== impl InterfaceSet =====

impl InterfaceSet {
    pub fn new() -> InterfaceSet {
        InterfaceSet::default()
    }

    pub fn get(&self, name: &str) -> Option<&OspfInterface> {
        self.interfaces.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut OspfInterface> {
        self.interfaces.get_mut(name)
    }

    /// The OSPF interface for `iface`, created with `hello_interval` if it
    /// does not exist yet. Returns whether it was created.
    pub fn ensure(
        &mut self,
        iface: &Arc<Interface>,
        hello_interval: u16,
    ) -> (&mut OspfInterface, bool) {
        let created = !self.interfaces.contains_key(&iface.name);
        let entry = self
            .interfaces
            .entry(iface.name.clone())
            .or_insert_with(|| OspfInterface::new(iface.clone(), hello_interval));
        (entry, created)
    }

    pub fn remove(&mut self, name: &str) -> Option<OspfInterface> {
        self.interfaces.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OspfInterface> {
        self.interfaces.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OspfInterface> {
        self.interfaces.values_mut()
    }

    /// The interface holding a gateway for `router_id`, with the gateway.
    pub fn gateway_for(
        &self,
        router_id: Ipv4Addr,
    ) -> Option<(&OspfInterface, &Gateway)> {
        self.interfaces.values().find_map(|ospf_iface| {
            ospf_iface
                .gateway(router_id)
                .map(|gateway| (ospf_iface, gateway))
        })
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}
