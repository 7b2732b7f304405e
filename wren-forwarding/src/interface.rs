//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;
use wren_utils::ip::Ipv4AddrExt;
use wren_utils::mac_addr::MacAddr;
use wren_utils::notify::Notifier;

// Interface kind: a physical port or the local end of a tunnel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Hardware,
    Virtual,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceChange {
    Mac,
    Addr,
    Enabled,
}

#[derive(Clone, Debug)]
pub struct InterfaceEvent {
    pub name: String,
    pub change: InterfaceChange,
}

/// A named router port.
///
/// Mutable attributes live behind one coarse lock; every observable change
/// fires the interface's notifier on the mutating thread.
#[derive(Debug)]
pub struct Interface {
    pub name: String,
    pub if_type: InterfaceType,
    state: Mutex<InterfaceState>,
    pub notifier: Notifier<InterfaceEvent>,
}

#[derive(Debug)]
struct InterfaceState {
    mac: MacAddr,
    addr: Ipv4Addr,
    mask: Ipv4Addr,
    enabled: bool,
    speed_mbps: u32,
}

/// The set of all router ports, indexed by name; address lookups scan the
/// (small) set so they can never go stale under readdressing.
#[derive(Debug, Default)]
pub struct InterfaceMap {
    inner: Mutex<BTreeMap<String, Arc<Interface>>>,
}

// ===== impl Interface =====

impl Interface {
    pub fn new(name: &str, if_type: InterfaceType) -> Arc<Interface> {
        Arc::new(Interface {
            name: name.to_owned(),
            if_type,
            state: Mutex::new(InterfaceState {
                mac: MacAddr::ZERO,
                addr: Ipv4Addr::UNSPECIFIED,
                mask: Ipv4Addr::UNSPECIFIED,
                enabled: true,
                speed_mbps: 0,
            }),
            notifier: Notifier::new(),
        })
    }

    pub fn mac(&self) -> MacAddr {
        self.state.lock().unwrap().mac
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.state.lock().unwrap().addr
    }

    pub fn mask(&self) -> Ipv4Addr {
        self.state.lock().unwrap().mask
    }

    /// The interface's directly connected network (address & mask).
    pub fn subnet(&self) -> Ipv4Addr {
        let state = self.state.lock().unwrap();
        state.addr.mask(state.mask)
    }

    pub fn enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    pub fn speed_mbps(&self) -> u32 {
        self.state.lock().unwrap().speed_mbps
    }

    pub fn is_virtual(&self) -> bool {
        self.if_type == InterfaceType::Virtual
    }

    pub fn set_mac(&self, mac: MacAddr) {
        {
            let mut state = self.state.lock().unwrap();
            if state.mac == mac {
                return;
            }
            state.mac = mac;
        }
        self.notify(InterfaceChange::Mac);
    }

    pub fn set_addr(&self, addr: Ipv4Addr, mask: Ipv4Addr) {
        {
            let mut state = self.state.lock().unwrap();
            if state.addr == addr && state.mask == mask {
                return;
            }
            state.addr = addr;
            state.mask = mask;
        }
        self.notify(InterfaceChange::Addr);
    }

    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut state = self.state.lock().unwrap();
            if state.enabled == enabled {
                return;
            }
            state.enabled = enabled;
        }
        debug!(name = %self.name, %enabled, "interface state change");
        self.notify(InterfaceChange::Enabled);
    }

    pub fn set_speed_mbps(&self, speed_mbps: u32) {
        self.state.lock().unwrap().speed_mbps = speed_mbps;
    }

    fn notify(&self, change: InterfaceChange) {
        self.notifier.notify(&InterfaceEvent {
            name: self.name.clone(),
            change,
        });
    }
}

// ===== impl InterfaceMap =====

impl InterfaceMap {
    pub fn new() -> InterfaceMap {
        InterfaceMap::default()
    }

    /// Adds an interface. An existing interface with the same name is
    /// replaced.
    pub fn insert(&self, iface: Arc<Interface>) {
        self.inner
            .lock()
            .unwrap()
            .insert(iface.name.clone(), iface);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Interface>> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Interface>> {
        self.inner.lock().unwrap().remove(name)
    }

    /// The interface whose configured address equals `addr`, if any.
    pub fn by_addr(&self, addr: Ipv4Addr) -> Option<Arc<Interface>> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .find(|iface| iface.addr() == addr)
            .cloned()
    }

    /// All interfaces, in name order.
    pub fn list(&self) -> Vec<Arc<Interface>> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    /// The first interface in name order, whose address seeds the OSPF
    /// router ID.
    pub fn first(&self) -> Option<Arc<Interface>> {
        self.inner.lock().unwrap().values().next().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn address_lookup_follows_readdressing() {
        let map = InterfaceMap::new();
        let eth0 = Interface::new("eth0", InterfaceType::Hardware);
        eth0.set_addr(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        map.insert(eth0.clone());

        assert!(map.by_addr(Ipv4Addr::new(10, 0, 0, 1)).is_some());
        assert!(map.by_addr(Ipv4Addr::new(10, 0, 0, 2)).is_none());

        eth0.set_addr(
            Ipv4Addr::new(10, 0, 1, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        assert!(map.by_addr(Ipv4Addr::new(10, 0, 0, 1)).is_none());
        assert!(map.by_addr(Ipv4Addr::new(10, 0, 1, 1)).is_some());
        assert_eq!(eth0.subnet(), Ipv4Addr::new(10, 0, 1, 0));
    }

    #[test]
    fn change_notifications_fire_once_per_transition() {
        let iface = Interface::new("eth0", InterfaceType::Hardware);
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            iface.notifier.subscribe(move |event| {
                assert_eq!(event.name, "eth0");
                count.fetch_add(1, Ordering::Relaxed);
            });
        }

        iface.set_enabled(false);
        iface.set_enabled(false); // no transition, no event
        iface.set_mac("02:00:00:00:00:01".parse().unwrap());
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
