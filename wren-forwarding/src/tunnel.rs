//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use wren_utils::notify::Notifier;

use crate::interface::Interface;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    Gre,
}

/// A point-to-point encapsulation binding a local virtual interface to a
/// remote endpoint.
#[derive(Clone, Debug)]
pub struct Tunnel {
    pub name: String,
    pub iface: Arc<Interface>,
    pub remote: Ipv4Addr,
    pub mode: TunnelMode,
}

#[derive(Clone, Debug)]
pub enum TunnelEvent {
    Added(Tunnel),
    Removed(Tunnel),
}

/// Tunnel registry, indexed by name and by remote endpoint.
#[derive(Debug, Default)]
pub struct TunnelMap {
    inner: Mutex<TunnelMapInner>,
    pub notifier: Notifier<TunnelEvent>,
}

#[derive(Debug, Default)]
struct TunnelMapInner {
    by_name: BTreeMap<String, Tunnel>,
    by_remote: BTreeMap<Ipv4Addr, String>,
}

// ===== impl TunnelMap =====

impl TunnelMap {
    pub fn new() -> TunnelMap {
        TunnelMap::default()
    }

    /// Adds a tunnel. A tunnel with the same name is replaced.
    pub fn insert(&self, tunnel: Tunnel) {
        let replaced = {
            let mut inner = self.inner.lock().unwrap();
            let replaced = inner.by_name.remove(&tunnel.name);
            if let Some(replaced) = &replaced {
                inner.by_remote.remove(&replaced.remote);
            }
            inner.by_remote.insert(tunnel.remote, tunnel.name.clone());
            inner.by_name.insert(tunnel.name.clone(), tunnel.clone());
            replaced
        };
        if let Some(replaced) = replaced {
            self.notifier.notify(&TunnelEvent::Removed(replaced));
        }
        self.notifier.notify(&TunnelEvent::Added(tunnel));
    }

    pub fn remove(&self, name: &str) -> Option<Tunnel> {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let removed = inner.by_name.remove(name);
            if let Some(removed) = &removed {
                inner.by_remote.remove(&removed.remote);
            }
            removed
        };
        if let Some(removed) = &removed {
            self.notifier.notify(&TunnelEvent::Removed(removed.clone()));
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Tunnel> {
        self.inner.lock().unwrap().by_name.get(name).cloned()
    }

    /// The tunnel whose remote endpoint is `addr`, if any.
    pub fn by_remote(&self, addr: Ipv4Addr) -> Option<Tunnel> {
        let inner = self.inner.lock().unwrap();
        let name = inner.by_remote.get(&addr)?;
        inner.by_name.get(name).cloned()
    }

    pub fn list(&self) -> Vec<Tunnel> {
        self.inner.lock().unwrap().by_name.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().by_name.is_empty()
    }
}

// ===== unit tests =====
