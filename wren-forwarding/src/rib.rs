//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;
use wren_utils::ip::Ipv4AddrExt;
use wren_utils::notify::Notifier;

use crate::interface::Interface;

// Whether an entry was configured by the operator or derived from the
// routing protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Static,
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct Route {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub iface: Arc<Interface>,
    pub kind: RouteKind,
}

#[derive(Clone, Debug)]
pub enum RouteEvent {
    Added(Route),
    Removed(Route),
}

/// Insertion-ordered route list with longest-prefix-match lookup.
///
/// The entry count stays in the low hundreds, so an explicit sweep beats a
/// trie here. New entries go to the front; an entry duplicating an existing
/// (subnet, mask) replaces it in place.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Mutex<Vec<Route>>,
    pub notifier: Notifier<RouteEvent>,
}

// ===== impl Route =====

impl Route {
    pub fn new(
        dest: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        iface: Arc<Interface>,
        kind: RouteKind,
    ) -> Route {
        Route {
            // Stored pre-masked.
            subnet: dest.mask(mask),
            mask,
            gateway,
            iface,
            kind,
        }
    }

    fn matches(&self, addr: Ipv4Addr) -> bool {
        addr.mask(self.mask) == self.subnet
    }
}

// ===== impl RoutingTable =====

impl RoutingTable {
    pub fn new() -> RoutingTable {
        RoutingTable::default()
    }

    /// Adds a route. A route with the same (subnet, mask) is replaced;
    /// otherwise the new entry is prepended.
    pub fn insert(&self, route: Route) {
        let removed = {
            let mut routes = self.routes.lock().unwrap();
            let removed = routes
                .iter()
                .position(|r| {
                    r.subnet == route.subnet && r.mask == route.mask
                })
                .map(|pos| routes.remove(pos));
            routes.insert(0, route.clone());
            removed
        };
        if let Some(removed) = removed {
            self.notifier.notify(&RouteEvent::Removed(removed));
        }
        debug!(subnet = %route.subnet, mask = %route.mask,
               gateway = %route.gateway, iface = %route.iface.name,
               kind = ?route.kind, "route added");
        self.notifier.notify(&RouteEvent::Added(route));
    }

    pub fn remove(&self, subnet: Ipv4Addr, mask: Ipv4Addr) -> Option<Route> {
        let removed = {
            let mut routes = self.routes.lock().unwrap();
            let subnet = subnet.mask(mask);
            routes
                .iter()
                .position(|r| r.subnet == subnet && r.mask == mask)
                .map(|pos| routes.remove(pos))
        };
        if let Some(removed) = &removed {
            debug!(subnet = %removed.subnet, mask = %removed.mask,
                   "route removed");
            self.notifier.notify(&RouteEvent::Removed(removed.clone()));
        }
        removed
    }

    /// Removes every route of `kind` (or every route when `None`), returning
    /// how many were dropped.
    pub fn purge(&self, kind: Option<RouteKind>) -> usize {
        let removed: Vec<Route> = {
            let mut routes = self.routes.lock().unwrap();
            let (purged, kept): (Vec<Route>, Vec<Route>) = routes
                .drain(..)
                .partition(|r| kind.is_none_or(|kind| r.kind == kind));
            *routes = kept;
            purged
        };
        let count = removed.len();
        for route in removed {
            self.notifier.notify(&RouteEvent::Removed(route));
        }
        count
    }

    /// Longest-prefix-match over routes on enabled interfaces. Among
    /// equal-length masks, static entries beat dynamic ones and earlier
    /// insertions beat later ones.
    pub fn lpm(&self, dest: Ipv4Addr) -> Option<Route> {
        let routes = self.routes.lock().unwrap();
        let mut best: Option<&Route> = None;
        for route in routes.iter() {
            // Routes on disabled interfaces are ignored; packets can't go
            // out them.
            if !route.iface.enabled() {
                continue;
            }
            if !route.matches(dest) {
                continue;
            }
            match best {
                None => best = Some(route),
                Some(current) => {
                    if current.mask.mask_len() < route.mask.mask_len()
                        || (current.mask.mask_len() == route.mask.mask_len()
                            && current.kind == RouteKind::Dynamic
                            && route.kind == RouteKind::Static)
                    {
                        best = Some(route);
                    }
                }
            }
        }
        best.cloned()
    }

    /// All routes in table order.
    pub fn list(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.routes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.lock().unwrap().is_empty()
    }
}

// ===== unit tests =====
