//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::debug;
use wren_forwarding::interface::Interface;
use wren_forwarding::rib::{Route, RouteKind, RoutingTable};

use crate::debug::Debug;
use crate::interface::InterfaceSet;
use crate::topology::{PASSIVE_ENDPOINT, Topology};

/// A routing-table entry derived from the spanning tree.
#[derive(Clone, Debug)]
pub(crate) struct DerivedRoute {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub iface: Arc<Interface>,
}

/// Derives one dynamic route per link of every reachable node, via the
/// gateway of the node's root-adjacent ancestor.
///
/// Nodes are walked farthest-first so that when both ends of a link write
/// the shared subnet, the nearer end's entry lands last and wins the
/// replace-on-duplicate insert.
pub(crate) fn derive(
    topology: &Topology,
    interfaces: &InterfaceSet,
) -> Vec<DerivedRoute> {
    let root_id = topology.root_id();
    let mut nodes: Vec<_> = topology
        .nodes()
        .filter(|node| {
            node.router_id != root_id
                && node.router_id != PASSIVE_ENDPOINT
                && node.is_reachable()
        })
        .collect();
    nodes.sort_by_key(|node| std::cmp::Reverse(node.distance));

    let mut routes = Vec::new();
    for node in nodes {
        // Walk the prev chain up to the neighbor adjacent to the root.
        let mut first_hop = node;
        while let Some(prev) = first_hop.prev {
            if prev == root_id {
                break;
            }
            match topology.node(prev) {
                Some(prev) => first_hop = prev,
                None => break,
            }
        }
        if first_hop.prev != Some(root_id) {
            continue;
        }

        // The next hop is that neighbor's gateway address on our wire.
        let Some((ospf_iface, gateway)) =
            interfaces.gateway_for(first_hop.router_id)
        else {
            debug!(router_id = %first_hop.router_id,
                   "reachable node has no local gateway, skipping");
            continue;
        };

        for link in &node.links {
            routes.push(DerivedRoute {
                subnet: link.subnet,
                mask: link.mask,
                gateway: gateway.addr,
                iface: ospf_iface.iface.clone(),
            });
        }
    }
    routes
}

/// Replaces the dynamic half of the routing table with the derived set.
pub(crate) fn install(rib: &RoutingTable, routes: Vec<DerivedRoute>) {
    rib.purge(Some(RouteKind::Dynamic));
    let count = routes.len();
    for route in routes {
        rib.insert(Route::new(
            route.subnet,
            route.mask,
            route.gateway,
            route.iface,
            RouteKind::Dynamic,
        ));
    }
    Debug::RoutesInstalled(count).log();
}
