//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::net::Ipv4Addr;

use crate::topology::{MAX_DISTANCE, Topology};

/// Dijkstra from the root over unit-weight links, writing `distance` and
/// `prev` into every node. Unreachable nodes keep `MAX_DISTANCE` and no
/// predecessor.
///
/// Links are directed; an edge is followed only toward nodes present in the
/// graph. Ties resolve toward the lower router ID, which keeps the tree
/// deterministic across recomputations.
pub(crate) fn compute(topology: &mut Topology) {
    let root_id = topology.root_id();

    // Reset the previous tree.
    for node in topology.nodes_mut() {
        node.distance = MAX_DISTANCE;
        node.prev = None;
    }
    if let Some(root) = topology.node_mut(root_id) {
        root.distance = 0;
    }

    let mut visited: BTreeSet<Ipv4Addr> = BTreeSet::new();
    let mut candidates: BinaryHeap<Reverse<(u16, Ipv4Addr)>> =
        BinaryHeap::new();
    candidates.push(Reverse((0, root_id)));

    while let Some(Reverse((distance, router_id))) = candidates.pop() {
        if !visited.insert(router_id) {
            continue;
        }

        let Some(node) = topology.node(router_id) else {
            continue;
        };
        let targets: Vec<Ipv4Addr> = node
            .links
            .iter()
            .map(|link| link.target)
            .filter(|target| !visited.contains(target))
            .collect();

        for target in targets {
            let Some(neighbor) = topology.node_mut(target) else {
                continue;
            };
            let candidate = distance.saturating_add(1);
            if candidate < neighbor.distance {
                neighbor.distance = candidate;
                neighbor.prev = Some(router_id);
                candidates.push(Reverse((candidate, target)));
            }
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

    fn rid(i: u8) -> Ipv4Addr {
        Ipv4Addr::new(1, 1, 1, i)
    }

    // Distinct subnet per adjacency.
    fn link(topology: &mut Topology, a: u8, b: u8) {
        let subnet = Ipv4Addr::new(10, a, b, 0);
        topology.commit_bidirectional(rid(a), rid(b), subnet, MASK);
    }

    fn unlink(topology: &mut Topology, a: u8, b: u8) {
        let subnet = Ipv4Addr::new(10, a, b, 0);
        topology.remove_link(rid(a), rid(b), subnet, MASK);
        topology.remove_link(rid(b), rid(a), subnet, MASK);
    }

    #[test]
    fn six_node_spanning_tree() {
        // root(=9)-0, root-1, root-2, 0-1, 1-2, 1-3, 1-4 with the root
        // mapped to id 9 and routers 0..4 to ids 10..14.
        let root = 9;
        let mut topology = Topology::new(rid(root));
        for peer in [10, 11, 12] {
            link(&mut topology, root, peer);
        }
        link(&mut topology, 10, 11);
        link(&mut topology, 11, 12);
        link(&mut topology, 11, 13);
        link(&mut topology, 11, 14);

        assert!(topology.on_update());
        for (node, distance, prev) in [
            (10, 1, root),
            (11, 1, root),
            (12, 1, root),
            (13, 2, 11),
            (14, 2, 11),
        ] {
            let node = topology.node(rid(node)).unwrap();
            assert_eq!(node.distance, distance);
            assert_eq!(node.prev, Some(rid(prev)));
        }

        // Drop root-1 and root-2: everything funnels through node 0.
        unlink(&mut topology, root, 11);
        unlink(&mut topology, root, 12);
        assert!(topology.on_update());

        for (node, distance, prev) in [
            (10, 1, root),
            (11, 2, 10),
            (12, 3, 11),
            (13, 3, 11),
            (14, 3, 11),
        ] {
            let node = topology.node(rid(node)).unwrap();
            assert_eq!(node.distance, distance, "node {}", node.router_id);
            assert_eq!(node.prev, Some(rid(prev)), "node {}", node.router_id);
        }

        // Every reachable node's prev chain reaches the root in `distance`
        // hops.
        for node in topology.nodes().filter(|n| n.is_reachable()) {
            let mut hops = 0;
            let mut cursor = node.router_id;
            while cursor != rid(root) {
                cursor = topology.node(cursor).unwrap().prev.unwrap();
                hops += 1;
            }
            assert_eq!(hops, node.distance);
        }
    }

    #[test]
    fn unreachable_nodes_keep_max_distance() {
        let mut topology = Topology::new(rid(1));
        link(&mut topology, 1, 2);
        topology.ensure_node(rid(77));

        topology.on_update();
        let stranded = topology.node(rid(77)).unwrap();
        assert_eq!(stranded.distance, MAX_DISTANCE);
        assert_eq!(stranded.prev, None);
        assert!(!stranded.is_reachable());
    }
}
