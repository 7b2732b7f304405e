//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use wren_utils::ip::Ipv4AddrExt;

use crate::debug::Debug;
use crate::spf;

/// Distance assigned to nodes the spanning tree cannot reach.
pub const MAX_DISTANCE: u16 = 0xffff;

/// Router ID of the shared passive-endpoint node standing in for stub
/// subnets with no OSPF speaker.
pub const PASSIVE_ENDPOINT: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// A directed link: the owning node claims connectivity to `target` over
/// (subnet, mask).
#[derive(Clone, Debug)]
pub struct Link {
    pub target: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub last_lsu: Instant,
}

/// One router (or the passive endpoint) in the shared network map.
#[derive(Clone, Debug)]
pub struct Node {
    pub router_id: Ipv4Addr,
    pub links: Vec<Link>,
    pub last_seen: Instant,
    pub latest_seqno: Option<u16>,
    // Spanning-tree results, valid while the topology is clean.
    pub distance: u16,
    pub prev: Option<Ipv4Addr>,
}

/// The link-state graph rooted at this router. Any mutation sets the dirty
/// flag; `on_update` recomputes the spanning tree on the dirty→clean
/// transition.
#[derive(Debug)]
pub struct Topology {
    root_id: Ipv4Addr,
    nodes: BTreeMap<Ipv4Addr, Node>,
    dirty: bool,
}

// ===== impl Link =====

impl Link {
    pub fn new(target: Ipv4Addr, subnet: Ipv4Addr, mask: Ipv4Addr) -> Link {
        Link {
            target,
            subnet: subnet.mask(mask),
            mask,
            last_lsu: Instant::now(),
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.last_lsu)
    }

    pub fn is_passive(&self) -> bool {
        self.target == PASSIVE_ENDPOINT
    }
}

// ===== impl Node =====

impl Node {
    fn new(router_id: Ipv4Addr) -> Node {
        Node {
            router_id,
            links: Vec::new(),
            last_seen: Instant::now(),
            latest_seqno: None,
            distance: MAX_DISTANCE,
            prev: None,
        }
    }

    pub fn link(
        &self,
        target: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> Option<&Link> {
        self.links.iter().find(|link| {
            link.target == target
                && link.subnet == subnet.mask(mask)
                && link.mask == mask
        })
    }

    fn link_mut(
        &mut self,
        target: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> Option<&mut Link> {
        let subnet = subnet.mask(mask);
        self.links.iter_mut().find(|link| {
            link.target == target && link.subnet == subnet && link.mask == mask
        })
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.last_seen)
    }

    pub fn is_reachable(&self) -> bool {
        self.distance < MAX_DISTANCE
    }
}

// ===== impl Topology =====

impl Topology {
    pub fn new(root_id: Ipv4Addr) -> Topology {
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id, Node::new(root_id));
        nodes.insert(PASSIVE_ENDPOINT, Node::new(PASSIVE_ENDPOINT));
        Topology {
            root_id,
            nodes,
            dirty: false,
        }
    }

    pub fn root_id(&self) -> Ipv4Addr {
        self.root_id
    }

    pub fn node(&self, router_id: Ipv4Addr) -> Option<&Node> {
        self.nodes.get(&router_id)
    }

    /// The node for `router_id`, created (and the topology dirtied) if
    /// absent.
    pub fn ensure_node(&mut self, router_id: Ipv4Addr) -> &mut Node {
        if !self.nodes.contains_key(&router_id) {
            self.dirty = true;
        }
        self.nodes
            .entry(router_id)
            .or_insert_with(|| Node::new(router_id))
    }

    pub fn node_mut(&mut self, router_id: Ipv4Addr) -> Option<&mut Node> {
        self.nodes.get_mut(&router_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_link(
        &self,
        from: Ipv4Addr,
        target: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> bool {
        self.nodes
            .get(&from)
            .is_some_and(|node| node.link(target, subnet, mask).is_some())
    }

    /// Refreshes the last-LSU stamp on `from`'s link, if present.
    pub fn refresh_link(
        &mut self,
        from: Ipv4Addr,
        target: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
        now: Instant,
    ) -> bool {
        match self
            .nodes
            .get_mut(&from)
            .and_then(|node| node.link_mut(target, subnet, mask))
        {
            Some(link) => {
                link.last_lsu = now;
                true
            }
            None => false,
        }
    }

    /// Installs the two directed halves of a confirmed adjacency.
    pub fn commit_bidirectional(
        &mut self,
        a: Ipv4Addr,
        b: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) {
        Debug::LinkCommit(a, b, subnet.mask(mask)).log();
        for (from, to) in [(a, b), (b, a)] {
            let node = self.ensure_node(from);
            match node.link_mut(to, subnet, mask) {
                Some(link) => link.last_lsu = Instant::now(),
                None => node.links.push(Link::new(to, subnet, mask)),
            }
        }
        self.dirty = true;
    }

    /// Attaches a stub subnet to `from` via the passive endpoint.
    pub fn attach_passive(
        &mut self,
        from: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) {
        let node = self.ensure_node(from);
        match node.link_mut(PASSIVE_ENDPOINT, subnet, mask) {
            Some(link) => link.last_lsu = Instant::now(),
            None => {
                node.links.push(Link::new(PASSIVE_ENDPOINT, subnet, mask));
                self.dirty = true;
            }
        }
    }

    pub fn remove_link(
        &mut self,
        from: Ipv4Addr,
        target: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) {
        let subnet = subnet.mask(mask);
        if let Some(node) = self.nodes.get_mut(&from) {
            let before = node.links.len();
            node.links.retain(|link| {
                !(link.target == target
                    && link.subnet == subnet
                    && link.mask == mask)
            });
            if node.links.len() != before {
                self.dirty = true;
            }
        }
    }

    /// Removes a node and every link pointing at it.
    pub fn remove_node(&mut self, router_id: Ipv4Addr) {
        if router_id == self.root_id || router_id == PASSIVE_ENDPOINT {
            return;
        }
        if self.nodes.remove(&router_id).is_none() {
            return;
        }
        for node in self.nodes.values_mut() {
            node.links.retain(|link| link.target != router_id);
        }
        self.dirty = true;
    }

    /// Removes nodes unheard-of for `timeout`, returning their IDs.
    pub fn expire_nodes(
        &mut self,
        now: Instant,
        timeout: Duration,
    ) -> Vec<Ipv4Addr> {
        let expired: Vec<Ipv4Addr> = self
            .nodes
            .values()
            .filter(|node| {
                node.router_id != self.root_id
                    && node.router_id != PASSIVE_ENDPOINT
                    && node.age(now) >= timeout
            })
            .map(|node| node.router_id)
            .collect();
        for router_id in &expired {
            Debug::NodeExpire(*router_id).log();
            self.remove_node(*router_id);
        }
        expired
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Recomputes the spanning tree if the topology is dirty. Returns true
    /// on the dirty→clean transition.
    pub fn on_update(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        spf::compute(self);
        self.dirty = false;
        Debug::SptComputed(self.nodes.len()).log();
        true
    }

    pub(crate) fn nodes_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 10, 10, i)
    }

    fn subnet(i: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, i, 0)
    }

    const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

    #[test]
    fn commit_installs_both_halves() {
        let mut topology = Topology::new(addr(1));
        topology.commit_bidirectional(addr(1), addr(2), subnet(1), MASK);

        assert!(topology.has_link(addr(1), addr(2), subnet(1), MASK));
        assert!(topology.has_link(addr(2), addr(1), subnet(1), MASK));
        assert!(topology.is_dirty());
    }

    #[test]
    fn node_removal_unlinks_neighbors() {
        let mut topology = Topology::new(addr(1));
        topology.commit_bidirectional(addr(1), addr(2), subnet(1), MASK);
        topology.commit_bidirectional(addr(2), addr(3), subnet(2), MASK);
        topology.on_update();

        topology.remove_node(addr(2));
        assert!(topology.node(addr(2)).is_none());
        assert!(!topology.has_link(addr(1), addr(2), subnet(1), MASK));
        assert!(!topology.has_link(addr(3), addr(2), subnet(2), MASK));
        assert!(topology.is_dirty());
    }

    #[test]
    fn root_and_passive_endpoint_never_expire() {
        let mut topology = Topology::new(addr(1));
        topology.ensure_node(addr(2));
        topology.on_update();

        let later = Instant::now() + Duration::from_secs(1000);
        let expired = topology.expire_nodes(later, Duration::from_secs(90));
        assert_eq!(expired, vec![addr(2)]);
        assert!(topology.node(addr(1)).is_some());
        assert!(topology.node(PASSIVE_ENDPOINT).is_some());
    }

    #[test]
    fn on_update_clears_dirty_once() {
        let mut topology = Topology::new(addr(1));
        topology.ensure_node(addr(2));
        assert!(topology.is_dirty());
        assert!(topology.on_update());
        assert!(!topology.is_dirty());
        assert!(!topology.on_update());
    }
}
