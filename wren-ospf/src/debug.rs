//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::debug;

// PWOSPF debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Interfaces
    InterfaceCreate(&'a str),
    // Gateways
    GatewayCreate(&'a str, Ipv4Addr, Ipv4Addr),
    GatewayConfirm(Ipv4Addr),
    GatewayTimeout(&'a str, Ipv4Addr),
    // Network
    HelloRx(&'a str, Ipv4Addr),
    HelloTx(&'a str),
    LsuRx(Ipv4Addr, u16, u32),
    LsuFlood(u16),
    LsuForward(Ipv4Addr),
    // Topology
    LinkCommit(Ipv4Addr, Ipv4Addr, Ipv4Addr),
    LinkExpire(Ipv4Addr, Ipv4Addr),
    NodeExpire(Ipv4Addr),
    SptComputed(usize),
    RoutesInstalled(usize),
}

// ===== impl Debug =====

impl Debug<'_> {
    pub(crate) fn log(&self) {
        match self {
            Debug::InterfaceCreate(name) => {
                debug!(%name, "{}", self);
            }
            Debug::GatewayCreate(name, router_id, addr) => {
                debug!(%name, %router_id, %addr, "{}", self);
            }
            Debug::GatewayConfirm(router_id) => {
                debug!(%router_id, "{}", self);
            }
            Debug::GatewayTimeout(name, router_id) => {
                debug!(%name, %router_id, "{}", self);
            }
            Debug::HelloRx(name, router_id) => {
                debug!(%name, %router_id, "{}", self);
            }
            Debug::HelloTx(name) => {
                debug!(%name, "{}", self);
            }
            Debug::LsuRx(router_id, seqno, advs) => {
                debug!(%router_id, %seqno, %advs, "{}", self);
            }
            Debug::LsuFlood(seqno) => {
                debug!(%seqno, "{}", self);
            }
            Debug::LsuForward(router_id) => {
                debug!(%router_id, "{}", self);
            }
            Debug::LinkCommit(a, b, subnet) => {
                debug!(%a, %b, %subnet, "{}", self);
            }
            Debug::LinkExpire(router_id, subnet) => {
                debug!(%router_id, %subnet, "{}", self);
            }
            Debug::NodeExpire(router_id) => {
                debug!(%router_id, "{}", self);
            }
            Debug::SptComputed(nodes) => {
                debug!(%nodes, "{}", self);
            }
            Debug::RoutesInstalled(count) => {
                debug!(%count, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InterfaceCreate(..) => {
                write!(f, "OSPF interface created")
            }
            Debug::GatewayCreate(..) => {
                write!(f, "gateway created")
            }
            Debug::GatewayConfirm(..) => {
                write!(f, "gateway confirmed bidirectionally")
            }
            Debug::GatewayTimeout(..) => {
                write!(f, "gateway timed out")
            }
            Debug::HelloRx(..) => {
                write!(f, "HELLO received")
            }
            Debug::HelloTx(..) => {
                write!(f, "HELLO sent")
            }
            Debug::LsuRx(..) => {
                write!(f, "LSU received")
            }
            Debug::LsuFlood(..) => {
                write!(f, "flooding LSU")
            }
            Debug::LsuForward(..) => {
                write!(f, "forwarding LSU")
            }
            Debug::LinkCommit(..) => {
                write!(f, "bidirectional link committed")
            }
            Debug::LinkExpire(..) => {
                write!(f, "stale link removed")
            }
            Debug::NodeExpire(..) => {
                write!(f, "node aged out of the topology")
            }
            Debug::SptComputed(..) => {
                write!(f, "shortest-path tree recomputed")
            }
            Debug::RoutesInstalled(..) => {
                write!(f, "routing table synchronized")
            }
        }
    }
}
