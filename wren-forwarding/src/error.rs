//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::warn;

// Forwarding-plane errors surfaced to the operator.
//
// Packet-level validation failures are not represented here: invalid frames
// are dropped with a debug log and never propagate.
#[derive(Debug)]
pub enum Error {
    // Mutations
    ArpCacheFull(Ipv4Addr),
    // Lookups
    InterfaceNotFound(String),
    RouteNotFound(Ipv4Addr, Ipv4Addr),
    ArpEntryNotFound(Ipv4Addr),
    TunnelNotFound(String),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::ArpCacheFull(addr) => {
                warn!(%addr, "{}", self);
            }
            Error::InterfaceNotFound(name) => {
                warn!(%name, "{}", self);
            }
            Error::RouteNotFound(subnet, mask) => {
                warn!(%subnet, %mask, "{}", self);
            }
            Error::ArpEntryNotFound(addr) => {
                warn!(%addr, "{}", self);
            }
            Error::TunnelNotFound(name) => {
                warn!(%name, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ArpCacheFull(_) => {
                write!(f, "ARP cache is full of static entries")
            }
            Error::InterfaceNotFound(_) => {
                write!(f, "no such interface")
            }
            Error::RouteNotFound(..) => {
                write!(f, "no such route")
            }
            Error::ArpEntryNotFound(_) => {
                write!(f, "no such ARP entry")
            }
            Error::TunnelNotFound(_) => {
                write!(f, "no such tunnel")
            }
        }
    }
}

impl std::error::Error for Error {}
