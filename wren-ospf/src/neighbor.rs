//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use wren_utils::ip::Ipv4AddrExt;

/// A directly connected neighbor on one of our wires: its router ID, its
/// address on the shared subnet, and the liveness of its HELLOs.
#[derive(Clone, Debug)]
pub struct Gateway {
    pub router_id: Ipv4Addr,
    /// Next-hop address on the wire.
    pub addr: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub last_hello: Instant,
    pub state: gsm::State,
}

// Gateway state machine.
pub mod gsm {
    /// A gateway starts unconfirmed when a HELLO arrives and is confirmed
    /// once the neighbor's link-state update claims us back on the same
    /// subnet.
    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    pub enum State {
        #[default]
        Unconfirmed,
        Confirmed,
    }
}

// ===== impl Gateway =====

impl Gateway {
    pub fn new(
        router_id: Ipv4Addr,
        addr: Ipv4Addr,
        subnet: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> Gateway {
        Gateway {
            router_id,
            addr,
            subnet: subnet.mask(mask),
            mask,
            last_hello: Instant::now(),
            state: gsm::State::default(),
        }
    }

    /// Time since the last HELLO from this neighbor.
    pub fn hello_age(&self, now: Instant) -> Duration {
        now.duration_since(self.last_hello)
    }

    pub fn refresh(&mut self, now: Instant) {
        self.last_hello = now;
    }

    pub fn confirm(&mut self) {
        self.state = gsm::State::Confirmed;
    }
}
