//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;
use wren_packet::buffer::PacketBuffer;
use wren_packet::ethernet::EthernetView;
use wren_utils::task::PeriodicTask;

use crate::interface::Interface;

/// Queue entries are dropped after this many daemon ticks without a reply.
pub const MAX_TICKS: u32 = 5;

/// An outbound Ethernet frame parked until its next hop resolves. The
/// Ethernet addresses are filled in at drain time.
#[derive(Debug)]
pub struct PendingFrame {
    pub buf: PacketBuffer,
    pub eth: EthernetView,
}

#[derive(Debug)]
struct QueueEntry {
    iface: Arc<Interface>,
    frames: VecDeque<PendingFrame>,
    ticks: u32,
}

/// Per-next-hop lists of frames awaiting ARP resolution, drained FIFO when
/// the reply arrives.
#[derive(Debug, Default)]
pub struct ArpQueue {
    entries: Mutex<BTreeMap<Ipv4Addr, QueueEntry>>,
}

/// Periodic task expiring queue entries whose resolution never completed.
pub struct ArpQueueDaemon {
    queue: Arc<ArpQueue>,
}

// ===== impl ArpQueue =====

impl ArpQueue {
    pub fn new() -> ArpQueue {
        ArpQueue::default()
    }

    pub fn contains(&self, next_hop: Ipv4Addr) -> bool {
        self.entries.lock().unwrap().contains_key(&next_hop)
    }

    /// Creates an entry for `next_hop` going out `iface` if none exists.
    /// Returns whether a new entry was created (and so an ARP request is
    /// owed).
    pub fn create(&self, next_hop: Ipv4Addr, iface: Arc<Interface>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&next_hop) {
            return false;
        }
        entries.insert(
            next_hop,
            QueueEntry {
                iface,
                frames: VecDeque::new(),
                ticks: 0,
            },
        );
        true
    }

    /// Appends a frame to the entry for `next_hop`. Returns false if no
    /// entry exists.
    pub fn push(&self, next_hop: Ipv4Addr, frame: PendingFrame) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&next_hop) {
            Some(entry) => {
                entry.frames.push_back(frame);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the entry for `next_hop`: its egress interface
    /// and the queued frames in arrival order.
    pub fn drain(
        &self,
        next_hop: Ipv4Addr,
    ) -> Option<(Arc<Interface>, Vec<PendingFrame>)> {
        self.entries
            .lock()
            .unwrap()
            .remove(&next_hop)
            .map(|entry| (entry.iface, entry.frames.into_iter().collect()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Advances entry ages, removing those that exhausted their ticks.
    /// Returns (next-hop, dropped-frame-count) per expired entry.
    fn tick(&self) -> Vec<(Ipv4Addr, usize)> {
        let mut entries = self.entries.lock().unwrap();
        let mut expired = Vec::new();
        entries.retain(|addr, entry| {
            entry.ticks += 1;
            if entry.ticks >= MAX_TICKS {
                expired.push((*addr, entry.frames.len()));
                false
            } else {
                true
            }
        });
        expired
    }
}

// ===== impl ArpQueueDaemon =====

impl ArpQueueDaemon {
    pub fn new(queue: Arc<ArpQueue>) -> ArpQueueDaemon {
        ArpQueueDaemon { queue }
    }
}

impl PeriodicTask for ArpQueueDaemon {
    fn name(&self) -> &'static str {
        "arp-queue"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn run(&mut self, _now: Instant) {
        for (next_hop, frames) in self.queue.tick() {
            debug!(%next_hop, frames, "resolution timed out, dropping");
        }
    }
}

// ===== unit tests =====
