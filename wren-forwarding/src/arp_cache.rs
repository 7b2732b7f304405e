//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;
use wren_utils::mac_addr::MacAddr;
use wren_utils::notify::Notifier;
use wren_utils::task::PeriodicTask;

use crate::error::Error;

/// Upper bound on cache entries. On overflow the oldest dynamic entry is
/// evicted; static entries are never evicted.
pub const CACHE_CAPACITY: usize = 64;

/// Dynamic entries older than this are aged out by the cache daemon.
pub const ENTRY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Static,
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct Entry {
    pub addr: Ipv4Addr,
    pub mac: MacAddr,
    pub kind: EntryKind,
    refreshed: Instant,
}

#[derive(Clone, Debug)]
pub enum ArpCacheEvent {
    Added(Entry),
    Removed(Entry),
}

/// Bounded IPv4 → MAC map shared by the forwarding engine and the operator
/// surface. Observers (e.g. a hardware-table mirror) subscribe to the
/// notifier.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: Mutex<BTreeMap<Ipv4Addr, Entry>>,
    pub notifier: Notifier<ArpCacheEvent>,
}

/// Periodic task aging out stale dynamic entries.
pub struct ArpCacheDaemon {
    cache: Arc<ArpCache>,
}

// ===== impl Entry =====

impl Entry {
    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.refreshed)
    }
}

// ===== impl ArpCache =====

impl ArpCache {
    pub fn new() -> ArpCache {
        ArpCache::default()
    }

    pub fn lookup(&self, addr: Ipv4Addr) -> Option<Entry> {
        self.entries.lock().unwrap().get(&addr).cloned()
    }

    /// Updates the mapping for an already-present address, resetting its
    /// age. Returns whether an entry was present (the ARP "merge flag").
    pub fn refresh(&self, addr: Ipv4Addr, mac: MacAddr) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&addr) {
            Some(entry) => {
                entry.mac = mac;
                entry.refreshed = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Adds or updates a mapping. At capacity the oldest dynamic entry is
    /// evicted; a cache full of static entries rejects the mutation.
    pub fn insert(
        &self,
        addr: Ipv4Addr,
        mac: MacAddr,
        kind: EntryKind,
    ) -> Result<(), Error> {
        let (evicted, added) = {
            let mut entries = self.entries.lock().unwrap();
            let mut evicted = None;

            if let Some(entry) = entries.get_mut(&addr) {
                entry.mac = mac;
                entry.kind = kind;
                entry.refreshed = Instant::now();
                (None, entry.clone())
            } else {
                if entries.len() >= CACHE_CAPACITY {
                    let oldest = entries
                        .values()
                        .filter(|e| e.kind == EntryKind::Dynamic)
                        .min_by_key(|e| e.refreshed)
                        .map(|e| e.addr);
                    match oldest {
                        Some(oldest) => {
                            evicted = entries.remove(&oldest);
                        }
                        None => return Err(Error::ArpCacheFull(addr)),
                    }
                }
                let entry = Entry {
                    addr,
                    mac,
                    kind,
                    refreshed: Instant::now(),
                };
                entries.insert(addr, entry.clone());
                (evicted, entry)
            }
        };
        if let Some(evicted) = evicted {
            debug!(addr = %evicted.addr, "evicting oldest dynamic entry");
            self.notifier.notify(&ArpCacheEvent::Removed(evicted));
        }
        self.notifier.notify(&ArpCacheEvent::Added(added));
        Ok(())
    }

    pub fn remove(&self, addr: Ipv4Addr) -> Option<Entry> {
        let removed = self.entries.lock().unwrap().remove(&addr);
        if let Some(removed) = &removed {
            self.notifier.notify(&ArpCacheEvent::Removed(removed.clone()));
        }
        removed
    }

    /// Removes every entry of `kind` (or all when `None`).
    pub fn purge(&self, kind: Option<EntryKind>) -> usize {
        let removed: Vec<Entry> = {
            let mut entries = self.entries.lock().unwrap();
            let addrs: Vec<Ipv4Addr> = entries
                .values()
                .filter(|e| kind.is_none_or(|kind| e.kind == kind))
                .map(|e| e.addr)
                .collect();
            addrs
                .into_iter()
                .filter_map(|addr| entries.remove(&addr))
                .collect()
        };
        let count = removed.len();
        for entry in removed {
            self.notifier.notify(&ArpCacheEvent::Removed(entry));
        }
        count
    }

    /// All entries in address order.
    pub fn list(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Dynamic entries at least `timeout` old at `now`.
    fn expired(&self, now: Instant, timeout: Duration) -> Vec<Ipv4Addr> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.kind == EntryKind::Dynamic && e.age(now) >= timeout)
            .map(|e| e.addr)
            .collect()
    }
}

// ===== impl ArpCacheDaemon =====

impl ArpCacheDaemon {
    pub fn new(cache: Arc<ArpCache>) -> ArpCacheDaemon {
        ArpCacheDaemon { cache }
    }
}

impl PeriodicTask for ArpCacheDaemon {
    fn name(&self) -> &'static str {
        "arp-cache"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn run(&mut self, now: Instant) {
        // Collect under the lock, then delete entry by entry.
        let expired = self.cache.expired(now, ENTRY_TIMEOUT);
        for addr in expired {
            debug!(%addr, "removing expired entry");
            self.cache.remove(addr);
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, i)
    }

    fn mac(i: u8) -> MacAddr {
        MacAddr::from([0, 0, 0, 0, 0, i])
    }

    #[test]
    fn merge_refresh_only_touches_existing() {
        let cache = ArpCache::new();
        assert!(!cache.refresh(addr(1), mac(1)));
        cache.insert(addr(1), mac(1), EntryKind::Dynamic).unwrap();
        assert!(cache.refresh(addr(1), mac(2)));
        assert_eq!(cache.lookup(addr(1)).unwrap().mac, mac(2));
    }

    #[test]
    fn overflow_evicts_oldest_dynamic() {
        let cache = ArpCache::new();
        cache.insert(addr(0), mac(0), EntryKind::Static).unwrap();
        for i in 1..CACHE_CAPACITY as u8 {
            cache.insert(addr(i), mac(i), EntryKind::Dynamic).unwrap();
        }
        assert_eq!(cache.len(), CACHE_CAPACITY);

        // addr(1) is the oldest dynamic entry; the static entry survives.
        cache
            .insert(addr(200), mac(200), EntryKind::Dynamic)
            .unwrap();
        assert_eq!(cache.len(), CACHE_CAPACITY);
        assert!(cache.lookup(addr(1)).is_none());
        assert!(cache.lookup(addr(0)).is_some());
        assert!(cache.lookup(addr(200)).is_some());
    }

    #[test]
    fn full_of_statics_rejects_insert() {
        let cache = ArpCache::new();
        for i in 0..CACHE_CAPACITY {
            cache
                .insert(addr(i as u8), mac(i as u8), EntryKind::Static)
                .unwrap();
        }
        assert!(matches!(
            cache.insert(addr(200), mac(200), EntryKind::Dynamic),
            Err(Error::ArpCacheFull(_))
        ));
    }

    #[test]
    fn daemon_ages_out_only_dynamic_entries() {
        let cache = Arc::new(ArpCache::new());
        cache.insert(addr(1), mac(1), EntryKind::Dynamic).unwrap();
        cache.insert(addr(2), mac(2), EntryKind::Static).unwrap();

        let mut daemon = ArpCacheDaemon::new(cache.clone());
        // Nothing is old enough yet.
        daemon.run(Instant::now());
        assert_eq!(cache.len(), 2);

        daemon.run(Instant::now() + ENTRY_TIMEOUT);
        assert!(cache.lookup(addr(1)).is_none());
        assert!(cache.lookup(addr(2)).is_some());
    }
}
