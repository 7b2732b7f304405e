//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;
use wren_forwarding::engine::{Engine, OspfPacketMsg};
use wren_forwarding::interface::{Interface, InterfaceMap};
use wren_forwarding::rib::{RouteKind, RoutingTable};
use wren_packet::buffer::PacketBuffer;
use wren_packet::ip::{self, IpProtocol, IpView};
use wren_packet::ospf::{
    self, ALL_OSPF_ROUTERS, OspfHelloView, OspfLsuView, OspfType, OspfView,
};
use wren_packet::view::{PacketView, View};
use wren_utils::mac_addr::MacAddr;
use wren_utils::notify::Notifier;

use crate::advertisement::{AdvKey, AdvertisementSet};
use crate::debug::Debug;
use crate::error::Error;
use crate::interface::InterfaceSet;
use crate::neighbor::{Gateway, gsm};
use crate::topology::{PASSIVE_ENDPOINT, Topology};
use crate::{
    DEFAULT_HELLO_INTERVAL, DEFAULT_LSU_INTERVAL, DEFAULT_LSU_TTL,
    LSU_TIMEOUT, route,
};

/// One advertisement triple: (subnet, mask, neighbor router ID).
type Advertisement = (Ipv4Addr, Ipv4Addr, Ipv4Addr);

#[derive(Clone, Debug)]
pub enum OspfEvent {
    GatewayAdded { iface: String, router_id: Ipv4Addr },
    GatewayRemoved { iface: String, router_id: Ipv4Addr },
    LinkStateFlood,
    RoutesUpdated,
}

/// The PWOSPF speaker: neighbor discovery over HELLOs, flooded link-state
/// updates, and a topology whose spanning tree drives the dynamic half of
/// the routing table.
pub struct OspfRouter {
    area_id: Ipv4Addr,
    engine: Arc<Engine>,
    iface_map: Arc<InterfaceMap>,
    rib: Arc<RoutingTable>,
    state: Mutex<RouterState>,
    enabled: AtomicBool,
    pub notifier: Notifier<OspfEvent>,
}

struct RouterState {
    router_id: Ipv4Addr,
    interfaces: InterfaceSet,
    topology: Topology,
    advs_staged: AdvertisementSet,
    lsu_seqno: u16,
    // The advertised link set changed since the last flood.
    lsu_dirty: bool,
    last_flood: Option<Instant>,
}

// ===== impl OspfRouter =====

impl OspfRouter {
    pub fn new(
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
        engine: Arc<Engine>,
        iface_map: Arc<InterfaceMap>,
        rib: Arc<RoutingTable>,
    ) -> Arc<OspfRouter> {
        Arc::new(OspfRouter {
            area_id,
            engine,
            iface_map,
            rib,
            state: Mutex::new(RouterState {
                router_id,
                interfaces: InterfaceSet::new(),
                topology: Topology::new(router_id),
                advs_staged: AdvertisementSet::new(),
                lsu_seqno: rand::rng().random(),
                lsu_dirty: false,
                last_flood: None,
            }),
            enabled: AtomicBool::new(true),
            notifier: Notifier::new(),
        })
    }

    pub fn router_id(&self) -> Ipv4Addr {
        self.state.lock().unwrap().router_id
    }

    pub fn area_id(&self) -> Ipv4Addr {
        self.area_id
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Starts or stops the protocol. Stopping withdraws every derived route
    /// and forgets all protocol state; a later start begins from scratch.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::Relaxed) == enabled {
            return;
        }
        if !enabled {
            let mut state = self.state.lock().unwrap();
            let router_id = state.router_id;
            state.interfaces = InterfaceSet::new();
            state.topology = Topology::new(router_id);
            state.advs_staged = AdvertisementSet::new();
            state.lsu_dirty = false;
            state.last_flood = None;
            drop(state);
            self.rib.purge(Some(RouteKind::Dynamic));
        }
    }

    /// Signals that the local advertised link set may have changed (e.g. an
    /// interface flapped).
    pub fn mark_links_changed(&self) {
        let mut state = self.state.lock().unwrap();
        state.lsu_dirty = true;
        state.topology.mark_dirty();
    }

    /// Overrides the HELLO interval spoken on one interface. Neighbors
    /// advertising a different interval are ignored on that wire.
    pub fn set_hello_interval(&self, iface: &Arc<Interface>, hello_interval: u16) {
        let mut state = self.state.lock().unwrap();
        let (ospf_iface, created) = state.interfaces.ensure(iface, hello_interval);
        if created {
            Debug::InterfaceCreate(&iface.name).log();
        }
        ospf_iface.hello_interval = hello_interval;
    }

    /// Entry point for OSPF packets handed over by the forwarding engine.
    pub fn process_packet(&self, msg: OspfPacketMsg) {
        if !self.enabled() {
            return;
        }
        let OspfPacketMsg { buf, view, iface } = msg;
        match view.derived(&buf) {
            PacketView::OspfHello(hello) => {
                if let Err(error) = self.handle_hello(&buf, &hello, &iface) {
                    error.log();
                }
            }
            PacketView::OspfLsu(lsu) => {
                if let Err(error) = self.handle_lsu(buf, &lsu, &iface) {
                    error.log();
                }
            }
            _ => {
                debug!("unknown OSPF packet type, dropping");
            }
        }
    }

    // ===== HELLO input (one per neighbor per HELLOINT) =====

    fn handle_hello(
        &self,
        buf: &PacketBuffer,
        hello: &OspfHelloView,
        iface: &Arc<Interface>,
    ) -> Result<(), Error> {
        hello.validate(buf)?;
        let common = hello.common();

        let area_id = common.area_id(buf);
        if area_id != self.area_id {
            return Err(Error::AreaIdMismatch(self.area_id, area_id));
        }
        let mask = hello.network_mask(buf);
        if mask != iface.mask() {
            return Err(Error::HelloMaskMismatch(iface.name.clone(), mask));
        }
        let Some(PacketView::Ip(outer)) = hello.enclosing() else {
            return Err(Error::MissingEnclosingIp);
        };
        let src = outer.src(buf);
        let router_id = common.router_id(buf);

        Debug::HelloRx(&iface.name, router_id).log();

        let now = Instant::now();
        let added = {
            let mut state = self.state.lock().unwrap();
            let state = &mut *state;
            let our_id = state.router_id;
            let (ospf_iface, created) =
                state.interfaces.ensure(iface, DEFAULT_HELLO_INTERVAL);
            if created {
                Debug::InterfaceCreate(&iface.name).log();
            }

            if hello.hello_interval(buf) != ospf_iface.hello_interval {
                return Err(Error::HelloIntervalMismatch(
                    iface.name.clone(),
                    hello.hello_interval(buf),
                ));
            }

            match ospf_iface.gateway_mut(router_id) {
                Some(gateway) => {
                    gateway.refresh(now);
                    false
                }
                None => {
                    let subnet = iface.subnet();
                    Debug::GatewayCreate(&iface.name, router_id, src).log();
                    ospf_iface.insert_gateway(Gateway::new(
                        router_id, src, subnet, mask,
                    ));
                    // Stage our half of the adjacency; the neighbor's LSU
                    // naming us back commits it.
                    state.advs_staged.insert(AdvKey::new(
                        our_id, router_id, subnet, mask,
                    ));
                    state.lsu_dirty = true;
                    true
                }
            }
        };

        if added {
            self.notifier.notify(&OspfEvent::GatewayAdded {
                iface: iface.name.clone(),
                router_id,
            });
        }
        Ok(())
    }

    // ===== LSU input (flooded link state) =====

    fn handle_lsu(
        &self,
        mut buf: PacketBuffer,
        lsu: &OspfLsuView,
        _iface: &Arc<Interface>,
    ) -> Result<(), Error> {
        lsu.validate(&buf)?;
        let common = lsu.common();

        let sender_id = common.router_id(&buf);
        let seqno = lsu.seqno(&buf);
        let Some(PacketView::Ip(outer)) = lsu.enclosing() else {
            return Err(Error::MissingEnclosingIp);
        };
        let src = outer.src(&buf);

        Debug::LsuRx(sender_id, seqno, lsu.adv_count(&buf)).log();

        let now = Instant::now();
        let forwards = {
            let mut state = self.state.lock().unwrap();
            if sender_id == state.router_id {
                return Err(Error::SelfOriginatedLsu(sender_id));
            }

            // Sequence gating: only strictly newer updates are accepted.
            let node = state.topology.ensure_node(sender_id);
            if let Some(latest) = node.latest_seqno
                && seqno <= latest
            {
                return Err(Error::StaleSeqno(sender_id, seqno));
            }
            node.latest_seqno = Some(seqno);
            node.last_seen = now;

            // Hop-limited re-flood to every neighbor but the sender.
            lsu.dec_ttl(&mut buf);
            let forwards = if lsu.ttl(&buf) > 0 {
                common.reset_checksum(&mut buf);
                let data = buf
                    .bytes(
                        common.offset(&buf),
                        common.pkt_len(&buf) as usize,
                    )
                    .to_vec();
                state
                    .interfaces
                    .iter()
                    .filter(|ospf_iface| ospf_iface.iface.enabled())
                    .flat_map(|ospf_iface| {
                        let local = ospf_iface.iface.addr();
                        ospf_iface
                            .gateways()
                            .filter(|gateway| gateway.addr != src)
                            .map(move |gateway| {
                                (local, gateway.addr, gateway.router_id)
                            })
                    })
                    .map(|(local, addr, router_id)| {
                        (local, addr, router_id, data.clone())
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let confirmed = self
                .process_advertisements(&mut state, &buf, lsu, sender_id, now);
            self.remove_unconfirmed_links(&mut state, &confirmed, sender_id, now);
            state.topology.mark_dirty();
            forwards
        };

        for (src_addr, dst, router_id, data) in forwards {
            Debug::LsuForward(router_id).log();
            self.send_ospf_payload(src_addr, dst, &data);
        }

        self.refresh_topology();
        Ok(())
    }

    /// Establishes a bidirectional link for each advertised neighbor that
    /// has also claimed the sender; unmatched halves are staged until the
    /// other side's claim arrives.
    fn process_advertisements(
        &self,
        state: &mut RouterState,
        buf: &PacketBuffer,
        lsu: &OspfLsuView,
        sender_id: Ipv4Addr,
        now: Instant,
    ) -> AdvertisementSet {
        let mut confirmed = AdvertisementSet::new();

        for index in 0..lsu.adv_count(buf) {
            let adv = lsu.advertisement(index);
            let subnet = adv.subnet(buf);
            let mask = adv.subnet_mask(buf);
            let neighbor_id = adv.router_id(buf);

            // A passive stub attaches directly to the shared endpoint node.
            if neighbor_id == PASSIVE_ENDPOINT {
                if mask != Ipv4Addr::UNSPECIFIED {
                    state.topology.attach_passive(sender_id, subnet, mask);
                    state.topology.refresh_link(
                        sender_id,
                        PASSIVE_ENDPOINT,
                        subnet,
                        mask,
                        now,
                    );
                    confirmed.insert(AdvKey::new(
                        sender_id,
                        PASSIVE_ENDPOINT,
                        subnet,
                        mask,
                    ));
                }
                continue;
            }

            let forward = AdvKey::new(sender_id, neighbor_id, subnet, mask);
            if state
                .topology
                .has_link(sender_id, neighbor_id, forward.subnet, mask)
            {
                // Already committed; keep it alive.
                state.topology.refresh_link(
                    sender_id,
                    neighbor_id,
                    forward.subnet,
                    mask,
                    now,
                );
                confirmed.insert(forward);
            } else if state.advs_staged.remove(&forward.reversed()) {
                // The other side already claimed this link.
                state.topology.commit_bidirectional(
                    sender_id,
                    neighbor_id,
                    forward.subnet,
                    mask,
                );
                confirmed.insert(forward);
                if neighbor_id == state.router_id {
                    self.confirm_gateway(state, sender_id);
                }
            } else {
                state.advs_staged.insert(forward);
            }
        }

        confirmed
    }

    fn confirm_gateway(&self, state: &mut RouterState, router_id: Ipv4Addr) {
        for ospf_iface in state.interfaces.iter_mut() {
            if let Some(gateway) = ospf_iface.gateway_mut(router_id)
                && gateway.state != gsm::State::Confirmed
            {
                Debug::GatewayConfirm(router_id).log();
                gateway.confirm();
            }
        }
    }

    /// Drops the sender's links that this LSU no longer claims once their
    /// last confirmation is older than the LSU timeout.
    fn remove_unconfirmed_links(
        &self,
        state: &mut RouterState,
        confirmed: &AdvertisementSet,
        sender_id: Ipv4Addr,
        now: Instant,
    ) {
        let Some(node) = state.topology.node_mut(sender_id) else {
            return;
        };
        let mut removed = false;
        node.links.retain(|link| {
            let key = AdvKey::new(
                sender_id,
                link.target,
                link.subnet,
                link.mask,
            );
            if confirmed.contains(&key) || link.age(now) <= LSU_TIMEOUT {
                true
            } else {
                Debug::LinkExpire(sender_id, link.subnet).log();
                removed = true;
                false
            }
        });
        if removed {
            state.topology.mark_dirty();
        }
    }

    // ===== periodic duties =====

    /// One tick of protocol upkeep: HELLO emission, LSU flooding, neighbor
    /// and node expiry, and lazy spanning-tree refresh.
    pub fn on_tick(&self, now: Instant) {
        if !self.enabled() {
            return;
        }
        self.ensure_interfaces();
        self.send_due_hellos(now);
        self.timeout_neighbors(now);
        self.flood_if_due(now);
        {
            let mut state = self.state.lock().unwrap();
            state.topology.expire_nodes(now, LSU_TIMEOUT);
        }
        self.refresh_topology();
    }

    /// Every forwarding-plane interface speaks OSPF; late additions (new
    /// tunnels) are picked up here.
    fn ensure_interfaces(&self) {
        let ifaces = self.iface_map.list();
        let mut state = self.state.lock().unwrap();
        for iface in &ifaces {
            let (_, created) =
                state.interfaces.ensure(iface, DEFAULT_HELLO_INTERVAL);
            if created {
                Debug::InterfaceCreate(&iface.name).log();
            }
        }
    }

    fn send_due_hellos(&self, now: Instant) {
        let due: Vec<(Arc<Interface>, u16)> = {
            let mut state = self.state.lock().unwrap();
            state
                .interfaces
                .iter_mut()
                .filter(|ospf_iface| {
                    ospf_iface.iface.enabled()
                        && !ospf_iface.iface.addr().is_unspecified()
                        && ospf_iface.hello_due(now)
                })
                .map(|ospf_iface| {
                    ospf_iface.mark_hello_tx(now);
                    (ospf_iface.iface.clone(), ospf_iface.hello_interval)
                })
                .collect()
        };
        for (iface, hello_interval) in due {
            self.send_hello(&iface, hello_interval);
        }
    }

    fn timeout_neighbors(&self, now: Instant) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let our_id = state.router_id;
            let mut dropped = Vec::new();
            for ospf_iface in state.interfaces.iter_mut() {
                let dead_interval = Duration::from_secs(
                    3 * ospf_iface.hello_interval as u64,
                );
                let expired: Vec<Ipv4Addr> = ospf_iface
                    .gateways()
                    .filter(|gateway| gateway.hello_age(now) > dead_interval)
                    .map(|gateway| gateway.router_id)
                    .collect();
                for router_id in expired {
                    if let Some(gateway) =
                        ospf_iface.remove_gateway(router_id)
                    {
                        Debug::GatewayTimeout(
                            &ospf_iface.iface.name,
                            router_id,
                        )
                        .log();
                        dropped.push((
                            ospf_iface.iface.name.clone(),
                            gateway,
                        ));
                    }
                }
            }
            for (iface_name, gateway) in dropped {
                let key = AdvKey::new(
                    our_id,
                    gateway.router_id,
                    gateway.subnet,
                    gateway.mask,
                );
                state.advs_staged.remove(&key);
                state.advs_staged.remove(&key.reversed());
                state.topology.remove_link(
                    our_id,
                    gateway.router_id,
                    gateway.subnet,
                    gateway.mask,
                );
                state.topology.remove_link(
                    gateway.router_id,
                    our_id,
                    gateway.subnet,
                    gateway.mask,
                );
                state.lsu_dirty = true;
                state.topology.mark_dirty();
                events.push(OspfEvent::GatewayRemoved {
                    iface: iface_name,
                    router_id: gateway.router_id,
                });
            }
        }
        for event in events {
            self.notifier.notify(&event);
        }
    }

    fn flood_if_due(&self, now: Instant) {
        let due = {
            let state = self.state.lock().unwrap();
            state.lsu_dirty
                || match state.last_flood {
                    Some(last) => {
                        now.duration_since(last) >= DEFAULT_LSU_INTERVAL
                    }
                    None => true,
                }
        };
        if due {
            self.flood_lsu(now);
        }
    }

    /// Originates one LSU per directly connected gateway, advertising every
    /// local link including passive stubs.
    fn flood_lsu(&self, now: Instant) {
        let (router_id, seqno, advs, targets) = {
            let mut state = self.state.lock().unwrap();
            state.lsu_seqno = state.lsu_seqno.wrapping_add(1);
            state.lsu_dirty = false;
            state.last_flood = Some(now);

            let advs: Vec<Advertisement> = state
                .interfaces
                .iter()
                .filter(|ospf_iface| {
                    ospf_iface.iface.enabled()
                        && !ospf_iface.iface.addr().is_unspecified()
                })
                .flat_map(|ospf_iface| {
                    if ospf_iface.gateway_count() > 0 {
                        ospf_iface
                            .gateways()
                            .map(|gateway| {
                                (
                                    gateway.subnet,
                                    gateway.mask,
                                    gateway.router_id,
                                )
                            })
                            .collect::<Vec<_>>()
                    } else {
                        // Passive stub.
                        vec![(
                            ospf_iface.iface.subnet(),
                            ospf_iface.iface.mask(),
                            PASSIVE_ENDPOINT,
                        )]
                    }
                })
                .collect();

            let targets: Vec<(Ipv4Addr, Ipv4Addr)> = state
                .interfaces
                .iter()
                .filter(|ospf_iface| ospf_iface.iface.enabled())
                .flat_map(|ospf_iface| {
                    let local = ospf_iface.iface.addr();
                    ospf_iface
                        .gateways()
                        .map(move |gateway| (local, gateway.addr))
                })
                .collect();

            (state.router_id, state.lsu_seqno, advs, targets)
        };

        if targets.is_empty() {
            return;
        }
        Debug::LsuFlood(seqno).log();
        for (src, dst) in targets {
            self.send_lsu(router_id, src, dst, seqno, &advs);
        }
        self.notifier.notify(&OspfEvent::LinkStateFlood);
    }

    /// Recomputes the spanning tree when dirty and mirrors it into the
    /// routing table.
    pub fn refresh_topology(&self) {
        let routes = {
            let mut state = self.state.lock().unwrap();
            if !state.topology.on_update() {
                return;
            }
            route::derive(&state.topology, &state.interfaces)
        };
        route::install(&self.rib, routes);
        self.notifier.notify(&OspfEvent::RoutesUpdated);
    }

    // ===== packet construction =====

    fn send_hello(&self, iface: &Arc<Interface>, hello_interval: u16) {
        let router_id = self.router_id();
        let pkt_len = ip::HEADER_SIZE + ospf::HELLO_PACKET_SIZE;
        let mut buf = PacketBuffer::new(pkt_len);
        let ip_view = IpView::new(pkt_len);
        ip_view.init_default(
            &mut buf,
            pkt_len as u16,
            IpProtocol::Ospf,
            iface.addr(),
            ALL_OSPF_ROUTERS,
        );

        let ospf_view = OspfView::new(pkt_len - ip::HEADER_SIZE);
        ospf_view.init(
            &mut buf,
            OspfType::Hello,
            ospf::HELLO_PACKET_SIZE as u16,
            router_id,
            self.area_id,
        );
        let hello = OspfHelloView::new(pkt_len - ip::HEADER_SIZE);
        hello.set_network_mask(&mut buf, iface.mask());
        hello.set_hello_interval(&mut buf, hello_interval);
        hello.set_padding(&mut buf);
        ospf_view.reset_checksum(&mut buf);
        ip_view.reset_checksum(&mut buf);

        Debug::HelloTx(&iface.name).log();
        self.engine.output_link_local(
            iface,
            buf,
            &ip_view,
            MacAddr::from_multicast_ipv4(ALL_OSPF_ROUTERS),
        );
    }

    fn send_lsu(
        &self,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        seqno: u16,
        advs: &[Advertisement],
    ) {
        let ospf_len = OspfLsuView::packet_size(advs.len());
        let pkt_len = ip::HEADER_SIZE + ospf_len;
        let mut buf = PacketBuffer::new(pkt_len);
        let ip_view = IpView::new(pkt_len);
        ip_view.init_default(
            &mut buf,
            pkt_len as u16,
            IpProtocol::Ospf,
            src,
            dst,
        );

        let ospf_view = OspfView::new(ospf_len);
        ospf_view.init(
            &mut buf,
            OspfType::Lsu,
            ospf_len as u16,
            router_id,
            self.area_id,
        );
        let lsu = OspfLsuView::new(ospf_len);
        lsu.set_seqno(&mut buf, seqno);
        lsu.set_ttl(&mut buf, DEFAULT_LSU_TTL);
        lsu.set_adv_count(&mut buf, advs.len() as u32);
        for (index, (subnet, mask, neighbor_id)) in advs.iter().enumerate() {
            let adv = lsu.advertisement(index as u32);
            adv.set_subnet(&mut buf, *subnet);
            adv.set_subnet_mask(&mut buf, *mask);
            adv.set_router_id(&mut buf, *neighbor_id);
        }
        ospf_view.reset_checksum(&mut buf);
        ip_view.reset_checksum(&mut buf);

        self.engine.output_ip(buf, ip_view);
    }

    /// Wraps an already-encoded OSPF packet in a fresh IP header toward
    /// `dst`.
    fn send_ospf_payload(&self, src: Ipv4Addr, dst: Ipv4Addr, data: &[u8]) {
        let pkt_len = ip::HEADER_SIZE + data.len();
        let mut buf = PacketBuffer::new(pkt_len);
        let ip_view = IpView::new(pkt_len);
        ip_view.init_default(
            &mut buf,
            pkt_len as u16,
            IpProtocol::Ospf,
            src,
            dst,
        );
        let data_offset = ip_view.offset(&buf) + ip::HEADER_SIZE;
        buf.bytes_mut(data_offset, data.len()).copy_from_slice(data);
        ip_view.reset_checksum(&mut buf);
        self.engine.output_ip(buf, ip_view);
    }
}
