//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};
use wren_packet::arp::{self, ArpOperation, ArpView};
use wren_packet::buffer::PacketBuffer;
use wren_packet::ethernet::{self, EtherType, EthernetView};
use wren_packet::gre::{self, GreView};
use wren_packet::icmp::{self, IcmpType, IcmpView, UnreachableCode};
use wren_packet::ip::{self, IpFlags, IpProtocol, IpView};
use wren_packet::ospf::OspfView;
use wren_packet::view::{PacketView, View};
use wren_utils::mac_addr::MacAddr;

use crate::arp_cache::{ArpCache, EntryKind};
use crate::arp_queue::{ArpQueue, PendingFrame};
use crate::error::Error;
use crate::interface::{Interface, InterfaceMap};
use crate::rib::RoutingTable;
use crate::tunnel::{TunnelMap, TunnelMode};

/// Maximum inner bytes per fragment: MTU minus the IP header, divisible
/// by 8.
const MAX_FRAGMENT_PAYLOAD: usize = 1480;

/// Seam to the interface drivers. Implementations log transmit errors at
/// warning level and drop the frame; they never disable the interface.
pub trait FrameOutput: Send + Sync {
    fn output(&self, iface: &Arc<Interface>, frame: &[u8]);
}

/// An OSPF packet crossing from the forwarding engine to the routing
/// protocol, with its enclosing-view chain intact.
#[derive(Debug)]
pub struct OspfPacketMsg {
    pub buf: PacketBuffer,
    pub view: OspfView,
    pub iface: Arc<Interface>,
}

/// A TCP segment addressed to the router, handed off to the external
/// transport stack.
#[derive(Debug)]
pub struct TransportMsg {
    pub buf: PacketBuffer,
    pub view: IpView,
    pub iface: Arc<Interface>,
}

enum IcmpError {
    TimeExceeded,
    Unreachable(UnreachableCode),
}

/// The control plane: parses inbound frames, answers ARP and ICMP echo,
/// resolves next hops, encapsulates over tunnels, fragments, and hands
/// finished frames to the driver.
pub struct Engine {
    interfaces: Arc<InterfaceMap>,
    rib: Arc<RoutingTable>,
    arp_cache: Arc<ArpCache>,
    arp_queue: Arc<ArpQueue>,
    tunnels: Arc<TunnelMap>,
    driver: Arc<dyn FrameOutput>,
    // Non-owning links into the protocol layer, wired after construction.
    ospf_tx: Mutex<Option<UnboundedSender<OspfPacketMsg>>>,
    transport_tx: Mutex<Option<UnboundedSender<TransportMsg>>>,
}

// ===== impl Engine =====

impl Engine {
    pub fn new(
        interfaces: Arc<InterfaceMap>,
        rib: Arc<RoutingTable>,
        arp_cache: Arc<ArpCache>,
        arp_queue: Arc<ArpQueue>,
        tunnels: Arc<TunnelMap>,
        driver: Arc<dyn FrameOutput>,
    ) -> Arc<Engine> {
        Arc::new(Engine {
            interfaces,
            rib,
            arp_cache,
            arp_queue,
            tunnels,
            driver,
            ospf_tx: Mutex::new(None),
            transport_tx: Mutex::new(None),
        })
    }

    pub fn interfaces(&self) -> &Arc<InterfaceMap> {
        &self.interfaces
    }

    pub fn rib(&self) -> &Arc<RoutingTable> {
        &self.rib
    }

    pub fn arp_cache(&self) -> &Arc<ArpCache> {
        &self.arp_cache
    }

    pub fn arp_queue(&self) -> &Arc<ArpQueue> {
        &self.arp_queue
    }

    pub fn tunnels(&self) -> &Arc<TunnelMap> {
        &self.tunnels
    }

    pub fn set_ospf_handler(&self, tx: UnboundedSender<OspfPacketMsg>) {
        *self.ospf_tx.lock().unwrap() = Some(tx);
    }

    pub fn set_transport_handler(&self, tx: UnboundedSender<TransportMsg>) {
        *self.transport_tx.lock().unwrap() = Some(tx);
    }

    /// Entry point for a raw frame read off `iface`.
    pub fn receive_frame(&self, iface: &Arc<Interface>, frame: &[u8]) {
        if frame.len() < ethernet::HEADER_SIZE {
            debug!(iface = %iface.name, len = frame.len(), "runt frame");
            return;
        }

        // Strip link-level padding so tail-anchored views span exact packet
        // lengths: for IP the true frame length follows from the header.
        let mut frame = frame;
        if u16::from_be_bytes([frame[12], frame[13]]) == EtherType::Ip as u16
            && frame.len() >= ethernet::HEADER_SIZE + ip::HEADER_SIZE
        {
            let total_len =
                u16::from_be_bytes([frame[16], frame[17]]) as usize;
            let exact = ethernet::HEADER_SIZE + total_len;
            if total_len >= ip::HEADER_SIZE && exact <= frame.len() {
                frame = &frame[..exact];
            }
        }

        let (buf, reverse_offset) = PacketBuffer::with_frame(frame);
        let eth = EthernetView::new(reverse_offset);
        self.dispatch(buf, PacketView::Ethernet(eth), iface);
    }

    /// Hands a parsed view to its handler. The engine owns the buffer until
    /// the frame is submitted to the driver or parked on the ARP queue.
    pub fn dispatch(
        &self,
        buf: PacketBuffer,
        view: PacketView,
        iface: &Arc<Interface>,
    ) {
        match view {
            PacketView::Ethernet(eth) => self.handle_ethernet(buf, eth, iface),
            PacketView::Arp(arp) => self.handle_arp(buf, arp, iface),
            PacketView::Ip(ip) => self.handle_ip(buf, ip, iface),
            PacketView::Icmp(icmp) => self.handle_icmp(buf, icmp, iface),
            PacketView::Gre(gre) => self.handle_gre(buf, gre, iface),
            PacketView::Ospf(ospf) => self.handle_ospf(buf, ospf, iface),
            PacketView::OspfHello(_)
            | PacketView::OspfLsu(_)
            | PacketView::LsuAdvertisement(_) => {
                // Derived OSPF views only exist inside the OSPF router.
                debug!(kind = view.kind(), "unexpected view in engine");
            }
            PacketView::Unknown(_) => {
                debug!(iface = %iface.name, "unknown payload, dropping");
            }
        }
    }

    fn handle_ethernet(
        &self,
        buf: PacketBuffer,
        eth: EthernetView,
        iface: &Arc<Interface>,
    ) {
        if let Err(error) = eth.validate(&buf) {
            debug!(%error, "invalid ethernet frame, dropping");
            return;
        }
        let payload = eth.payload(&buf);
        self.dispatch(buf, payload, iface);
    }

    // ARP input: refresh-then-add per the merge-flag rule, answer requests
    // in place, drain the pending queue on replies.
    fn handle_arp(
        &self,
        mut buf: PacketBuffer,
        arp: ArpView,
        iface: &Arc<Interface>,
    ) {
        if let Err(error) = arp.validate(&buf) {
            debug!(%error, "invalid ARP packet, dropping");
            return;
        }

        let sender_mac = arp.sender_hw_addr(&buf);
        let sender_ip = arp.sender_proto_addr(&buf);
        let target_ip = arp.target_proto_addr(&buf);

        // Update an existing <sender IP, sender MAC> mapping regardless of
        // the target.
        let merge = self.arp_cache.refresh(sender_ip, sender_mac);

        // Are we the target of the ARP packet?
        if self.interfaces.by_addr(target_ip).is_none() {
            debug!(%target_ip, "ARP packet is not for us, ignoring");
            return;
        }

        if !merge
            && let Err(error) =
                self.arp_cache.insert(sender_ip, sender_mac, EntryKind::Dynamic)
        {
            error.log();
        }

        match arp.operation(&buf) {
            Some(ArpOperation::Request) => {
                debug!(%sender_ip, %target_ip, iface = %iface.name,
                       "answering ARP request");

                // Swap the hardware and protocol fields, then answer as the
                // receiving interface.
                arp.set_target_hw_addr(&mut buf, sender_mac);
                arp.set_target_proto_addr(&mut buf, sender_ip);
                arp.set_sender_hw_addr(&mut buf, iface.mac());
                arp.set_sender_proto_addr(&mut buf, iface.addr());
                arp.set_operation(&mut buf, ArpOperation::Reply);

                // Rewrite the enclosing frame's source and send it back out
                // the same interface.
                if let Some(PacketView::Ethernet(eth)) = arp.enclosing() {
                    let eth = eth.clone();
                    eth.set_src(&mut buf, iface.mac());
                    self.driver.output(iface, eth.bytes(&buf));
                }
            }
            Some(ArpOperation::Reply) => {
                debug!(%sender_ip, %sender_mac, "ARP reply received");
                if !self.arp_cache.refresh(sender_ip, sender_mac)
                    && let Err(error) = self.arp_cache.insert(
                        sender_ip,
                        sender_mac,
                        EntryKind::Dynamic,
                    )
                {
                    error.log();
                }
                self.send_enqueued(sender_ip, sender_mac);
            }
            None => {}
        }
    }

    // IP input: consume locally addressed packets, forward the rest.
    fn handle_ip(
        &self,
        mut buf: PacketBuffer,
        ip: IpView,
        iface: &Arc<Interface>,
    ) {
        if let Err(error) = ip.validate(&buf) {
            debug!(%error, "invalid IP packet, dropping");
            return;
        }

        let dst = ip.dst(&buf);
        let local =
            self.interfaces.by_addr(dst).is_some() || dst.is_multicast();
        if !local {
            // Transit: one TTL decrement on ingress, then the outbound path.
            ip.dec_ttl(&mut buf);
            ip.reset_checksum(&mut buf);
            self.output_ip(buf, ip);
            return;
        }

        match ip.protocol(&buf) {
            Some(IpProtocol::Udp) => {
                debug!(src = %ip.src(&buf), "UDP to the router");
                self.send_icmp_error(
                    buf,
                    &ip,
                    IcmpError::Unreachable(UnreachableCode::Protocol),
                );
            }
            Some(IpProtocol::Tcp) => {
                let tx = self.transport_tx.lock().unwrap().clone();
                match tx {
                    Some(tx) => {
                        info!(src = %ip.src(&buf), dst = %dst,
                              iface = %iface.name, "TCP in");
                        let _ = tx.send(TransportMsg {
                            buf,
                            view: ip,
                            iface: iface.clone(),
                        });
                    }
                    None => {
                        debug!("no transport stack attached, dropping TCP");
                    }
                }
            }
            Some(IpProtocol::Icmp)
            | Some(IpProtocol::Gre)
            | Some(IpProtocol::Ospf) => {
                let payload = ip.payload(&buf);
                self.dispatch(buf, payload, iface);
            }
            _ => {
                debug!(proto = ip.protocol_raw(&buf),
                       "unhandled protocol to the router, dropping");
            }
        }
    }

    fn handle_icmp(
        &self,
        buf: PacketBuffer,
        icmp: IcmpView,
        iface: &Arc<Interface>,
    ) {
        if let Err(error) = icmp.validate(&buf) {
            debug!(%error, "invalid ICMP packet, dropping");
            return;
        }
        let Some(PacketView::Ip(ip)) = icmp.enclosing().cloned() else {
            debug!("ICMP view without an enclosing IP packet");
            return;
        };

        info!(src = %ip.src(&buf), dst = %ip.dst(&buf), iface = %iface.name,
              "ICMP in");

        if icmp.icmp_type(&buf) == Some(IcmpType::EchoRequest) {
            self.send_echo_reply(buf, ip, icmp);
        }
    }

    fn handle_gre(
        &self,
        buf: PacketBuffer,
        gre: GreView,
        iface: &Arc<Interface>,
    ) {
        if let Err(error) = gre.validate(&buf) {
            debug!(%error, "invalid GRE packet, dropping");
            return;
        }
        let Some(PacketView::Ip(outer)) = gre.enclosing() else {
            debug!("GRE view without an enclosing IP packet");
            return;
        };
        let remote = outer.src(&buf);

        info!(src = %remote, dst = %outer.dst(&buf), iface = %iface.name,
              "GRE in");

        // Do we have a tunnel with this remote?
        let Some(tunnel) = self.tunnels.by_remote(remote) else {
            debug!(%remote, "no GRE tunnel to remote, ignoring");
            return;
        };

        // Continue as if the inner packet arrived on the tunnel's virtual
        // interface.
        let payload = gre.payload(&buf);
        self.dispatch(buf, payload, &tunnel.iface);
    }

    fn handle_ospf(
        &self,
        buf: PacketBuffer,
        view: OspfView,
        iface: &Arc<Interface>,
    ) {
        let tx = self.ospf_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => {
                let _ = tx.send(OspfPacketMsg {
                    buf,
                    view,
                    iface: iface.clone(),
                });
            }
            None => {
                error!("OSPF router is not attached, dropping packet");
            }
        }
    }

    /// The outbound path for an IP packet the router did not originate the
    /// Ethernet layer for yet. ICMP errors are generated here when the
    /// packet cannot be forwarded.
    pub fn output_ip(&self, mut buf: PacketBuffer, pkt: IpView) {
        let ttl = pkt.ttl(&buf);
        if ttl < 1 {
            // Quote the packet with its pre-decrement TTL.
            pkt.set_ttl(&mut buf, ttl + 1);
            pkt.reset_checksum(&mut buf);
            self.send_icmp_error(buf, &pkt, IcmpError::TimeExceeded);
            return;
        }

        let dst = pkt.dst(&buf);
        if self.interfaces.by_addr(dst).is_some() {
            debug!(%dst, "outgoing packet destined to this router, ignoring");
            return;
        }

        let Some(route) = self.rib.lpm(dst) else {
            debug!(%dst, "no route");
            if self.is_unreachable_message(&buf, &pkt) {
                // Don't generate ICMP when delivering ICMP errors.
                debug!("avoiding an ICMP-on-ICMP message");
                return;
            }
            self.send_icmp_error(
                buf,
                &pkt,
                IcmpError::Unreachable(UnreachableCode::Host),
            );
            return;
        };

        if route.iface.is_virtual() {
            self.encapsulate(buf, pkt, &route.iface);
            return;
        }

        if pkt.total_len(&buf) as usize > ethernet::MTU {
            self.fragment(buf, pkt);
            return;
        }

        let next_hop = if route.gateway.is_unspecified() {
            dst
        } else {
            route.gateway
        };

        match self.arp_cache.lookup(next_hop) {
            Some(entry) => {
                let eth = EthernetView::prepend(&mut buf, pkt.len());
                eth.set_src(&mut buf, route.iface.mac());
                eth.set_dst(&mut buf, entry.mac);
                eth.set_ethertype(&mut buf, EtherType::Ip);

                debug!(%next_hop, iface = %route.iface.name,
                       "forwarding IP packet");
                self.driver.output(&route.iface, eth.bytes(&buf));
            }
            None => {
                debug!(%next_hop, "ARP cache miss");
                self.send_arp_request_and_enqueue(
                    next_hop,
                    &route.iface,
                    buf,
                    pkt,
                );
            }
        }
    }

    /// Emits a locally built IP packet straight out `iface` with a known
    /// destination MAC, bypassing routing and ARP (HELLO multicast). On a
    /// virtual interface the packet rides the tunnel instead.
    pub fn output_link_local(
        &self,
        iface: &Arc<Interface>,
        mut buf: PacketBuffer,
        pkt: &IpView,
        dst_mac: MacAddr,
    ) {
        if iface.is_virtual() {
            self.encapsulate(buf, pkt.clone(), iface);
            return;
        }
        let eth = EthernetView::prepend(&mut buf, pkt.len());
        eth.set_src(&mut buf, iface.mac());
        eth.set_dst(&mut buf, dst_mac);
        eth.set_ethertype(&mut buf, EtherType::Ip);
        self.driver.output(iface, eth.bytes(&buf));
    }

    /// Sends one ICMP Echo Request toward `dst` (the operator `ping`).
    pub fn send_echo_request(
        &self,
        dst: Ipv4Addr,
        ident: u16,
        seqno: u16,
    ) -> Result<(), Error> {
        let route = self
            .rib
            .lpm(dst)
            .ok_or(Error::RouteNotFound(dst, Ipv4Addr::BROADCAST))?;

        let payload = b"wren echo request payload.......";
        let pkt_len = ip::HEADER_SIZE + icmp::HEADER_SIZE + payload.len();
        let mut buf = PacketBuffer::new(pkt_len);
        let ip_view = IpView::new(pkt_len);
        ip_view.init_default(
            &mut buf,
            pkt_len as u16,
            IpProtocol::Icmp,
            route.iface.addr(),
            dst,
        );
        let icmp_view = IcmpView::new(pkt_len - ip::HEADER_SIZE);
        icmp_view.set_icmp_type(&mut buf, IcmpType::EchoRequest);
        icmp_view.set_code(&mut buf, 0);
        icmp_view.set_rest(&mut buf, (ident as u32) << 16 | seqno as u32);
        let data_offset = icmp_view.offset(&buf) + icmp::HEADER_SIZE;
        buf.bytes_mut(data_offset, payload.len()).copy_from_slice(payload);
        icmp_view.reset_checksum(&mut buf);
        ip_view.reset_checksum(&mut buf);

        self.output_ip(buf, ip_view);
        Ok(())
    }

    // ===== ARP resolution =====

    fn send_arp_request_and_enqueue(
        &self,
        next_hop: Ipv4Addr,
        out_iface: &Arc<Interface>,
        mut buf: PacketBuffer,
        pkt: IpView,
    ) {
        // One request per outstanding next hop; retries are bounded by the
        // queue daemon.
        if self.arp_queue.create(next_hop, out_iface.clone()) {
            let pkt_len = ethernet::HEADER_SIZE + arp::PACKET_SIZE;
            let mut req_buf = PacketBuffer::new(pkt_len);
            let eth = EthernetView::new(pkt_len);
            eth.set_src(&mut req_buf, out_iface.mac());
            eth.set_dst(&mut req_buf, MacAddr::BROADCAST);
            eth.set_ethertype(&mut req_buf, EtherType::Arp);

            let PacketView::Arp(req) = eth.payload(&req_buf) else {
                unreachable!("ARP ethertype parses to an ARP view");
            };
            req.init(&mut req_buf);
            req.set_operation(&mut req_buf, ArpOperation::Request);
            req.set_sender_hw_addr(&mut req_buf, out_iface.mac());
            req.set_sender_proto_addr(&mut req_buf, out_iface.addr());
            req.set_target_hw_addr(&mut req_buf, MacAddr::ZERO);
            req.set_target_proto_addr(&mut req_buf, next_hop);

            debug!(%next_hop, iface = %out_iface.name, "sending ARP request");
            self.driver.output(out_iface, eth.bytes(&req_buf));
        }

        // Park the prepared frame; addresses are filled in at reply time.
        debug!(dst = %pkt.dst(&buf), %next_hop,
               "queueing packet pending ARP reply");
        let eth = EthernetView::prepend(&mut buf, pkt.len());
        eth.set_ethertype(&mut buf, EtherType::Ip);
        self.arp_queue.push(next_hop, PendingFrame { buf, eth });
    }

    fn send_enqueued(&self, addr: Ipv4Addr, mac: MacAddr) {
        let Some((out_iface, frames)) = self.arp_queue.drain(addr) else {
            return;
        };
        debug!(%addr, frames = frames.len(), iface = %out_iface.name,
               "flushing ARP queue");
        for PendingFrame { mut buf, eth } in frames {
            eth.set_src(&mut buf, out_iface.mac());
            eth.set_dst(&mut buf, mac);
            self.driver.output(&out_iface, eth.bytes(&buf));
        }
    }

    // ===== ICMP generation =====

    fn send_echo_reply(
        &self,
        mut buf: PacketBuffer,
        ip: IpView,
        icmp: IcmpView,
    ) {
        let sender = ip.src(&buf);
        let receiver = ip.dst(&buf);
        ip.set_src(&mut buf, receiver);
        ip.set_dst(&mut buf, sender);
        icmp.set_icmp_type(&mut buf, IcmpType::EchoReply);
        icmp.reset_checksum(&mut buf);
        ip.reset_checksum(&mut buf);
        self.output_ip(buf, ip);
    }

    /// Whether the packet is itself an ICMP Destination Unreachable (the
    /// no-ICMP-on-ICMP rule).
    fn is_unreachable_message(&self, buf: &PacketBuffer, pkt: &IpView) -> bool {
        if pkt.protocol(buf) != Some(IpProtocol::Icmp) {
            return false;
        }
        pkt.payload(buf).as_icmp().is_some_and(|inner| {
            inner.icmp_type(buf) == Some(IcmpType::DestUnreachable)
        })
    }

    fn send_icmp_error(
        &self,
        orig_buf: PacketBuffer,
        orig: &IpView,
        kind: IcmpError,
    ) {
        let dst = orig.src(&orig_buf);
        // Source the error from the interface routing back to the sender.
        let Some(route) = self.rib.lpm(dst) else {
            debug!(%dst, "no route for ICMP error, giving up");
            return;
        };

        match &kind {
            IcmpError::TimeExceeded => {
                debug!(%dst, "sending ICMP time exceeded")
            }
            IcmpError::Unreachable(code) => {
                debug!(%dst, ?code, "sending ICMP destination unreachable")
            }
        }

        let pkt_len = icmp::error_packet_len(&orig_buf, orig);
        let mut buf = PacketBuffer::new(pkt_len);
        let (ip_view, icmp_view) = icmp::new_error_views(pkt_len);
        ip_view.init_default(
            &mut buf,
            pkt_len as u16,
            IpProtocol::Icmp,
            route.iface.addr(),
            dst,
        );
        ip_view.set_flags(&mut buf, IpFlags::DF);

        match kind {
            IcmpError::TimeExceeded => icmp_view.init_time_exceeded(&mut buf),
            IcmpError::Unreachable(code) => {
                icmp_view.init_dest_unreachable(&mut buf, code)
            }
        }
        icmp_view.copy_original(&mut buf, &orig_buf, orig);

        icmp_view.reset_checksum(&mut buf);
        ip_view.reset_checksum(&mut buf);
        self.output_ip(buf, ip_view);
    }

    // ===== GRE encapsulation =====

    fn encapsulate(
        &self,
        mut buf: PacketBuffer,
        pkt: IpView,
        out_iface: &Arc<Interface>,
    ) {
        let Some(tunnel) = self.tunnels.get(&out_iface.name) else {
            error!(iface = %out_iface.name,
                   "output interface is virtual but has no tunnel");
            return;
        };
        match tunnel.mode {
            TunnelMode::Gre => {}
        }

        // The physical egress and outer source come from routing toward the
        // remote endpoint.
        let Some(route) = self.rib.lpm(tunnel.remote) else {
            debug!(remote = %tunnel.remote, "no route to tunnel remote");
            return;
        };

        debug!(tunnel = %tunnel.name, remote = %tunnel.remote,
               "encapsulating over GRE");

        let gre_view = GreView::prepend(&mut buf, pkt.len());
        gre_view.init(&mut buf);
        gre_view.reset_checksum(&mut buf);

        let outer = IpView::prepend(&mut buf, gre_view.len());
        let outer_total_len =
            (ip::HEADER_SIZE + gre::HEADER_SIZE) as u16 + pkt.total_len(&buf);
        outer.init_default(
            &mut buf,
            outer_total_len,
            IpProtocol::Gre,
            route.iface.addr(),
            tunnel.remote,
        );
        outer.reset_checksum(&mut buf);

        self.output_ip(buf, outer);
    }

    // ===== fragmentation =====

    fn fragment(&self, buf: PacketBuffer, pkt: IpView) {
        if pkt.flags(&buf).contains(IpFlags::DF) {
            debug!(dst = %pkt.dst(&buf),
                   "oversize packet with DF set, sending fragmentation \
                    required");
            self.send_icmp_error(
                buf,
                &pkt,
                IcmpError::Unreachable(UnreachableCode::FragRequired),
            );
            return;
        }

        // Fragments are correlated by the original header checksum.
        let ident = pkt.checksum(&buf);
        let total_len = pkt.total_len(&buf) as usize;
        let src_data = pkt.offset(&buf) + ip::HEADER_SIZE;

        let mut bytes_left = total_len - ip::HEADER_SIZE;
        let mut offset_blocks: u16 = 0;
        while bytes_left > 0 {
            let payload_len = bytes_left.min(MAX_FRAGMENT_PAYLOAD);
            let last = bytes_left <= MAX_FRAGMENT_PAYLOAD;
            let frag_len = ip::HEADER_SIZE + payload_len;

            let mut frag_buf = PacketBuffer::new(frag_len);
            let frag = IpView::new(frag_len);
            frag.init_default(
                &mut frag_buf,
                frag_len as u16,
                IpProtocol::Icmp, // placeholder, overwritten below
                pkt.src(&buf),
                pkt.dst(&buf),
            );
            frag.set_tos(&mut frag_buf, pkt.tos(&buf));
            frag.set_protocol_raw(&mut frag_buf, pkt.protocol_raw(&buf));
            frag.set_ttl(&mut frag_buf, pkt.ttl(&buf));
            frag.set_identification(&mut frag_buf, ident);
            frag.set_flags(
                &mut frag_buf,
                if last { IpFlags::empty() } else { IpFlags::MF },
            );
            frag.set_fragment_offset(&mut frag_buf, offset_blocks);

            let data = buf
                .bytes(src_data + offset_blocks as usize * 8, payload_len)
                .to_vec();
            let dst_data = frag.offset(&frag_buf) + ip::HEADER_SIZE;
            frag_buf.bytes_mut(dst_data, payload_len).copy_from_slice(&data);

            frag.reset_checksum(&mut frag_buf);

            debug!(offset = offset_blocks, len = payload_len, last,
                   "sending fragment");
            self.output_ip(frag_buf, frag);

            bytes_left -= payload_len;
            offset_blocks += (payload_len / 8) as u16;
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}
