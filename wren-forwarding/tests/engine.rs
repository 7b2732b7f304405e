//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use wren_forwarding::arp_cache::{ArpCache, EntryKind};
use wren_forwarding::arp_queue::ArpQueue;
use wren_forwarding::engine::{Engine, FrameOutput};
use wren_forwarding::interface::{Interface, InterfaceMap, InterfaceType};
use wren_forwarding::rib::{Route, RouteKind, RoutingTable};
use wren_forwarding::tunnel::{Tunnel, TunnelMap, TunnelMode};
use wren_packet::arp::{self, ArpOperation};
use wren_packet::buffer::PacketBuffer;
use wren_packet::ethernet::{self, EtherType, EthernetView};
use wren_packet::icmp::{self, IcmpType, IcmpView, UnreachableCode};
use wren_packet::ip::{self, IpFlags, IpProtocol, IpView};
use wren_packet::view::{PacketView, View};
use wren_utils::mac_addr::MacAddr;

const MAC_RTR: [u8; 6] = [0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01];
const MAC_HOST: [u8; 6] = [0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0x02];

fn addr(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn mac(bytes: [u8; 6]) -> MacAddr {
    MacAddr::from(bytes)
}

// Records every frame the engine emits.
#[derive(Debug, Default)]
struct Recorder {
    frames: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FrameOutput for Recorder {
    fn output(&self, iface: &Arc<Interface>, frame: &[u8]) {
        self.frames
            .lock()
            .unwrap()
            .push((iface.name.clone(), frame.to_vec()));
    }
}

impl Recorder {
    fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.frames.lock().unwrap())
    }
}

struct Rig {
    engine: Arc<Engine>,
    recorder: Arc<Recorder>,
}

// One router with eth0 = 10.0.0.1/24 and a connected route.
fn rig() -> Rig {
    let interfaces = Arc::new(InterfaceMap::new());
    let eth0 = Interface::new("eth0", InterfaceType::Hardware);
    eth0.set_mac(mac(MAC_RTR));
    eth0.set_addr(addr("10.0.0.1"), addr("255.255.255.0"));
    interfaces.insert(eth0.clone());

    let rib = Arc::new(RoutingTable::new());
    rib.insert(Route::new(
        addr("10.0.0.0"),
        addr("255.255.255.0"),
        Ipv4Addr::UNSPECIFIED,
        eth0,
        RouteKind::Static,
    ));

    let recorder = Arc::new(Recorder::default());
    let engine = Engine::new(
        interfaces,
        rib,
        Arc::new(ArpCache::new()),
        Arc::new(ArpQueue::new()),
        Arc::new(TunnelMap::new()),
        recorder.clone(),
    );
    Rig { engine, recorder }
}

// Builds an Ethernet + IP frame carrying `payload`.
fn ip_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: IpProtocol,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    let pkt_len = ip::HEADER_SIZE + payload.len();
    let frame_len = ethernet::HEADER_SIZE + pkt_len;
    let mut buf = PacketBuffer::new(frame_len);
    let eth = EthernetView::new(frame_len);
    eth.set_src(&mut buf, mac(MAC_HOST));
    eth.set_dst(&mut buf, mac(MAC_RTR));
    eth.set_ethertype(&mut buf, EtherType::Ip);

    let PacketView::Ip(ip_view) = eth.payload(&buf) else {
        panic!("expected an IP view");
    };
    ip_view.init_default(&mut buf, pkt_len as u16, protocol, src, dst);
    ip_view.set_ttl(&mut buf, ttl);
    let data_offset = ip_view.offset(&buf) + ip::HEADER_SIZE;
    buf.bytes_mut(data_offset, payload.len()).copy_from_slice(payload);
    ip_view.reset_checksum(&mut buf);
    eth.bytes(&buf).to_vec()
}

// Parses an emitted frame into (buffer, eth view, ip view).
fn parse_ip_frame(frame: &[u8]) -> (PacketBuffer, EthernetView, IpView) {
    let (buf, reverse_offset) = PacketBuffer::with_frame(frame);
    let eth = EthernetView::new(reverse_offset);
    assert_eq!(eth.ethertype(&buf), Some(EtherType::Ip));
    let PacketView::Ip(ip_view) = eth.payload(&buf) else {
        panic!("expected an IP view");
    };
    assert!(ip_view.valid(&buf), "emitted IP packet must validate");
    (buf, eth, ip_view)
}

#[test]
fn arp_resolution_round_trip() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();

    // A packet for a directly connected host with an empty ARP cache.
    let frame = ip_frame(
        addr("192.0.2.50"),
        addr("10.0.0.2"),
        IpProtocol::Udp,
        64,
        b"datadata",
    );
    rig.engine.receive_frame(&eth0, &frame);

    // (a) An ARP request was broadcast.
    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (iface, request) = &frames[0];
    assert_eq!(iface, "eth0");
    let (req_buf, reverse_offset) = PacketBuffer::with_frame(request);
    let req_eth = EthernetView::new(reverse_offset);
    assert_eq!(req_eth.dst(&req_buf), MacAddr::BROADCAST);
    assert_eq!(req_eth.src(&req_buf), mac(MAC_RTR));
    let PacketView::Arp(req_arp) = req_eth.payload(&req_buf) else {
        panic!("expected an ARP view");
    };
    assert!(req_arp.valid(&req_buf));
    assert_eq!(req_arp.operation(&req_buf), Some(ArpOperation::Request));
    assert_eq!(req_arp.sender_hw_addr(&req_buf), mac(MAC_RTR));
    assert_eq!(req_arp.sender_proto_addr(&req_buf), addr("10.0.0.1"));
    assert_eq!(req_arp.target_proto_addr(&req_buf), addr("10.0.0.2"));

    // The original packet is parked, not emitted.
    assert!(rig.engine.arp_queue().contains(addr("10.0.0.2")));

    // (b) The reply releases the queued packet with the resolved MAC.
    let reply_len = ethernet::HEADER_SIZE + arp::PACKET_SIZE;
    let mut reply_buf = PacketBuffer::new(reply_len);
    let reply_eth = EthernetView::new(reply_len);
    reply_eth.set_src(&mut reply_buf, mac(MAC_HOST));
    reply_eth.set_dst(&mut reply_buf, mac(MAC_RTR));
    reply_eth.set_ethertype(&mut reply_buf, EtherType::Arp);
    let PacketView::Arp(reply_arp) = reply_eth.payload(&reply_buf) else {
        panic!("expected an ARP view");
    };
    reply_arp.init(&mut reply_buf);
    reply_arp.set_operation(&mut reply_buf, ArpOperation::Reply);
    reply_arp.set_sender_hw_addr(&mut reply_buf, mac(MAC_HOST));
    reply_arp.set_sender_proto_addr(&mut reply_buf, addr("10.0.0.2"));
    reply_arp.set_target_hw_addr(&mut reply_buf, mac(MAC_RTR));
    reply_arp.set_target_proto_addr(&mut reply_buf, addr("10.0.0.1"));
    rig.engine
        .receive_frame(&eth0, reply_eth.bytes(&reply_buf));

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (out_buf, out_eth, out_ip) = parse_ip_frame(&frames[0].1);
    assert_eq!(out_eth.dst(&out_buf), mac(MAC_HOST));
    assert_eq!(out_eth.src(&out_buf), mac(MAC_RTR));
    assert_eq!(out_ip.dst(&out_buf), addr("10.0.0.2"));
    // Forwarded once: TTL went down by one.
    assert_eq!(out_ip.ttl(&out_buf), 63);
    assert!(rig.engine.arp_queue().is_empty());

    // The mapping is cached for the next packet.
    assert_eq!(
        rig.engine.arp_cache().lookup(addr("10.0.0.2")).unwrap().mac,
        mac(MAC_HOST)
    );
}

#[test]
fn ttl_expiry_generates_time_exceeded() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.engine
        .arp_cache()
        .insert(addr("10.0.0.2"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    let frame = ip_frame(
        addr("10.0.0.2"),
        addr("8.8.8.8"),
        IpProtocol::Udp,
        1,
        b"hi",
    );
    rig.engine.receive_frame(&eth0, &frame);

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (buf, _eth, ip_view) = parse_ip_frame(&frames[0].1);
    assert_eq!(ip_view.src(&buf), addr("10.0.0.1"));
    assert_eq!(ip_view.dst(&buf), addr("10.0.0.2"));
    assert_eq!(ip_view.protocol(&buf), Some(IpProtocol::Icmp));
    assert_eq!(ip_view.flags(&buf), IpFlags::DF);

    let PacketView::Icmp(icmp_view) = ip_view.payload(&buf) else {
        panic!("expected an ICMP view");
    };
    assert!(icmp_view.valid(&buf));
    assert_eq!(icmp_view.icmp_type(&buf), Some(IcmpType::TimeExceeded));
    assert_eq!(icmp_view.code(&buf), icmp::CODE_TTL_EXCEEDED);

    // Quote: the offending header (with its arrival TTL restored) plus the
    // full 2-byte payload.
    let quote_offset = icmp_view.offset(&buf) + icmp::HEADER_SIZE;
    let quote = buf.bytes(quote_offset, 22);
    assert_eq!(quote[8], 1); // quoted TTL
    assert_eq!(&quote[20..], b"hi");
}

#[test]
fn oversize_packet_is_fragmented() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.engine
        .arp_cache()
        .insert(addr("10.0.0.2"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    let pattern: Vec<u8> = (0..1980u32).map(|i| (i % 251) as u8).collect();
    let frame = ip_frame(
        addr("192.0.2.50"),
        addr("10.0.0.2"),
        IpProtocol::Udp,
        64,
        &pattern,
    );
    rig.engine.receive_frame(&eth0, &frame);

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 2);

    let (buf1, _, frag1) = parse_ip_frame(&frames[0].1);
    let (buf2, _, frag2) = parse_ip_frame(&frames[1].1);

    assert_eq!(frag1.total_len(&buf1), 1500);
    assert_eq!(frag1.fragment_offset(&buf1), 0);
    assert_eq!(frag1.flags(&buf1), IpFlags::MF);

    assert_eq!(frag2.total_len(&buf2), 520);
    assert_eq!(frag2.fragment_offset(&buf2), 185);
    assert_eq!(frag2.flags(&buf2), IpFlags::empty());

    // Both fragments share the original checksum as identification.
    assert_eq!(
        frag1.identification(&buf1),
        frag2.identification(&buf2)
    );

    // Reassembling in offset order yields the original payload.
    let mut reassembled = Vec::new();
    reassembled.extend_from_slice(buf1.bytes(
        frag1.offset(&buf1) + ip::HEADER_SIZE,
        1480,
    ));
    reassembled.extend_from_slice(buf2.bytes(
        frag2.offset(&buf2) + ip::HEADER_SIZE,
        500,
    ));
    assert_eq!(reassembled, pattern);
}

#[test]
fn exactly_mtu_is_not_fragmented() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.engine
        .arp_cache()
        .insert(addr("10.0.0.2"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    let payload = vec![0x5a; ethernet::MTU - ip::HEADER_SIZE];
    let frame = ip_frame(
        addr("192.0.2.50"),
        addr("10.0.0.2"),
        IpProtocol::Udp,
        64,
        &payload,
    );
    rig.engine.receive_frame(&eth0, &frame);

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (buf, _, ip_view) = parse_ip_frame(&frames[0].1);
    assert_eq!(ip_view.total_len(&buf) as usize, ethernet::MTU);
    assert_eq!(ip_view.flags(&buf), IpFlags::empty());
}

#[test]
fn df_oversize_packet_triggers_frag_required() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.engine
        .arp_cache()
        .insert(addr("10.0.0.2"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    // Build the oversize frame with DF set.
    let payload = vec![0x5a; 1980];
    let pkt_len = ip::HEADER_SIZE + payload.len();
    let frame_len = ethernet::HEADER_SIZE + pkt_len;
    let mut buf = PacketBuffer::new(frame_len);
    let eth = EthernetView::new(frame_len);
    eth.set_src(&mut buf, mac(MAC_HOST));
    eth.set_dst(&mut buf, mac(MAC_RTR));
    eth.set_ethertype(&mut buf, EtherType::Ip);
    let PacketView::Ip(ip_view) = eth.payload(&buf) else {
        panic!("expected an IP view");
    };
    ip_view.init_default(
        &mut buf,
        pkt_len as u16,
        IpProtocol::Udp,
        addr("10.0.0.2"),
        addr("10.0.0.7"),
    );
    ip_view.set_flags(&mut buf, IpFlags::DF);
    ip_view.reset_checksum(&mut buf);
    rig.engine.receive_frame(&eth0, eth.bytes(&buf));

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (out_buf, _, out_ip) = parse_ip_frame(&frames[0].1);
    assert_eq!(out_ip.dst(&out_buf), addr("10.0.0.2"));
    let PacketView::Icmp(icmp_view) = out_ip.payload(&out_buf) else {
        panic!("expected an ICMP view");
    };
    assert_eq!(icmp_view.icmp_type(&out_buf), Some(IcmpType::DestUnreachable));
    assert_eq!(icmp_view.code(&out_buf), UnreachableCode::FragRequired as u8);
}

#[test]
fn echo_request_to_router_is_answered() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.engine
        .arp_cache()
        .insert(addr("10.0.0.50"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    // Echo request with identifier/sequence 0xbeef/7.
    let pkt_len = ip::HEADER_SIZE + icmp::HEADER_SIZE + 8;
    let frame_len = ethernet::HEADER_SIZE + pkt_len;
    let mut buf = PacketBuffer::new(frame_len);
    let eth = EthernetView::new(frame_len);
    eth.set_src(&mut buf, mac(MAC_HOST));
    eth.set_dst(&mut buf, mac(MAC_RTR));
    eth.set_ethertype(&mut buf, EtherType::Ip);
    let PacketView::Ip(ip_view) = eth.payload(&buf) else {
        panic!("expected an IP view");
    };
    ip_view.init_default(
        &mut buf,
        pkt_len as u16,
        IpProtocol::Icmp,
        addr("10.0.0.50"),
        addr("10.0.0.1"),
    );
    let icmp_view = IcmpView::new(pkt_len - ip::HEADER_SIZE);
    icmp_view.set_icmp_type(&mut buf, IcmpType::EchoRequest);
    icmp_view.set_code(&mut buf, 0);
    icmp_view.set_rest(&mut buf, 0xbeef_0007);
    let data_offset = icmp_view.offset(&buf) + icmp::HEADER_SIZE;
    buf.bytes_mut(data_offset, 8).copy_from_slice(b"pingdata");
    icmp_view.reset_checksum(&mut buf);
    ip_view.reset_checksum(&mut buf);
    rig.engine.receive_frame(&eth0, eth.bytes(&buf));

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (out_buf, out_eth, out_ip) = parse_ip_frame(&frames[0].1);
    assert_eq!(out_eth.dst(&out_buf), mac(MAC_HOST));
    assert_eq!(out_ip.src(&out_buf), addr("10.0.0.1"));
    assert_eq!(out_ip.dst(&out_buf), addr("10.0.0.50"));
    let PacketView::Icmp(reply) = out_ip.payload(&out_buf) else {
        panic!("expected an ICMP view");
    };
    assert!(reply.valid(&out_buf));
    assert_eq!(reply.icmp_type(&out_buf), Some(IcmpType::EchoReply));
    // Identifier and sequence survive the swap.
    assert_eq!(reply.rest(&out_buf), 0xbeef_0007);
}

#[test]
fn udp_to_router_is_protocol_unreachable() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.engine
        .arp_cache()
        .insert(addr("10.0.0.50"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    let frame = ip_frame(
        addr("10.0.0.50"),
        addr("10.0.0.1"),
        IpProtocol::Udp,
        64,
        b"dnsquery",
    );
    rig.engine.receive_frame(&eth0, &frame);

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (buf, _, ip_view) = parse_ip_frame(&frames[0].1);
    assert_eq!(ip_view.dst(&buf), addr("10.0.0.50"));
    let PacketView::Icmp(icmp_view) = ip_view.payload(&buf) else {
        panic!("expected an ICMP view");
    };
    assert_eq!(icmp_view.icmp_type(&buf), Some(IcmpType::DestUnreachable));
    assert_eq!(icmp_view.code(&buf), UnreachableCode::Protocol as u8);
}

#[test]
fn no_route_suppresses_icmp_on_icmp() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.engine
        .arp_cache()
        .insert(addr("10.0.0.2"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    // A destination-unreachable message toward an unroutable address.
    let pkt_len = ip::HEADER_SIZE + icmp::HEADER_SIZE + 4;
    let frame_len = ethernet::HEADER_SIZE + pkt_len;
    let mut buf = PacketBuffer::new(frame_len);
    let eth = EthernetView::new(frame_len);
    eth.set_src(&mut buf, mac(MAC_HOST));
    eth.set_dst(&mut buf, mac(MAC_RTR));
    eth.set_ethertype(&mut buf, EtherType::Ip);
    let PacketView::Ip(ip_view) = eth.payload(&buf) else {
        panic!("expected an IP view");
    };
    ip_view.init_default(
        &mut buf,
        pkt_len as u16,
        IpProtocol::Icmp,
        addr("10.0.0.2"),
        addr("203.0.113.99"),
    );
    let icmp_view = IcmpView::new(pkt_len - ip::HEADER_SIZE);
    icmp_view.init_dest_unreachable(&mut buf, UnreachableCode::Host);
    icmp_view.reset_checksum(&mut buf);
    ip_view.reset_checksum(&mut buf);
    rig.engine.receive_frame(&eth0, eth.bytes(&buf));

    // No route and no ICMP-on-ICMP: nothing leaves the router.
    assert!(rig.recorder.take().is_empty());

    // The same packet as UDP does elicit a host unreachable.
    let frame = ip_frame(
        addr("10.0.0.2"),
        addr("203.0.113.99"),
        IpProtocol::Udp,
        64,
        b"data",
    );
    rig.engine.receive_frame(&eth0, &frame);
    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (out_buf, _, out_ip) = parse_ip_frame(&frames[0].1);
    let PacketView::Icmp(out_icmp) = out_ip.payload(&out_buf) else {
        panic!("expected an ICMP view");
    };
    assert_eq!(out_icmp.code(&out_buf), UnreachableCode::Host as u8);
}

#[test]
fn arp_request_for_router_address_is_answered() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();

    let frame_len = ethernet::HEADER_SIZE + arp::PACKET_SIZE;
    let mut buf = PacketBuffer::new(frame_len);
    let eth = EthernetView::new(frame_len);
    eth.set_src(&mut buf, mac(MAC_HOST));
    eth.set_dst(&mut buf, MacAddr::BROADCAST);
    eth.set_ethertype(&mut buf, EtherType::Arp);
    let PacketView::Arp(request) = eth.payload(&buf) else {
        panic!("expected an ARP view");
    };
    request.init(&mut buf);
    request.set_operation(&mut buf, ArpOperation::Request);
    request.set_sender_hw_addr(&mut buf, mac(MAC_HOST));
    request.set_sender_proto_addr(&mut buf, addr("10.0.0.50"));
    request.set_target_hw_addr(&mut buf, MacAddr::ZERO);
    request.set_target_proto_addr(&mut buf, addr("10.0.0.1"));
    rig.engine.receive_frame(&eth0, eth.bytes(&buf));

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (out_buf, reverse_offset) = PacketBuffer::with_frame(&frames[0].1);
    let out_eth = EthernetView::new(reverse_offset);
    assert_eq!(out_eth.src(&out_buf), mac(MAC_RTR));
    let PacketView::Arp(reply) = out_eth.payload(&out_buf) else {
        panic!("expected an ARP view");
    };
    assert_eq!(reply.operation(&out_buf), Some(ArpOperation::Reply));
    assert_eq!(reply.sender_hw_addr(&out_buf), mac(MAC_RTR));
    assert_eq!(reply.sender_proto_addr(&out_buf), addr("10.0.0.1"));
    assert_eq!(reply.target_hw_addr(&out_buf), mac(MAC_HOST));
    assert_eq!(reply.target_proto_addr(&out_buf), addr("10.0.0.50"));

    // The requester was learned as a dynamic entry.
    let entry = rig.engine.arp_cache().lookup(addr("10.0.0.50")).unwrap();
    assert_eq!(entry.mac, mac(MAC_HOST));
    assert_eq!(entry.kind, EntryKind::Dynamic);
}

#[test]
fn gre_encapsulation_and_decapsulation() {
    let rig = rig();
    let engine = &rig.engine;
    let eth0 = engine.interfaces().get("eth0").unwrap();
    eth0.set_addr(addr("192.0.2.1"), addr("255.255.255.0"));

    // tun0 carries 10.9.9.0/24 toward remote 192.0.2.9.
    let tun0 = Interface::new("tun0", InterfaceType::Virtual);
    engine.interfaces().insert(tun0.clone());
    engine.tunnels().insert(Tunnel {
        name: "tun0".to_owned(),
        iface: tun0.clone(),
        remote: addr("192.0.2.9"),
        mode: TunnelMode::Gre,
    });
    engine.rib().insert(Route::new(
        addr("192.0.2.0"),
        addr("255.255.255.0"),
        Ipv4Addr::UNSPECIFIED,
        eth0.clone(),
        RouteKind::Static,
    ));
    engine.rib().insert(Route::new(
        addr("10.9.9.0"),
        addr("255.255.255.0"),
        Ipv4Addr::UNSPECIFIED,
        tun0,
        RouteKind::Static,
    ));
    engine
        .arp_cache()
        .insert(addr("192.0.2.9"), mac(MAC_HOST), EntryKind::Static)
        .unwrap();

    // Encapsulation: a transit packet routed into the tunnel.
    let frame = ip_frame(
        addr("192.0.2.50"),
        addr("10.9.9.9"),
        IpProtocol::Udp,
        64,
        b"tunneled",
    );
    engine.receive_frame(&eth0, &frame);

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (buf, _, outer) = parse_ip_frame(&frames[0].1);
    assert_eq!(outer.src(&buf), addr("192.0.2.1"));
    assert_eq!(outer.dst(&buf), addr("192.0.2.9"));
    assert_eq!(outer.protocol(&buf), Some(IpProtocol::Gre));
    let PacketView::Gre(gre_view) = outer.payload(&buf) else {
        panic!("expected a GRE view");
    };
    assert!(gre_view.valid(&buf));
    let PacketView::Ip(inner) = gre_view.payload(&buf) else {
        panic!("expected an inner IP view");
    };
    assert_eq!(inner.dst(&buf), addr("10.9.9.9"));
    assert_eq!(inner.ttl(&buf), 63);

    // Decapsulation: mirror the outer addresses as the remote would and
    // feed the packet back in. The inner packet re-enters the outbound
    // path (and is re-encapsulated toward the remote).
    let mut mirrored_buf = buf.clone();
    outer.set_src(&mut mirrored_buf, addr("192.0.2.9"));
    outer.set_dst(&mut mirrored_buf, addr("192.0.2.1"));
    outer.reset_checksum(&mut mirrored_buf);
    let mirrored = outer.bytes(&mirrored_buf).to_vec();

    // Re-frame and inject.
    let frame_len = ethernet::HEADER_SIZE + mirrored.len();
    let mut in_buf = PacketBuffer::new(frame_len);
    let in_eth = EthernetView::new(frame_len);
    in_eth.set_src(&mut in_buf, mac(MAC_HOST));
    in_eth.set_dst(&mut in_buf, mac(MAC_RTR));
    in_eth.set_ethertype(&mut in_buf, EtherType::Ip);
    let data_offset = in_buf.size() - frame_len + ethernet::HEADER_SIZE;
    in_buf
        .bytes_mut(data_offset, mirrored.len())
        .copy_from_slice(&mirrored);
    engine.receive_frame(&eth0, in_eth.bytes(&in_buf));

    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    let (buf2, _, outer2) = parse_ip_frame(&frames[0].1);
    assert_eq!(outer2.dst(&buf2), addr("192.0.2.9"));
    let PacketView::Gre(gre2) = outer2.payload(&buf2) else {
        panic!("expected a GRE view");
    };
    let PacketView::Ip(inner2) = gre2.payload(&buf2) else {
        panic!("expected an inner IP view");
    };
    // Around the loop once more: decapsulated, forwarded, re-wrapped.
    assert_eq!(inner2.dst(&buf2), addr("10.9.9.9"));
    assert_eq!(inner2.ttl(&buf2), 62);
}
