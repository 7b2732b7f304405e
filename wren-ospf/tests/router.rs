//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use wren_forwarding::arp_cache::{ArpCache, EntryKind};
use wren_forwarding::arp_queue::ArpQueue;
use wren_forwarding::engine::{Engine, FrameOutput, OspfPacketMsg};
use wren_forwarding::interface::{Interface, InterfaceMap, InterfaceType};
use wren_forwarding::rib::{Route, RouteKind, RoutingTable};
use wren_forwarding::tunnel::TunnelMap;
use wren_ospf::router::{OspfEvent, OspfRouter};
use wren_ospf::{DEFAULT_AREA_ID, DEFAULT_HELLO_INTERVAL};
use wren_packet::buffer::PacketBuffer;
use wren_packet::ethernet::{EtherType, EthernetView};
use wren_packet::ip::{self, IpProtocol, IpView};
use wren_packet::ospf::{
    self, ALL_OSPF_ROUTERS, OspfHelloView, OspfLsuView, OspfType, OspfView,
};
use wren_packet::view::{PacketView, View};
use wren_utils::mac_addr::MacAddr;

const MAC_RTR: [u8; 6] = [0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01];
const MAC_PEER: [u8; 6] = [0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0x02];

fn addr(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

const MASK_24: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

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
    router: Arc<OspfRouter>,
    recorder: Arc<Recorder>,
}

// Router 1.1.1.1 with eth0 = 10.0.1.1/24; neighbors resolve statically so
// emitted protocol packets reach the recorder.
fn rig() -> Rig {
    let interfaces = Arc::new(InterfaceMap::new());
    let eth0 = Interface::new("eth0", InterfaceType::Hardware);
    eth0.set_mac(MacAddr::from(MAC_RTR));
    eth0.set_addr(addr("10.0.1.1"), MASK_24);
    interfaces.insert(eth0.clone());

    let rib = Arc::new(RoutingTable::new());
    rib.insert(Route::new(
        addr("10.0.1.0"),
        MASK_24,
        Ipv4Addr::UNSPECIFIED,
        eth0,
        RouteKind::Static,
    ));

    let arp_cache = Arc::new(ArpCache::new());
    arp_cache
        .insert(addr("10.0.1.2"), MacAddr::from(MAC_PEER), EntryKind::Static)
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let engine = Engine::new(
        interfaces.clone(),
        rib.clone(),
        arp_cache,
        Arc::new(ArpQueue::new()),
        Arc::new(TunnelMap::new()),
        recorder.clone(),
    );
    let router = OspfRouter::new(
        addr("1.1.1.1"),
        DEFAULT_AREA_ID,
        engine.clone(),
        interfaces,
        rib,
    );
    Rig {
        engine,
        router,
        recorder,
    }
}

// Builds an IP + OSPF HELLO as received from `src` and returns the message
// the engine would enqueue.
fn hello_msg(
    rig: &Rig,
    iface: &str,
    src: Ipv4Addr,
    router_id: Ipv4Addr,
    mask: Ipv4Addr,
    helloint: u16,
) -> OspfPacketMsg {
    let pkt_len = ip::HEADER_SIZE + ospf::HELLO_PACKET_SIZE;
    let mut buf = PacketBuffer::new(pkt_len);
    let ip_view = IpView::new(pkt_len);
    ip_view.init_default(
        &mut buf,
        pkt_len as u16,
        IpProtocol::Ospf,
        src,
        ALL_OSPF_ROUTERS,
    );

    let PacketView::Ospf(ospf_view) = ip_view.payload(&buf) else {
        panic!("expected an OSPF view");
    };
    ospf_view.init(
        &mut buf,
        OspfType::Hello,
        ospf::HELLO_PACKET_SIZE as u16,
        router_id,
        DEFAULT_AREA_ID,
    );
    let hello = OspfHelloView::new(pkt_len - ip::HEADER_SIZE);
    hello.set_network_mask(&mut buf, mask);
    hello.set_hello_interval(&mut buf, helloint);
    hello.set_padding(&mut buf);
    ospf_view.reset_checksum(&mut buf);
    ip_view.reset_checksum(&mut buf);

    OspfPacketMsg {
        buf,
        view: ospf_view,
        iface: rig.engine.interfaces().get(iface).unwrap(),
    }
}

// Builds an IP + OSPF LSU as received from `src`.
fn lsu_msg(
    rig: &Rig,
    iface: &str,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    router_id: Ipv4Addr,
    seqno: u16,
    ttl: u16,
    advs: &[(Ipv4Addr, Ipv4Addr, Ipv4Addr)],
) -> OspfPacketMsg {
    let ospf_len = OspfLsuView::packet_size(advs.len());
    let pkt_len = ip::HEADER_SIZE + ospf_len;
    let mut buf = PacketBuffer::new(pkt_len);
    let ip_view = IpView::new(pkt_len);
    ip_view.init_default(&mut buf, pkt_len as u16, IpProtocol::Ospf, src, dst);

    let PacketView::Ospf(ospf_view) = ip_view.payload(&buf) else {
        panic!("expected an OSPF view");
    };
    ospf_view.init(
        &mut buf,
        OspfType::Lsu,
        ospf_len as u16,
        router_id,
        DEFAULT_AREA_ID,
    );
    let lsu = OspfLsuView::new(ospf_len);
    lsu.set_seqno(&mut buf, seqno);
    lsu.set_ttl(&mut buf, ttl);
    lsu.set_adv_count(&mut buf, advs.len() as u32);
    for (index, (subnet, mask, neighbor)) in advs.iter().enumerate() {
        let adv = lsu.advertisement(index as u32);
        adv.set_subnet(&mut buf, *subnet);
        adv.set_subnet_mask(&mut buf, *mask);
        adv.set_router_id(&mut buf, *neighbor);
    }
    ospf_view.reset_checksum(&mut buf);
    ip_view.reset_checksum(&mut buf);

    OspfPacketMsg {
        buf,
        view: ospf_view,
        iface: rig.engine.interfaces().get(iface).unwrap(),
    }
}

fn subscribe_count(
    rig: &Rig,
    matcher: impl Fn(&OspfEvent) -> bool + Send + Sync + 'static,
) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counted = count.clone();
    rig.router.notifier.subscribe(move |event| {
        if matcher(event) {
            counted.fetch_add(1, Ordering::Relaxed);
        }
    });
    count
}

#[test]
fn hello_creates_gateway_and_lsu_confirms_routes() {
    let rig = rig();
    let added = subscribe_count(&rig, |event| {
        matches!(event, OspfEvent::GatewayAdded { .. })
    });
    let updated = subscribe_count(&rig, |event| {
        matches!(event, OspfEvent::RoutesUpdated)
    });

    // Neighbor 2.2.2.2 at 10.0.1.2 says hello.
    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        DEFAULT_HELLO_INTERVAL,
    ));
    assert_eq!(added.load(Ordering::Relaxed), 1);

    // Its LSU claims us back on the shared subnet and advertises one stub.
    rig.router.process_packet(lsu_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("10.0.1.1"),
        addr("2.2.2.2"),
        5,
        2,
        &[
            (addr("10.0.1.0"), MASK_24, addr("1.1.1.1")),
            (addr("10.7.7.0"), MASK_24, Ipv4Addr::UNSPECIFIED),
        ],
    ));
    assert_eq!(updated.load(Ordering::Relaxed), 1);

    // The stub subnet became a dynamic route via the neighbor's address.
    let route = rig.engine.rib().lpm(addr("10.7.7.42")).unwrap();
    assert_eq!(route.kind, RouteKind::Dynamic);
    assert_eq!(route.gateway, addr("10.0.1.2"));
    assert_eq!(route.iface.name, "eth0");
}

#[test]
fn duplicate_seqno_is_ignored() {
    let rig = rig();
    let updated = subscribe_count(&rig, |event| {
        matches!(event, OspfEvent::RoutesUpdated)
    });

    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        DEFAULT_HELLO_INTERVAL,
    ));
    let advs = [(addr("10.0.1.0"), MASK_24, addr("1.1.1.1"))];
    for _ in 0..2 {
        rig.router.process_packet(lsu_msg(
            &rig,
            "eth0",
            addr("10.0.1.2"),
            addr("10.0.1.1"),
            addr("2.2.2.2"),
            9,
            2,
            &advs,
        ));
    }
    // The replayed sequence number changed nothing.
    assert_eq!(updated.load(Ordering::Relaxed), 1);
}

#[test]
fn hello_with_wrong_mask_is_dropped() {
    let rig = rig();
    let added = subscribe_count(&rig, |event| {
        matches!(event, OspfEvent::GatewayAdded { .. })
    });
    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        addr("255.255.0.0"),
        DEFAULT_HELLO_INTERVAL,
    ));
    assert_eq!(added.load(Ordering::Relaxed), 0);
}

#[test]
fn hello_with_mismatched_interval_is_dropped() {
    let rig = rig();
    let eth0 = rig.engine.interfaces().get("eth0").unwrap();
    rig.router.set_hello_interval(&eth0, 5);
    let added = subscribe_count(&rig, |event| {
        matches!(event, OspfEvent::GatewayAdded { .. })
    });

    // A neighbor speaking the protocol default does not match the
    // configured wire.
    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        DEFAULT_HELLO_INTERVAL,
    ));
    assert_eq!(added.load(Ordering::Relaxed), 0);

    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        5,
    ));
    assert_eq!(added.load(Ordering::Relaxed), 1);
}

#[test]
fn tick_emits_hello_to_all_ospf_routers() {
    let rig = rig();
    rig.router.on_tick(Instant::now());

    let frames = rig.recorder.take();
    let hello_frame = frames
        .iter()
        .find(|(iface, _)| iface == "eth0")
        .expect("a HELLO should leave eth0");
    let (buf, reverse_offset) = PacketBuffer::with_frame(&hello_frame.1);
    let eth = EthernetView::new(reverse_offset);
    assert_eq!(
        eth.dst(&buf),
        MacAddr::from_multicast_ipv4(ALL_OSPF_ROUTERS)
    );
    assert_eq!(eth.ethertype(&buf), Some(EtherType::Ip));
    let PacketView::Ip(ip_view) = eth.payload(&buf) else {
        panic!("expected an IP view");
    };
    assert_eq!(ip_view.dst(&buf), ALL_OSPF_ROUTERS);
    assert_eq!(ip_view.protocol(&buf), Some(IpProtocol::Ospf));
    let PacketView::Ospf(ospf_view) = ip_view.payload(&buf) else {
        panic!("expected an OSPF view");
    };
    let PacketView::OspfHello(hello) = ospf_view.derived(&buf) else {
        panic!("expected a HELLO view");
    };
    assert!(hello.valid(&buf));
    assert_eq!(hello.network_mask(&buf), MASK_24);
    assert_eq!(hello.hello_interval(&buf), DEFAULT_HELLO_INTERVAL);
    assert_eq!(ospf_view.router_id(&buf), addr("1.1.1.1"));
}

#[test]
fn lsu_with_exhausted_ttl_is_not_forwarded() {
    let rig = rig();

    // Second interface with its own neighbor to forward to.
    let eth1 = Interface::new("eth1", InterfaceType::Hardware);
    eth1.set_mac(MacAddr::from([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x03]));
    eth1.set_addr(addr("10.0.2.1"), MASK_24);
    rig.engine.interfaces().insert(eth1.clone());
    rig.engine.rib().insert(Route::new(
        addr("10.0.2.0"),
        MASK_24,
        Ipv4Addr::UNSPECIFIED,
        eth1,
        RouteKind::Static,
    ));
    rig.engine
        .arp_cache()
        .insert(
            addr("10.0.2.2"),
            MacAddr::from([0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0x04]),
            EntryKind::Static,
        )
        .unwrap();

    for (iface, src, router_id) in [
        ("eth0", "10.0.1.2", "2.2.2.2"),
        ("eth1", "10.0.2.2", "3.3.3.3"),
    ] {
        rig.router.process_packet(hello_msg(
            &rig,
            iface,
            addr(src),
            addr(router_id),
            MASK_24,
            DEFAULT_HELLO_INTERVAL,
        ));
    }
    rig.recorder.take();

    // TTL 1 is consumed locally.
    rig.router.process_packet(lsu_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("10.0.1.1"),
        addr("2.2.2.2"),
        3,
        1,
        &[(addr("10.0.1.0"), MASK_24, addr("1.1.1.1"))],
    ));
    assert!(rig.recorder.take().is_empty());

    // TTL 2 reaches the other neighbor with one hop used.
    rig.router.process_packet(lsu_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("10.0.1.1"),
        addr("2.2.2.2"),
        4,
        2,
        &[(addr("10.0.1.0"), MASK_24, addr("1.1.1.1"))],
    ));
    let frames = rig.recorder.take();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, "eth1");
    let (buf, reverse_offset) = PacketBuffer::with_frame(&frames[0].1);
    let eth = EthernetView::new(reverse_offset);
    let PacketView::Ip(ip_view) = eth.payload(&buf) else {
        panic!("expected an IP view");
    };
    assert_eq!(ip_view.dst(&buf), addr("10.0.2.2"));
    assert_eq!(ip_view.src(&buf), addr("10.0.2.1"));
    let PacketView::Ospf(forwarded) = ip_view.payload(&buf) else {
        panic!("expected an OSPF view");
    };
    let PacketView::OspfLsu(lsu) = forwarded.derived(&buf) else {
        panic!("expected an LSU view");
    };
    assert!(lsu.valid(&buf));
    assert_eq!(lsu.seqno(&buf), 4);
    assert_eq!(lsu.ttl(&buf), 1);
    assert_eq!(forwarded.router_id(&buf), addr("2.2.2.2"));
}

#[test]
fn silent_neighbor_times_out_and_routes_are_withdrawn() {
    let rig = rig();
    let removed = subscribe_count(&rig, |event| {
        matches!(event, OspfEvent::GatewayRemoved { .. })
    });

    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        DEFAULT_HELLO_INTERVAL,
    ));
    rig.router.process_packet(lsu_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("10.0.1.1"),
        addr("2.2.2.2"),
        5,
        2,
        &[
            (addr("10.0.1.0"), MASK_24, addr("1.1.1.1")),
            (addr("10.7.7.0"), MASK_24, Ipv4Addr::UNSPECIFIED),
        ],
    ));
    assert!(rig.engine.rib().lpm(addr("10.7.7.42")).is_some());

    // Within the dead interval the gateway survives.
    let now = Instant::now();
    rig.router
        .on_tick(now + std::time::Duration::from_secs(5));
    assert_eq!(removed.load(Ordering::Relaxed), 0);

    // Three hello intervals of silence take the gateway down, and with it
    // the link into the topology.
    rig.router.on_tick(
        now + std::time::Duration::from_secs(
            3 * DEFAULT_HELLO_INTERVAL as u64 + 1,
        ),
    );
    assert_eq!(removed.load(Ordering::Relaxed), 1);
    assert!(rig.engine.rib().lpm(addr("10.7.7.42")).is_none());
}

#[test]
fn unheard_node_expires_from_the_topology() {
    let rig = rig();
    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        DEFAULT_HELLO_INTERVAL,
    ));
    rig.router.process_packet(lsu_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("10.0.1.1"),
        addr("2.2.2.2"),
        5,
        2,
        &[
            (addr("10.0.1.0"), MASK_24, addr("1.1.1.1")),
            (addr("10.7.7.0"), MASK_24, Ipv4Addr::UNSPECIFIED),
        ],
    ));
    assert!(rig.engine.rib().lpm(addr("10.7.7.42")).is_some());

    // The LSU timeout fells the node even while HELLOs keep the gateway
    // alive a little longer (the gateway check runs first here).
    rig.router
        .on_tick(Instant::now() + std::time::Duration::from_secs(91));
    assert!(rig.engine.rib().lpm(addr("10.7.7.42")).is_none());
}

#[test]
fn disabling_ospf_withdraws_dynamic_routes() {
    let rig = rig();
    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        DEFAULT_HELLO_INTERVAL,
    ));
    rig.router.process_packet(lsu_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("10.0.1.1"),
        addr("2.2.2.2"),
        5,
        2,
        &[
            (addr("10.0.1.0"), MASK_24, addr("1.1.1.1")),
            (addr("10.7.7.0"), MASK_24, Ipv4Addr::UNSPECIFIED),
        ],
    ));
    assert!(rig.engine.rib().lpm(addr("10.7.7.42")).is_some());

    rig.router.set_enabled(false);
    assert!(rig.engine.rib().lpm(addr("10.7.7.42")).is_none());

    // Re-enabled, the protocol starts from scratch.
    rig.router.set_enabled(true);
    rig.router.process_packet(hello_msg(
        &rig,
        "eth0",
        addr("10.0.1.2"),
        addr("2.2.2.2"),
        MASK_24,
        DEFAULT_HELLO_INTERVAL,
    ));
    assert!(rig.engine.rib().lpm(addr("10.7.7.42")).is_none());
}
