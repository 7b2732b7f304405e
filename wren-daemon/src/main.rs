//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod netio;
mod shell;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{App, Arg};
use config::{Config, LoggingFmtStyle};
use shell::{Response, Shell};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;
use wren_forwarding::arp_cache::{ArpCache, ArpCacheDaemon, ArpCacheEvent};
use wren_forwarding::arp_queue::{ArpQueue, ArpQueueDaemon};
use wren_forwarding::engine::Engine;
use wren_forwarding::interface::{Interface, InterfaceMap, InterfaceType};
use wren_forwarding::rib::{Route, RouteKind, RoutingTable};
use wren_forwarding::tunnel::{Tunnel, TunnelMap};
use wren_ospf::daemon::OspfDaemon;
use wren_ospf::{DEFAULT_AREA_ID, OspfRouter};
use wren_utils::task::{IntervalTask, Task, TaskRunner};

fn init_tracing(config: &config::Logging) {
    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(config.stdout.colors);
        let layer = match config.stdout.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("wren=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .init();
}

// Builds the forwarding-plane tables from the configuration.
fn init_interfaces(
    config: &Config,
    interfaces: &Arc<InterfaceMap>,
    rib: &Arc<RoutingTable>,
    tunnels: &Arc<TunnelMap>,
) {
    for iface_cfg in &config.interfaces {
        let iface = Interface::new(&iface_cfg.name, iface_cfg.if_type);
        if let Some(mac) = iface_cfg.mac {
            iface.set_mac(mac);
        }
        if let (Some(addr), Some(mask)) = (iface_cfg.address, iface_cfg.mask) {
            iface.set_addr(addr, mask);
            // Directly connected subnet.
            rib.insert(Route::new(
                addr,
                mask,
                Ipv4Addr::UNSPECIFIED,
                iface.clone(),
                RouteKind::Static,
            ));
        }
        iface.set_speed_mbps(iface_cfg.speed_mbps);
        iface.set_enabled(iface_cfg.enabled);
        interfaces.insert(iface);
    }

    for tunnel_cfg in &config.tunnels {
        let iface = match interfaces.get(&tunnel_cfg.name) {
            Some(iface) => iface,
            None => {
                let iface =
                    Interface::new(&tunnel_cfg.name, InterfaceType::Virtual);
                interfaces.insert(iface.clone());
                iface
            }
        };
        tunnels.insert(Tunnel {
            name: tunnel_cfg.name.clone(),
            iface,
            remote: tunnel_cfg.remote,
            mode: tunnel_cfg.mode,
        });
    }

    for route_cfg in &config.routes {
        match interfaces.get(&route_cfg.interface) {
            Some(iface) => {
                rib.insert(Route::new(
                    route_cfg.dest,
                    route_cfg.mask,
                    route_cfg.gateway,
                    iface,
                    RouteKind::Static,
                ));
            }
            None => {
                warn!(iface = %route_cfg.interface,
                      "static route references unknown interface, skipping");
            }
        }
    }
}

async fn run(config: Config) {
    let interfaces = Arc::new(InterfaceMap::new());
    let rib = Arc::new(RoutingTable::new());
    let arp_cache = Arc::new(ArpCache::new());
    let arp_queue = Arc::new(ArpQueue::new());
    let tunnels = Arc::new(TunnelMap::new());

    init_interfaces(&config, &interfaces, &rib, &tunnels);

    // Bind the hardware ports and build the engine around them.
    let packet_io = netio::PacketIo::new();
    for iface in interfaces.list() {
        if iface.is_virtual() {
            continue;
        }
        if let Err(error) = packet_io.open(&iface) {
            warn!(iface = %iface.name, %error,
                  "failed to open packet socket");
        }
    }
    let engine = Engine::new(
        interfaces.clone(),
        rib.clone(),
        arp_cache.clone(),
        arp_queue.clone(),
        tunnels.clone(),
        packet_io.clone(),
    );

    // The OSPF router identity defaults to the first interface address.
    let router_id = config
        .router_id
        .or_else(|| interfaces.first().map(|iface| iface.addr()))
        .unwrap_or(Ipv4Addr::UNSPECIFIED);
    if router_id.is_unspecified() {
        error!("no usable router ID, configure an interface address");
        std::process::exit(1);
    }
    let ospf = OspfRouter::new(
        router_id,
        DEFAULT_AREA_ID,
        engine.clone(),
        interfaces.clone(),
        rib.clone(),
    );
    ospf.set_enabled(config.ospf.enabled);

    // Packets cross from the engine to the OSPF router over a channel; the
    // engine keeps only the sending half.
    let (ospf_tx, mut ospf_rx) = tokio::sync::mpsc::unbounded_channel();
    engine.set_ospf_handler(ospf_tx);
    let _ospf_input_task = {
        let ospf = ospf.clone();
        Task::spawn(async move {
            while let Some(msg) = ospf_rx.recv().await {
                ospf.process_packet(msg);
            }
        })
    };

    // Interface flaps change the advertised link set.
    for iface in interfaces.list() {
        let ospf = ospf.clone();
        iface.notifier.subscribe(move |event| {
            debug!(iface = %event.name, change = ?event.change,
                   "interface changed");
            ospf.mark_links_changed();
        });
    }

    // Non-default HELLO intervals.
    for iface_cfg in &config.interfaces {
        if let Some(hello_interval) = iface_cfg.hello_interval
            && let Some(iface) = interfaces.get(&iface_cfg.name)
        {
            ospf.set_hello_interval(&iface, hello_interval);
        }
    }

    // Mirror seam for a hardware ARP table: log cache changes.
    arp_cache.notifier.subscribe(|event| match event {
        ArpCacheEvent::Added(entry) => {
            debug!(addr = %entry.addr, mac = %entry.mac, "ARP cache add");
        }
        ArpCacheEvent::Removed(entry) => {
            debug!(addr = %entry.addr, "ARP cache remove");
        }
    });

    // Per-interface receive loops.
    let mut rx_tasks = Vec::new();
    for iface in interfaces.list() {
        if let Some(task) = packet_io.spawn_rx(engine.clone(), iface) {
            rx_tasks.push(task);
        }
    }

    // The timer context: one cooperative runner ticking every second.
    let mut runner = TaskRunner::new();
    runner.register(Box::new(ArpCacheDaemon::new(arp_cache.clone())));
    runner.register(Box::new(ArpQueueDaemon::new(arp_queue.clone())));
    runner.register(Box::new(OspfDaemon::new(ospf.clone())));
    let _timer_task = IntervalTask::new(Duration::from_secs(1), false, {
        let runner = std::sync::Mutex::new(runner);
        move || {
            runner.lock().unwrap().advance(Instant::now());
            std::future::ready(())
        }
    });

    info!(%router_id, "router is up");

    // The operator shell reads stdin until shutdown.
    let shell = Shell::new(engine, ospf);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match shell.execute(&line) {
                        Ok(Response::Output(output)) => {
                            if !output.is_empty() {
                                println!("{}", output);
                            }
                        }
                        Ok(Response::Shutdown) => break,
                        Err(message) => println!("error: {}", message),
                    },
                    // EOF: keep running until a signal arrives.
                    Ok(None) => {
                        tokio::signal::ctrl_c().await.ok();
                        break;
                    }
                    Err(error) => {
                        warn!(%error, "failed to read command");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("shutting down");
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Wren software router")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = Config::load(config_file);

    // Initialize tracing.
    init_tracing(&config.logging);

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    info!("starting up");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(run(config));

    // Clean shutdown.
    std::process::exit(0);
}
