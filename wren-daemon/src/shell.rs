//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Instant;

use wren_forwarding::arp_cache::EntryKind;
use wren_forwarding::engine::Engine;
use wren_forwarding::error::Error;
use wren_forwarding::interface::{Interface, InterfaceType};
use wren_forwarding::rib::{Route, RouteKind};
use wren_forwarding::tunnel::{Tunnel, TunnelMode};
use wren_ospf::OspfRouter;
use wren_utils::ip::Ipv4AddrExt;
use wren_utils::mac_addr::MacAddr;

/// Outcome of one operator command.
pub enum Response {
    Output(String),
    Shutdown,
}

/// The operator command surface: a newline-terminated text protocol
/// executed against the forwarding and routing state.
pub struct Shell {
    engine: Arc<Engine>,
    ospf: Arc<OspfRouter>,
    ping_seqno: AtomicU16,
}

// ===== impl Shell =====

impl Shell {
    pub fn new(engine: Arc<Engine>, ospf: Arc<OspfRouter>) -> Shell {
        Shell {
            engine,
            ospf,
            ping_seqno: AtomicU16::new(0),
        }
    }

    /// Executes one command line. `Err` carries a one-line operator-visible
    /// message.
    pub fn execute(&self, line: &str) -> Result<Response, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Ok(Response::Output(String::new())),
            ["show", "ip", "arp"] => Ok(Response::Output(self.show_arp())),
            ["show", "ip", "intf"] => Ok(Response::Output(self.show_intf())),
            ["show", "ip", "route"] => Ok(Response::Output(self.show_route())),
            ["show", "ip", "tunnel"] => {
                Ok(Response::Output(self.show_tunnel()))
            }
            ["arp", "add", ip, mac] => self.arp_add(ip, mac),
            ["arp", "del", ip] => self.arp_del(ip),
            ["arp", "purge", kind] => self.arp_purge(kind),
            ["ip", "intf", "set", name, ip, mask] => {
                self.intf_set(name, ip, mask)
            }
            ["ip", "intf", "up", name] => self.intf_enable(name, true),
            ["ip", "intf", "down", name] => self.intf_enable(name, false),
            ["ip", "route", "add", dest, gateway, mask, name] => {
                self.route_add(dest, gateway, mask, name)
            }
            ["ip", "route", "del", dest, mask] => self.route_del(dest, mask),
            ["ip", "route", "purge", kind] => self.route_purge(kind),
            ["ip", "tunnel", "add", name, "gre", remote] => {
                self.tunnel_add(name, remote)
            }
            ["ip", "tunnel", "change", name, "gre", remote] => {
                self.tunnel_change(name, remote)
            }
            ["ip", "tunnel", "del", name, "gre", _] => self.tunnel_del(name),
            ["ip", "tunnel", "del", name] => self.tunnel_del(name),
            ["ospf", "up"] => {
                self.ospf.set_enabled(true);
                Ok(Response::Output("OSPF enabled".to_owned()))
            }
            ["ospf", "down"] => {
                self.ospf.set_enabled(false);
                Ok(Response::Output("OSPF disabled".to_owned()))
            }
            ["ping", ip] => self.ping(ip),
            ["shutdown"] => Ok(Response::Shutdown),
            _ => Err(format!("unknown or malformed command: {}", line)),
        }
    }

    // ===== show commands =====

    fn show_arp(&self) -> String {
        let now = Instant::now();
        let mut out = format!(
            "{:<16} {:<18} {:<8} {:>6}\n",
            "IP", "MAC", "Type", "Age(s)"
        );
        for entry in self.engine.arp_cache().list() {
            let kind = match entry.kind {
                EntryKind::Static => "static",
                EntryKind::Dynamic => "dynamic",
            };
            out.push_str(&format!(
                "{:<16} {:<18} {:<8} {:>6}\n",
                entry.addr.to_string(),
                entry.mac.to_string(),
                kind,
                entry.age(now).as_secs(),
            ));
        }
        out
    }

    fn show_intf(&self) -> String {
        let mut out = format!(
            "{:<10} {:<16} {:<16} {:<18} {:<9} {:<6} {:>6}\n",
            "Interface", "IP", "Mask", "MAC", "Type", "State", "Speed"
        );
        for iface in self.engine.interfaces().list() {
            let if_type = match iface.if_type {
                InterfaceType::Hardware => "hardware",
                InterfaceType::Virtual => "virtual",
            };
            out.push_str(&format!(
                "{:<10} {:<16} {:<16} {:<18} {:<9} {:<6} {:>6}\n",
                iface.name,
                iface.addr().to_string(),
                iface.mask().to_string(),
                iface.mac().to_string(),
                if_type,
                if iface.enabled() { "up" } else { "down" },
                iface.speed_mbps(),
            ));
        }
        out
    }

    fn show_route(&self) -> String {
        let mut out = format!(
            "{:<16} {:<16} {:<16} {:<10} {:<7}\n",
            "Subnet", "Mask", "Gateway", "Interface", "Type"
        );
        for route in self.engine.rib().list() {
            let kind = match route.kind {
                RouteKind::Static => "static",
                RouteKind::Dynamic => "dynamic",
            };
            out.push_str(&format!(
                "{:<16} {:<16} {:<16} {:<10} {:<7}\n",
                route.subnet.to_string(),
                route.mask.to_string(),
                route.gateway.to_string(),
                route.iface.name,
                kind,
            ));
        }
        out
    }

    fn show_tunnel(&self) -> String {
        let mut out =
            format!("{:<10} {:<6} {:<16}\n", "Tunnel", "Mode", "Remote");
        for tunnel in self.engine.tunnels().list() {
            let mode = match tunnel.mode {
                TunnelMode::Gre => "gre",
            };
            out.push_str(&format!(
                "{:<10} {:<6} {:<16}\n",
                tunnel.name,
                mode,
                tunnel.remote.to_string(),
            ));
        }
        out
    }

    // ===== ARP commands =====

    fn arp_add(&self, ip: &str, mac: &str) -> Result<Response, String> {
        let addr = parse_ipv4(ip)?;
        let mac: MacAddr =
            mac.parse().map_err(|_| format!("invalid MAC: {}", mac))?;
        self.engine
            .arp_cache()
            .insert(addr, mac, EntryKind::Static)
            .map_err(|error| error.to_string())?;
        Ok(Response::Output(format!("added static entry for {}", addr)))
    }

    fn arp_del(&self, ip: &str) -> Result<Response, String> {
        let addr = parse_ipv4(ip)?;
        match self.engine.arp_cache().remove(addr) {
            Some(_) => Ok(Response::Output(format!("removed {}", addr))),
            None => Err(Error::ArpEntryNotFound(addr).to_string()),
        }
    }

    fn arp_purge(&self, kind: &str) -> Result<Response, String> {
        let kind = match kind {
            "dyn" => Some(EntryKind::Dynamic),
            "sta" => Some(EntryKind::Static),
            "all" => None,
            _ => return Err("expected one of: dyn sta all".to_owned()),
        };
        let count = self.engine.arp_cache().purge(kind);
        Ok(Response::Output(format!("purged {} entries", count)))
    }

    // ===== interface commands =====

    fn intf_set(
        &self,
        name: &str,
        ip: &str,
        mask: &str,
    ) -> Result<Response, String> {
        let addr = parse_ipv4(ip)?;
        let mask = parse_ipv4(mask)?;
        let iface = self.lookup_iface(name)?;
        iface.set_addr(addr, mask);
        Ok(Response::Output(format!(
            "{}: {}/{}",
            name,
            addr,
            mask.mask_len()
        )))
    }

    fn intf_enable(
        &self,
        name: &str,
        enabled: bool,
    ) -> Result<Response, String> {
        let iface = self.lookup_iface(name)?;
        iface.set_enabled(enabled);
        Ok(Response::Output(format!(
            "{}: {}",
            name,
            if enabled { "up" } else { "down" }
        )))
    }

    // ===== route commands =====

    fn route_add(
        &self,
        dest: &str,
        gateway: &str,
        mask: &str,
        name: &str,
    ) -> Result<Response, String> {
        let dest = parse_ipv4(dest)?;
        let gateway = parse_ipv4(gateway)?;
        let mask = parse_ipv4(mask)?;
        let iface = self.lookup_iface(name)?;
        self.engine.rib().insert(Route::new(
            dest,
            mask,
            gateway,
            iface,
            RouteKind::Static,
        ));
        Ok(Response::Output(format!(
            "route {}/{} via {} dev {}",
            dest.mask(mask),
            mask.mask_len(),
            gateway,
            name
        )))
    }

    fn route_del(&self, dest: &str, mask: &str) -> Result<Response, String> {
        let dest = parse_ipv4(dest)?;
        let mask = parse_ipv4(mask)?;
        match self.engine.rib().remove(dest, mask) {
            Some(_) => Ok(Response::Output("route removed".to_owned())),
            None => Err(Error::RouteNotFound(dest, mask).to_string()),
        }
    }

    fn route_purge(&self, kind: &str) -> Result<Response, String> {
        let kind = match kind {
            "dyn" => Some(RouteKind::Dynamic),
            "sta" => Some(RouteKind::Static),
            "all" => None,
            _ => return Err("expected one of: dyn sta all".to_owned()),
        };
        let count = self.engine.rib().purge(kind);
        Ok(Response::Output(format!("purged {} routes", count)))
    }

    // ===== tunnel commands =====

    fn tunnel_add(&self, name: &str, remote: &str) -> Result<Response, String> {
        let remote = parse_ipv4(remote)?;
        if self.engine.tunnels().get(name).is_some() {
            return Err(format!("tunnel {} already exists", name));
        }
        let iface = Interface::new(name, InterfaceType::Virtual);
        self.engine.interfaces().insert(iface.clone());
        self.engine.tunnels().insert(Tunnel {
            name: name.to_owned(),
            iface,
            remote,
            mode: TunnelMode::Gre,
        });
        Ok(Response::Output(format!("tunnel {} -> {}", name, remote)))
    }

    fn tunnel_change(
        &self,
        name: &str,
        remote: &str,
    ) -> Result<Response, String> {
        let remote = parse_ipv4(remote)?;
        let mut tunnel = self
            .engine
            .tunnels()
            .get(name)
            .ok_or_else(|| Error::TunnelNotFound(name.to_owned()).to_string())?;
        tunnel.remote = remote;
        self.engine.tunnels().insert(tunnel);
        Ok(Response::Output(format!("tunnel {} -> {}", name, remote)))
    }

    fn tunnel_del(&self, name: &str) -> Result<Response, String> {
        let tunnel = self
            .engine
            .tunnels()
            .remove(name)
            .ok_or_else(|| Error::TunnelNotFound(name.to_owned()).to_string())?;
        // Routes over the tunnel die with the interface.
        tunnel.iface.set_enabled(false);
        self.engine.interfaces().remove(name);
        Ok(Response::Output(format!("tunnel {} removed", name)))
    }

    // ===== ping =====

    fn ping(&self, ip: &str) -> Result<Response, String> {
        let addr = parse_ipv4(ip)?;
        let seqno = self.ping_seqno.fetch_add(1, Ordering::Relaxed);
        self.engine
            .send_echo_request(addr, 0x7772, seqno)
            .map_err(|error| error.to_string())?;
        Ok(Response::Output(format!(
            "echo request sent to {} (seq {})",
            addr, seqno
        )))
    }

    // ===== helper functions =====

    fn lookup_iface(&self, name: &str) -> Result<Arc<Interface>, String> {
        self.engine
            .interfaces()
            .get(name)
            .ok_or_else(|| Error::InterfaceNotFound(name.to_owned()).to_string())
    }
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, String> {
    s.parse().map_err(|_| format!("invalid IPv4 address: {}", s))
}
