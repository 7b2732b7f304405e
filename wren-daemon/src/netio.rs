//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::io::IoSliceMut;
use std::ops::Deref;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex};

use nix::sys::socket::{self, LinkAddr, SockaddrLike};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};
use wren_forwarding::engine::{Engine, FrameOutput};
use wren_forwarding::interface::Interface;
use wren_utils::task::Task;

// Upper bound on one link-layer frame.
const FRAME_BUF_SIZE: usize = 2048;

/// Per-interface AF_PACKET sockets: the receive side feeds the engine, the
/// transmit side implements the engine's driver seam.
#[derive(Debug, Default)]
pub struct PacketIo {
    sockets: Mutex<BTreeMap<String, PortSocket>>,
}

#[derive(Clone, Debug)]
struct PortSocket {
    socket: Arc<AsyncFd<Socket>>,
    ifindex: u32,
}

// Extension methods for LinkAddr.
trait LinkAddrExt {
    // Creates a new `LinkAddr` using the given protocol number, interface
    // index, and an optional MAC address.
    fn new(protocol: u16, ifindex: u32, addr: Option<[u8; 6]>) -> Self;
}

// ===== impl LinkAddr =====

impl LinkAddrExt for LinkAddr {
    fn new(protocol: u16, ifindex: u32, addr: Option<[u8; 6]>) -> Self {
        let mut sll = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: protocol.to_be(),
            sll_ifindex: ifindex as _,
            sll_halen: 0,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_addr: [0; 8],
        };
        if let Some(addr) = addr {
            sll.sll_halen = 6;
            sll.sll_addr[..6].copy_from_slice(&addr);
        }
        let sll_len = size_of_val(&sll) as libc::socklen_t;
        unsafe {
            LinkAddr::from_raw(&sll as *const _ as *const _, Some(sll_len))
        }
        .unwrap()
    }
}

// ===== impl PacketIo =====

impl PacketIo {
    pub fn new() -> Arc<PacketIo> {
        Arc::new(PacketIo::default())
    }

    /// Opens a raw socket bound to the named OS interface.
    pub fn open(&self, iface: &Arc<Interface>) -> Result<(), std::io::Error> {
        let socket = Socket::new(
            Domain::PACKET,
            Type::RAW,
            Some(Protocol::from(libc::ETH_P_ALL)),
        )?;
        socket.set_nonblocking(true)?;

        let ifindex = nix::net::if_::if_nametoindex(iface.name.as_str())?;
        let sockaddr = LinkAddr::new(libc::ETH_P_ALL as u16, ifindex, None);
        socket::bind(socket.as_raw_fd(), &sockaddr)?;

        let socket = Arc::new(AsyncFd::new(socket)?);
        self.sockets
            .lock()
            .unwrap()
            .insert(iface.name.clone(), PortSocket { socket, ifindex });
        debug!(iface = %iface.name, %ifindex, "packet socket bound");
        Ok(())
    }

    /// Spawns the supervised receive loop feeding `engine`. Returns `None`
    /// when the interface has no socket.
    pub fn spawn_rx(
        &self,
        engine: Arc<Engine>,
        iface: Arc<Interface>,
    ) -> Option<Task<()>> {
        let port = self.sockets.lock().unwrap().get(&iface.name).cloned()?;
        Some(Task::spawn_supervised(move || {
            let socket = port.socket.clone();
            let engine = engine.clone();
            let iface = iface.clone();
            async move {
                let mut buf = [0; FRAME_BUF_SIZE];
                let mut iov = [IoSliceMut::new(&mut buf)];
                loop {
                    match socket
                        .async_io(Interest::READABLE, |socket| {
                            match socket::recvmsg::<LinkAddr>(
                                socket.as_raw_fd(),
                                &mut iov,
                                None,
                                socket::MsgFlags::empty(),
                            ) {
                                Ok(msg) => Ok(msg.bytes),
                                Err(errno) => Err(errno.into()),
                            }
                        })
                        .await
                    {
                        Ok(bytes) => {
                            engine
                                .receive_frame(&iface, &iov[0].deref()[..bytes]);
                        }
                        Err(error)
                            if error.kind()
                                == std::io::ErrorKind::Interrupted =>
                        {
                            // Retry if the syscall was interrupted (EINTR).
                            continue;
                        }
                        Err(error) => {
                            warn!(iface = %iface.name, %error,
                                  "frame receive failed");
                        }
                    }
                }
            }
        }))
    }
}

impl FrameOutput for PacketIo {
    fn output(&self, iface: &Arc<Interface>, frame: &[u8]) {
        let port = self.sockets.lock().unwrap().get(&iface.name).cloned();
        let Some(port) = port else {
            warn!(iface = %iface.name, "no socket for interface, dropping");
            return;
        };
        let sockaddr =
            LinkAddr::new(libc::ETH_P_ALL as u16, port.ifindex, None);
        // I/O errors drop the frame; the interface stays enabled.
        if let Err(error) = socket::sendto(
            port.socket.get_ref().as_raw_fd(),
            frame,
            &sockaddr,
            socket::MsgFlags::empty(),
        ) {
            warn!(iface = %iface.name, %error, "frame transmit failed");
        }
    }
}
