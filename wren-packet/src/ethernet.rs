//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use wren_utils::mac_addr::MacAddr;

use crate::buffer::PacketBuffer;
use crate::error::{DecodeError, DecodeResult};
use crate::view::{PacketView, UnknownView, View};
use crate::{arp, ip};

//
// Ethernet II frame header.
//
// Encoding format:
//
//  0                   1
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Destination MAC (6)     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Source MAC (6)        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | Ethertype (2) |  payload...
// +-+-+-+-+-+-+-+-+
//

pub const HEADER_SIZE: usize = 14;
pub const MTU: usize = 1500;

// EtherType values understood by the pipeline.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum EtherType {
    Ip = 0x0800,
    Arp = 0x0806,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EthernetView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

// ===== impl EthernetView =====

impl EthernetView {
    pub fn new(reverse_offset: usize) -> EthernetView {
        EthernetView {
            reverse_offset,
            enclosing: None,
        }
    }

    /// Makes room for an Ethernet header in front of a view spanning
    /// `inner_reverse_offset` bytes and returns the header's view.
    pub fn prepend(
        buf: &mut PacketBuffer,
        inner_reverse_offset: usize,
    ) -> EthernetView {
        buf.ensure_size(inner_reverse_offset + HEADER_SIZE);
        EthernetView::new(inner_reverse_offset + HEADER_SIZE)
    }

    pub fn dst(&self, buf: &PacketBuffer) -> MacAddr {
        buf.mac_at(self.offset(buf))
    }

    pub fn set_dst(&self, buf: &mut PacketBuffer, addr: MacAddr) {
        buf.set_mac_at(self.offset(buf), addr);
    }

    pub fn src(&self, buf: &PacketBuffer) -> MacAddr {
        buf.mac_at(self.offset(buf) + 6)
    }

    pub fn set_src(&self, buf: &mut PacketBuffer, addr: MacAddr) {
        buf.set_mac_at(self.offset(buf) + 6, addr);
    }

    pub fn ethertype(&self, buf: &PacketBuffer) -> Option<EtherType> {
        EtherType::from_u16(buf.u16_at(self.offset(buf) + 12))
    }

    pub fn set_ethertype(&self, buf: &mut PacketBuffer, ethertype: EtherType) {
        buf.set_u16_at(self.offset(buf) + 12, ethertype as u16);
    }

    /// Returns the next-layer view, chained back to this one.
    pub fn payload(&self, buf: &PacketBuffer) -> PacketView {
        let reverse_offset = self.reverse_offset - HEADER_SIZE;
        let enclosing = PacketView::Ethernet(self.clone());
        match self.ethertype(buf) {
            Some(EtherType::Arp) => PacketView::Arp(
                arp::ArpView::with_enclosing(reverse_offset, enclosing),
            ),
            Some(EtherType::Ip) => PacketView::Ip(ip::IpView::with_enclosing(
                reverse_offset,
                enclosing,
            )),
            None => PacketView::Unknown(UnknownView::with_enclosing(
                reverse_offset,
                enclosing,
            )),
        }
    }
}

impl View for EthernetView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, _buf: &PacketBuffer) -> DecodeResult<()> {
        if self.len() < HEADER_SIZE {
            return Err(DecodeError::IncompletePacket);
        }
        Ok(())
    }
}
