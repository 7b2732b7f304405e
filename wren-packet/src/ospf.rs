//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::buffer::PacketBuffer;
use crate::checksum;
use crate::error::{DecodeError, DecodeResult};
use crate::view::{PacketView, UnknownView, View};

//
// PWOSPF common header (24 bytes):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Version #   |     Type      |         Packet length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Router ID                            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Area ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Checksum            |             AuType            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// PWOSPF fixes AuType and Authentication to zero; the checksum covers the
// whole packet.
//

pub const VERSION: u8 = 2;
pub const HEADER_SIZE: usize = 24;
pub const HELLO_PACKET_SIZE: usize = HEADER_SIZE + 8;
pub const LSU_HEADER_SIZE: usize = HEADER_SIZE + 8;
pub const LSU_ADV_SIZE: usize = 12;

/// Destination of every HELLO: the all-OSPF-routers group.
pub const ALL_OSPF_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum OspfType {
    Hello = 1,
    Lsu = 4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OspfView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OspfHelloView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OspfLsuView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsuAdvView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

// ===== helper functions =====

fn common_validate(
    buf: &PacketBuffer,
    reverse_offset: usize,
) -> DecodeResult<()> {
    if reverse_offset < HEADER_SIZE {
        return Err(DecodeError::IncompletePacket);
    }
    let offset = buf.size() - reverse_offset;
    let version = buf.u8_at(offset);
    if version != VERSION {
        return Err(DecodeError::InvalidVersion(version));
    }
    let pkt_type = buf.u8_at(offset + 1);
    if OspfType::from_u8(pkt_type).is_none() {
        return Err(DecodeError::UnknownPacketType(pkt_type));
    }
    let pkt_len = buf.u16_at(offset + 2) as usize;
    if pkt_len < HEADER_SIZE || pkt_len > reverse_offset {
        return Err(DecodeError::InvalidLength(pkt_len as u16));
    }
    if buf.u16_at(offset + 14) != 0 || buf.u64_at(offset + 16) != 0 {
        return Err(DecodeError::NonZeroAuthField);
    }
    let data = buf.bytes(offset, pkt_len);
    if !checksum::verify(
        buf.u16_at(offset + 12),
        &[&data[..12], &[0, 0], &data[14..]],
    ) {
        return Err(DecodeError::InvalidChecksum);
    }
    Ok(())
}

// ===== impl OspfView =====

impl OspfView {
    pub fn new(reverse_offset: usize) -> OspfView {
        OspfView {
            reverse_offset,
            enclosing: None,
        }
    }

    pub(crate) fn with_enclosing(
        reverse_offset: usize,
        enclosing: PacketView,
    ) -> OspfView {
        OspfView {
            reverse_offset,
            enclosing: Some(Box::new(enclosing)),
        }
    }

    /// Writes the common header with zeroed checksum and authentication
    /// fields.
    pub fn init(
        &self,
        buf: &mut PacketBuffer,
        pkt_type: OspfType,
        pkt_len: u16,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
    ) {
        let offset = self.offset(buf);
        buf.set_u8_at(offset, VERSION);
        buf.set_u8_at(offset + 1, pkt_type as u8);
        buf.set_u16_at(offset + 2, pkt_len);
        buf.set_ipv4_at(offset + 4, router_id);
        buf.set_ipv4_at(offset + 8, area_id);
        buf.set_u16_at(offset + 12, 0);
        buf.set_u16_at(offset + 14, 0);
        buf.set_u64_at(offset + 16, 0);
    }

    pub fn version(&self, buf: &PacketBuffer) -> u8 {
        buf.u8_at(self.offset(buf))
    }

    pub fn ospf_type(&self, buf: &PacketBuffer) -> Option<OspfType> {
        OspfType::from_u8(buf.u8_at(self.offset(buf) + 1))
    }

    pub fn pkt_len(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 2)
    }

    pub fn router_id(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 4)
    }

    pub fn set_router_id(&self, buf: &mut PacketBuffer, id: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 4, id);
    }

    pub fn area_id(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 8)
    }

    pub fn checksum(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 12)
    }

    /// Recomputes the header+body checksum over `pkt_len` bytes in place.
    pub fn reset_checksum(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf);
        let pkt_len = self.pkt_len(buf) as usize;
        buf.set_u16_at(offset + 12, 0);
        let cksum = {
            let data = buf.bytes(offset, pkt_len);
            checksum::checksum(&[data])
        };
        buf.set_u16_at(offset + 12, cksum);
    }

    /// Returns the type-specific view at the same offset, keeping the
    /// enclosing chain.
    pub fn derived(&self, buf: &PacketBuffer) -> PacketView {
        match self.ospf_type(buf) {
            Some(OspfType::Hello) => PacketView::OspfHello(OspfHelloView {
                reverse_offset: self.reverse_offset,
                enclosing: self.enclosing.clone(),
            }),
            Some(OspfType::Lsu) => PacketView::OspfLsu(OspfLsuView {
                reverse_offset: self.reverse_offset,
                enclosing: self.enclosing.clone(),
            }),
            None => {
                PacketView::Unknown(UnknownView::new(self.reverse_offset))
            }
        }
    }
}

impl View for OspfView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, buf: &PacketBuffer) -> DecodeResult<()> {
        common_validate(buf, self.reverse_offset)
    }
}

// ===== impl OspfHelloView =====

impl OspfHelloView {
    pub fn new(reverse_offset: usize) -> OspfHelloView {
        OspfHelloView {
            reverse_offset,
            enclosing: None,
        }
    }

    /// The common-header view at the same offset.
    pub fn common(&self) -> OspfView {
        OspfView::new(self.reverse_offset)
    }

    pub fn network_mask(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 24)
    }

    pub fn set_network_mask(&self, buf: &mut PacketBuffer, mask: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 24, mask);
    }

    pub fn hello_interval(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 28)
    }

    pub fn set_hello_interval(&self, buf: &mut PacketBuffer, helloint: u16) {
        buf.set_u16_at(self.offset(buf) + 28, helloint);
    }

    pub fn set_padding(&self, buf: &mut PacketBuffer) {
        buf.set_u16_at(self.offset(buf) + 30, 0);
    }
}

impl View for OspfHelloView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, buf: &PacketBuffer) -> DecodeResult<()> {
        common_validate(buf, self.reverse_offset)?;
        if self.len() < HELLO_PACKET_SIZE {
            return Err(DecodeError::IncompletePacket);
        }
        if buf.u16_at(self.offset(buf) + 30) != 0 {
            return Err(DecodeError::NonZeroPadding);
        }
        // HELLOs must be addressed to the all-OSPF-routers group.
        if let Some(PacketView::Ip(ip)) = self.enclosing()
            && ip.dst(buf) != ALL_OSPF_ROUTERS
        {
            return Err(DecodeError::NotAllOspfRouters);
        }
        Ok(())
    }
}

// ===== impl OspfLsuView =====

impl OspfLsuView {
    pub fn new(reverse_offset: usize) -> OspfLsuView {
        OspfLsuView {
            reverse_offset,
            enclosing: None,
        }
    }

    /// Total packet size for `adv_count` advertisements.
    pub fn packet_size(adv_count: usize) -> usize {
        LSU_HEADER_SIZE + adv_count * LSU_ADV_SIZE
    }

    /// The common-header view at the same offset.
    pub fn common(&self) -> OspfView {
        OspfView::new(self.reverse_offset)
    }

    pub fn seqno(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 24)
    }

    pub fn set_seqno(&self, buf: &mut PacketBuffer, seqno: u16) {
        buf.set_u16_at(self.offset(buf) + 24, seqno);
    }

    pub fn ttl(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 26)
    }

    pub fn set_ttl(&self, buf: &mut PacketBuffer, ttl: u16) {
        buf.set_u16_at(self.offset(buf) + 26, ttl);
    }

    pub fn dec_ttl(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf) + 26;
        buf.set_u16_at(offset, buf.u16_at(offset).saturating_sub(1));
    }

    pub fn adv_count(&self, buf: &PacketBuffer) -> u32 {
        buf.u32_at(self.offset(buf) + 28)
    }

    pub fn set_adv_count(&self, buf: &mut PacketBuffer, count: u32) {
        buf.set_u32_at(self.offset(buf) + 28, count);
    }

    /// The `index`-th advertisement, chained back to this view.
    pub fn advertisement(&self, index: u32) -> LsuAdvView {
        let reverse_offset = self.reverse_offset
            - LSU_HEADER_SIZE
            - index as usize * LSU_ADV_SIZE;
        LsuAdvView {
            reverse_offset,
            enclosing: Some(Box::new(PacketView::OspfLsu(self.clone()))),
        }
    }
}

impl View for OspfLsuView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, buf: &PacketBuffer) -> DecodeResult<()> {
        common_validate(buf, self.reverse_offset)?;
        if self.len() < LSU_HEADER_SIZE {
            return Err(DecodeError::IncompletePacket);
        }
        let required =
            OspfLsuView::packet_size(self.adv_count(buf) as usize);
        if self.len() < required {
            return Err(DecodeError::InvalidLength(required as u16));
        }
        Ok(())
    }
}

// ===== impl LsuAdvView =====

impl LsuAdvView {
    pub fn new(reverse_offset: usize) -> LsuAdvView {
        LsuAdvView {
            reverse_offset,
            enclosing: None,
        }
    }

    pub fn subnet(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf))
    }

    pub fn set_subnet(&self, buf: &mut PacketBuffer, subnet: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf), subnet);
    }

    pub fn subnet_mask(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 4)
    }

    pub fn set_subnet_mask(&self, buf: &mut PacketBuffer, mask: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 4, mask);
    }

    pub fn router_id(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 8)
    }

    pub fn set_router_id(&self, buf: &mut PacketBuffer, id: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 8, id);
    }
}

impl View for LsuAdvView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, _buf: &PacketBuffer) -> DecodeResult<()> {
        if self.len() < LSU_ADV_SIZE {
            return Err(DecodeError::IncompletePacket);
        }
        Ok(())
    }
}
