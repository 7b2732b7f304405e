//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::buffer::PacketBuffer;
use crate::checksum;
use crate::error::{DecodeError, DecodeResult};
use crate::view::{PacketView, UnknownView, View};
use crate::{gre, icmp, ospf};

//
// IPv4 header, RFC 791 (options are not produced and not accepted).
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |Version|  IHL  |Type of Service|          Total Length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         Identification        |Flags|      Fragment Offset    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Time to Live |    Protocol   |         Header Checksum       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Source Address                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Destination Address                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//

pub const HEADER_SIZE: usize = 20;
pub const VERSION: u8 = 4;
pub const DEFAULT_TTL: u8 = 64;

// IP protocol numbers understood by the pipeline.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum IpProtocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
    Gre = 47,
    Ospf = 89,
}

bitflags! {
    // IP header flags (upper three bits of the flags/fragment-offset word).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct IpFlags: u8 {
        const RF = 0x4;
        const DF = 0x2;
        const MF = 0x1;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

// ===== impl IpView =====

impl IpView {
    pub fn new(reverse_offset: usize) -> IpView {
        IpView {
            reverse_offset,
            enclosing: None,
        }
    }

    pub(crate) fn with_enclosing(
        reverse_offset: usize,
        enclosing: PacketView,
    ) -> IpView {
        IpView {
            reverse_offset,
            enclosing: Some(Box::new(enclosing)),
        }
    }

    /// Makes room for an IP header in front of a view spanning
    /// `inner_reverse_offset` bytes and returns the header's view.
    pub fn prepend(
        buf: &mut PacketBuffer,
        inner_reverse_offset: usize,
    ) -> IpView {
        buf.ensure_size(inner_reverse_offset + HEADER_SIZE);
        IpView::new(inner_reverse_offset + HEADER_SIZE)
    }

    /// Writes a default header: version 4, no options, zero identification
    /// and fragmentation fields, default TTL. The checksum is left zero.
    pub fn init_default(
        &self,
        buf: &mut PacketBuffer,
        total_len: u16,
        protocol: IpProtocol,
        src: Ipv4Addr,
        dst: Ipv4Addr,
    ) {
        let offset = self.offset(buf);
        buf.set_u8_at(offset, VERSION << 4 | (HEADER_SIZE / 4) as u8);
        buf.set_u8_at(offset + 1, 0);
        buf.set_u16_at(offset + 2, total_len);
        buf.set_u16_at(offset + 4, 0);
        buf.set_u16_at(offset + 6, 0);
        buf.set_u8_at(offset + 8, DEFAULT_TTL);
        buf.set_u8_at(offset + 9, protocol as u8);
        buf.set_u16_at(offset + 10, 0);
        buf.set_ipv4_at(offset + 12, src);
        buf.set_ipv4_at(offset + 16, dst);
    }

    pub fn version(&self, buf: &PacketBuffer) -> u8 {
        buf.u8_at(self.offset(buf)) >> 4
    }

    /// Header length in bytes.
    pub fn header_len(&self, buf: &PacketBuffer) -> usize {
        ((buf.u8_at(self.offset(buf)) & 0x0f) as usize) * 4
    }

    pub fn total_len(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 2)
    }

    pub fn set_total_len(&self, buf: &mut PacketBuffer, len: u16) {
        buf.set_u16_at(self.offset(buf) + 2, len);
    }

    pub fn identification(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 4)
    }

    pub fn set_identification(&self, buf: &mut PacketBuffer, id: u16) {
        buf.set_u16_at(self.offset(buf) + 4, id);
    }

    pub fn flags(&self, buf: &PacketBuffer) -> IpFlags {
        IpFlags::from_bits_truncate((buf.u16_at(self.offset(buf) + 6) >> 13) as u8)
    }

    pub fn set_flags(&self, buf: &mut PacketBuffer, flags: IpFlags) {
        let offset = self.offset(buf) + 6;
        let word = buf.u16_at(offset) & 0x1fff;
        buf.set_u16_at(offset, (flags.bits() as u16) << 13 | word);
    }

    /// Fragment offset in 8-byte units.
    pub fn fragment_offset(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 6) & 0x1fff
    }

    pub fn set_fragment_offset(&self, buf: &mut PacketBuffer, off: u16) {
        let offset = self.offset(buf) + 6;
        let word = buf.u16_at(offset) & 0xe000;
        buf.set_u16_at(offset, word | (off & 0x1fff));
    }

    pub fn ttl(&self, buf: &PacketBuffer) -> u8 {
        buf.u8_at(self.offset(buf) + 8)
    }

    pub fn set_ttl(&self, buf: &mut PacketBuffer, ttl: u8) {
        buf.set_u8_at(self.offset(buf) + 8, ttl);
    }

    pub fn dec_ttl(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf) + 8;
        buf.set_u8_at(offset, buf.u8_at(offset).wrapping_sub(1));
    }

    pub fn tos(&self, buf: &PacketBuffer) -> u8 {
        buf.u8_at(self.offset(buf) + 1)
    }

    pub fn set_tos(&self, buf: &mut PacketBuffer, tos: u8) {
        buf.set_u8_at(self.offset(buf) + 1, tos);
    }

    pub fn protocol(&self, buf: &PacketBuffer) -> Option<IpProtocol> {
        IpProtocol::from_u8(self.protocol_raw(buf))
    }

    pub fn set_protocol(&self, buf: &mut PacketBuffer, protocol: IpProtocol) {
        buf.set_u8_at(self.offset(buf) + 9, protocol as u8);
    }

    /// The protocol byte as carried, known to the pipeline or not.
    pub fn protocol_raw(&self, buf: &PacketBuffer) -> u8 {
        buf.u8_at(self.offset(buf) + 9)
    }

    pub fn set_protocol_raw(&self, buf: &mut PacketBuffer, protocol: u8) {
        buf.set_u8_at(self.offset(buf) + 9, protocol);
    }

    pub fn checksum(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 10)
    }

    pub fn src(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 12)
    }

    pub fn set_src(&self, buf: &mut PacketBuffer, addr: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 12, addr);
    }

    pub fn dst(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 16)
    }

    pub fn set_dst(&self, buf: &mut PacketBuffer, addr: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 16, addr);
    }

    /// Recomputes the header checksum in place.
    pub fn reset_checksum(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf);
        buf.set_u16_at(offset + 10, 0);
        let cksum = {
            let hdr = buf.bytes(offset, HEADER_SIZE);
            checksum::checksum(&[hdr])
        };
        buf.set_u16_at(offset + 10, cksum);
    }

    pub fn checksum_valid(&self, buf: &PacketBuffer) -> bool {
        let offset = self.offset(buf);
        let hdr = buf.bytes(offset, HEADER_SIZE);
        checksum::verify(self.checksum(buf), &[&hdr[..10], &[0, 0], &hdr[12..]])
    }

    /// Returns the next-layer view, chained back to this one.
    pub fn payload(&self, buf: &PacketBuffer) -> PacketView {
        let reverse_offset = self.reverse_offset - self.header_len(buf);
        let enclosing = PacketView::Ip(self.clone());
        match self.protocol(buf) {
            Some(IpProtocol::Icmp) => PacketView::Icmp(
                icmp::IcmpView::with_enclosing(reverse_offset, enclosing),
            ),
            Some(IpProtocol::Gre) => PacketView::Gre(
                gre::GreView::with_enclosing(reverse_offset, enclosing),
            ),
            Some(IpProtocol::Ospf) => PacketView::Ospf(
                ospf::OspfView::with_enclosing(reverse_offset, enclosing),
            ),
            _ => PacketView::Unknown(UnknownView::with_enclosing(
                reverse_offset,
                enclosing,
            )),
        }
    }
}

impl View for IpView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, buf: &PacketBuffer) -> DecodeResult<()> {
        if self.len() < HEADER_SIZE {
            return Err(DecodeError::IncompletePacket);
        }
        let version = self.version(buf);
        if version != VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }
        let header_len = self.header_len(buf);
        if header_len != HEADER_SIZE {
            return Err(DecodeError::InvalidHeaderLength(header_len as u8));
        }
        let total_len = self.total_len(buf);
        if (total_len as usize) < HEADER_SIZE || total_len as usize > self.len()
        {
            return Err(DecodeError::InvalidLength(total_len));
        }
        if !self.checksum_valid(buf) {
            return Err(DecodeError::InvalidChecksum);
        }
        Ok(())
    }
}
