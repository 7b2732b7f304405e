//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::buffer::PacketBuffer;
use crate::checksum;
use crate::error::{DecodeError, DecodeResult};
use crate::ethernet::EtherType;
use crate::ip::IpView;
use crate::view::{PacketView, UnknownView, View};

//
// GRE header, checksummed RFC 2784 form only (8 bytes):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |C|       Reserved0       | Ver |         Protocol Type         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Checksum            |           Reserved1           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// The serializer always sets C = 1; the checksum covers the header and the
// encapsulated payload.
//

pub const HEADER_SIZE: usize = 8;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GreView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

// ===== impl GreView =====

impl GreView {
    pub fn new(reverse_offset: usize) -> GreView {
        GreView {
            reverse_offset,
            enclosing: None,
        }
    }

    pub(crate) fn with_enclosing(
        reverse_offset: usize,
        enclosing: PacketView,
    ) -> GreView {
        GreView {
            reverse_offset,
            enclosing: Some(Box::new(enclosing)),
        }
    }

    /// Makes room for a GRE header in front of a view spanning
    /// `inner_reverse_offset` bytes and returns the header's view.
    pub fn prepend(
        buf: &mut PacketBuffer,
        inner_reverse_offset: usize,
    ) -> GreView {
        buf.ensure_size(inner_reverse_offset + HEADER_SIZE);
        GreView::new(inner_reverse_offset + HEADER_SIZE)
    }

    /// Writes the fixed header: C = 1, version 0, IPv4 payload, reserved
    /// fields zero. The checksum is left zero.
    pub fn init(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf);
        buf.set_u8_at(offset, 0x80);
        buf.set_u8_at(offset + 1, 0);
        buf.set_u16_at(offset + 2, EtherType::Ip as u16);
        buf.set_u16_at(offset + 4, 0);
        buf.set_u16_at(offset + 6, 0);
    }

    pub fn checksum_present(&self, buf: &PacketBuffer) -> bool {
        buf.u8_at(self.offset(buf)) & 0x80 != 0
    }

    pub fn version(&self, buf: &PacketBuffer) -> u8 {
        buf.u8_at(self.offset(buf) + 1) & 0x07
    }

    pub fn protocol_type(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 2)
    }

    pub fn checksum(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 4)
    }

    /// Recomputes the header+payload checksum in place.
    pub fn reset_checksum(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf);
        buf.set_u16_at(offset + 4, 0);
        let cksum = checksum::checksum(&[self.bytes(buf)]);
        buf.set_u16_at(offset + 4, cksum);
    }

    pub fn checksum_valid(&self, buf: &PacketBuffer) -> bool {
        let data = self.bytes(buf);
        checksum::verify(
            self.checksum(buf),
            &[&data[..4], &[0, 0], &data[6..]],
        )
    }

    /// Returns the encapsulated view, chained back to this one.
    pub fn payload(&self, buf: &PacketBuffer) -> PacketView {
        let reverse_offset = self.reverse_offset - HEADER_SIZE;
        let enclosing = PacketView::Gre(self.clone());
        if self.protocol_type(buf) == EtherType::Ip as u16 {
            PacketView::Ip(IpView::with_enclosing(reverse_offset, enclosing))
        } else {
            PacketView::Unknown(UnknownView::with_enclosing(
                reverse_offset,
                enclosing,
            ))
        }
    }
}

impl View for GreView {
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
        let flags = buf.u8_at(self.offset(buf));
        if flags != 0x80 {
            return Err(DecodeError::InvalidGreFlags(flags));
        }
        let version = self.version(buf);
        if version != 0 {
            return Err(DecodeError::InvalidVersion(version));
        }
        let proto_type = self.protocol_type(buf);
        if proto_type != EtherType::Ip as u16 {
            return Err(DecodeError::InvalidProtoType(proto_type));
        }
        if !self.checksum_valid(buf) {
            return Err(DecodeError::InvalidChecksum);
        }
        Ok(())
    }
}
