//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::buffer::PacketBuffer;
use crate::checksum;
use crate::error::{DecodeError, DecodeResult};
use crate::ip::{self, IpView};
use crate::view::{PacketView, View};

//
// ICMP header (RFC 792): 1 type, 1 code, 2 checksum, 4 rest-of-header.
// The checksum covers the header and the payload.
//

pub const HEADER_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum IcmpType {
    EchoReply = 0,
    DestUnreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

// Destination Unreachable codes.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum UnreachableCode {
    Network = 0,
    Host = 1,
    Protocol = 2,
    Port = 3,
    FragRequired = 4,
}

// Time Exceeded code for TTL expiry in transit.
pub const CODE_TTL_EXCEEDED: u8 = 0;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IcmpView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

// ===== impl IcmpView =====

impl IcmpView {
    pub fn new(reverse_offset: usize) -> IcmpView {
        IcmpView {
            reverse_offset,
            enclosing: None,
        }
    }

    pub(crate) fn with_enclosing(
        reverse_offset: usize,
        enclosing: PacketView,
    ) -> IcmpView {
        IcmpView {
            reverse_offset,
            enclosing: Some(Box::new(enclosing)),
        }
    }

    pub fn icmp_type(&self, buf: &PacketBuffer) -> Option<IcmpType> {
        IcmpType::from_u8(buf.u8_at(self.offset(buf)))
    }

    pub fn set_icmp_type(&self, buf: &mut PacketBuffer, icmp_type: IcmpType) {
        buf.set_u8_at(self.offset(buf), icmp_type as u8);
    }

    pub fn code(&self, buf: &PacketBuffer) -> u8 {
        buf.u8_at(self.offset(buf) + 1)
    }

    pub fn set_code(&self, buf: &mut PacketBuffer, code: u8) {
        buf.set_u8_at(self.offset(buf) + 1, code);
    }

    pub fn checksum(&self, buf: &PacketBuffer) -> u16 {
        buf.u16_at(self.offset(buf) + 2)
    }

    /// The rest-of-header word (identifier/sequence for echo messages).
    pub fn rest(&self, buf: &PacketBuffer) -> u32 {
        buf.u32_at(self.offset(buf) + 4)
    }

    pub fn set_rest(&self, buf: &mut PacketBuffer, rest: u32) {
        buf.set_u32_at(self.offset(buf) + 4, rest);
    }

    /// Initializes a Time Exceeded message header.
    pub fn init_time_exceeded(&self, buf: &mut PacketBuffer) {
        self.set_icmp_type(buf, IcmpType::TimeExceeded);
        self.set_code(buf, CODE_TTL_EXCEEDED);
        self.set_rest(buf, 0);
    }

    /// Initializes a Destination Unreachable message header.
    pub fn init_dest_unreachable(
        &self,
        buf: &mut PacketBuffer,
        code: UnreachableCode,
    ) {
        self.set_icmp_type(buf, IcmpType::DestUnreachable);
        self.set_code(buf, code as u8);
        self.set_rest(buf, 0);
    }

    /// Quotes the offending packet into an error message body: its IP header
    /// plus at most the first 8 payload bytes. Returns the number of bytes
    /// quoted.
    pub fn copy_original(
        &self,
        buf: &mut PacketBuffer,
        orig_buf: &PacketBuffer,
        orig: &IpView,
    ) -> usize {
        let max_len = orig.header_len(orig_buf) + 8;
        let orig_len = orig.total_len(orig_buf) as usize;
        let len = orig_len.min(max_len);
        let data = orig_buf.bytes(orig.offset(orig_buf), len).to_vec();
        let offset = self.offset(buf) + HEADER_SIZE;
        buf.bytes_mut(offset, len).copy_from_slice(&data);
        len
    }

    /// Number of bytes a quoted error message needs for `orig`.
    pub fn quoted_len(orig_buf: &PacketBuffer, orig: &IpView) -> usize {
        let max_len = orig.header_len(orig_buf) + 8;
        (orig.total_len(orig_buf) as usize).min(max_len)
    }

    /// Recomputes the header+payload checksum in place.
    pub fn reset_checksum(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf);
        buf.set_u16_at(offset + 2, 0);
        let cksum = checksum::checksum(&[self.bytes(buf)]);
        buf.set_u16_at(offset + 2, cksum);
    }

    pub fn checksum_valid(&self, buf: &PacketBuffer) -> bool {
        let data = self.bytes(buf);
        checksum::verify(
            self.checksum(buf),
            &[&data[..2], &[0, 0], &data[4..]],
        )
    }
}

impl View for IcmpView {
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
        if !self.checksum_valid(buf) {
            return Err(DecodeError::InvalidChecksum);
        }
        Ok(())
    }
}

// ===== helper functions =====

/// Total length of an IP-encapsulated error message quoting `orig`.
pub fn error_packet_len(orig_buf: &PacketBuffer, orig: &IpView) -> usize {
    ip::HEADER_SIZE + HEADER_SIZE + IcmpView::quoted_len(orig_buf, orig)
}

/// Builds the view pair for a fresh error message of `pkt_len` bytes.
pub fn new_error_views(pkt_len: usize) -> (IpView, IcmpView) {
    let ip_view = IpView::new(pkt_len);
    let icmp_view = IcmpView::new(pkt_len - ip::HEADER_SIZE);
    (ip_view, icmp_view)
}
