//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use wren_utils::mac_addr::MacAddr;

use crate::buffer::PacketBuffer;
use crate::error::{DecodeError, DecodeResult};
use crate::view::{PacketView, View};

//
// ARP payload, IPv4-over-Ethernet only (28 bytes).
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         Hardware type         |         Protocol type         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |    HW len     |   Proto len   |           Operation           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                   Sender hardware address (6)                 |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                   Sender protocol address (4)                 |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                   Target hardware address (6)                 |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                   Target protocol address (4)                 |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//

pub const PACKET_SIZE: usize = 28;
pub const HW_TYPE_ETHERNET: u16 = 1;
pub const PROTO_TYPE_IP: u16 = 0x0800;

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ArpOperation {
    Request = 1,
    Reply = 2,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArpView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

// ===== impl ArpView =====

impl ArpView {
    pub fn new(reverse_offset: usize) -> ArpView {
        ArpView {
            reverse_offset,
            enclosing: None,
        }
    }

    pub(crate) fn with_enclosing(
        reverse_offset: usize,
        enclosing: PacketView,
    ) -> ArpView {
        ArpView {
            reverse_offset,
            enclosing: Some(Box::new(enclosing)),
        }
    }

    /// Fills in the fixed IPv4-over-Ethernet preamble.
    pub fn init(&self, buf: &mut PacketBuffer) {
        let offset = self.offset(buf);
        buf.set_u16_at(offset, HW_TYPE_ETHERNET);
        buf.set_u16_at(offset + 2, PROTO_TYPE_IP);
        buf.set_u8_at(offset + 4, MacAddr::LENGTH as u8);
        buf.set_u8_at(offset + 5, 4);
    }

    pub fn operation(&self, buf: &PacketBuffer) -> Option<ArpOperation> {
        ArpOperation::from_u16(buf.u16_at(self.offset(buf) + 6))
    }

    pub fn set_operation(&self, buf: &mut PacketBuffer, op: ArpOperation) {
        buf.set_u16_at(self.offset(buf) + 6, op as u16);
    }

    pub fn sender_hw_addr(&self, buf: &PacketBuffer) -> MacAddr {
        buf.mac_at(self.offset(buf) + 8)
    }

    pub fn set_sender_hw_addr(&self, buf: &mut PacketBuffer, addr: MacAddr) {
        buf.set_mac_at(self.offset(buf) + 8, addr);
    }

    pub fn sender_proto_addr(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 14)
    }

    pub fn set_sender_proto_addr(&self, buf: &mut PacketBuffer, addr: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 14, addr);
    }

    pub fn target_hw_addr(&self, buf: &PacketBuffer) -> MacAddr {
        buf.mac_at(self.offset(buf) + 18)
    }

    pub fn set_target_hw_addr(&self, buf: &mut PacketBuffer, addr: MacAddr) {
        buf.set_mac_at(self.offset(buf) + 18, addr);
    }

    pub fn target_proto_addr(&self, buf: &PacketBuffer) -> Ipv4Addr {
        buf.ipv4_at(self.offset(buf) + 24)
    }

    pub fn set_target_proto_addr(&self, buf: &mut PacketBuffer, addr: Ipv4Addr) {
        buf.set_ipv4_at(self.offset(buf) + 24, addr);
    }
}

impl View for ArpView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, buf: &PacketBuffer) -> DecodeResult<()> {
        if self.len() < PACKET_SIZE {
            return Err(DecodeError::IncompletePacket);
        }
        let offset = self.offset(buf);
        let hw_type = buf.u16_at(offset);
        if hw_type != HW_TYPE_ETHERNET {
            return Err(DecodeError::InvalidHwType(hw_type));
        }
        let proto_type = buf.u16_at(offset + 2);
        if proto_type != PROTO_TYPE_IP {
            return Err(DecodeError::InvalidProtoType(proto_type));
        }
        let hw_len = buf.u8_at(offset + 4);
        if hw_len != MacAddr::LENGTH as u8 {
            return Err(DecodeError::InvalidAddrLength(hw_len));
        }
        let proto_len = buf.u8_at(offset + 5);
        if proto_len != 4 {
            return Err(DecodeError::InvalidAddrLength(proto_len));
        }
        if self.operation(buf).is_none() {
            return Err(DecodeError::UnknownOperation(buf.u16_at(offset + 6)));
        }
        Ok(())
    }
}
