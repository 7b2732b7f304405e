//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// Packet decode/validation errors.
//
// A failed validation drops the offending frame; these errors never cross
// the dispatch boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    IncompletePacket,
    InvalidVersion(u8),
    InvalidHeaderLength(u8),
    InvalidLength(u16),
    InvalidChecksum,
    UnknownEtherType(u16),
    InvalidHwType(u16),
    InvalidProtoType(u16),
    InvalidAddrLength(u8),
    UnknownOperation(u16),
    UnknownPacketType(u8),
    NonZeroAuthField,
    NonZeroPadding,
    NotAllOspfRouters,
    InvalidGreFlags(u8),
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompletePacket => {
                write!(f, "incomplete packet")
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "invalid packet version: {}", version)
            }
            DecodeError::InvalidHeaderLength(length) => {
                write!(f, "invalid header length: {}", length)
            }
            DecodeError::InvalidLength(length) => {
                write!(f, "invalid packet length: {}", length)
            }
            DecodeError::InvalidChecksum => {
                write!(f, "invalid checksum")
            }
            DecodeError::UnknownEtherType(ethertype) => {
                write!(f, "unknown ethertype: {:#06x}", ethertype)
            }
            DecodeError::InvalidHwType(hw_type) => {
                write!(f, "invalid hardware type: {}", hw_type)
            }
            DecodeError::InvalidProtoType(proto_type) => {
                write!(f, "invalid protocol type: {:#06x}", proto_type)
            }
            DecodeError::InvalidAddrLength(length) => {
                write!(f, "invalid address length: {}", length)
            }
            DecodeError::UnknownOperation(operation) => {
                write!(f, "unknown operation: {}", operation)
            }
            DecodeError::UnknownPacketType(pkt_type) => {
                write!(f, "unknown packet type: {}", pkt_type)
            }
            DecodeError::NonZeroAuthField => {
                write!(f, "autype or auth fields are not zero")
            }
            DecodeError::NonZeroPadding => {
                write!(f, "padding is not zero")
            }
            DecodeError::NotAllOspfRouters => {
                write!(f, "destination is not the all-OSPF-routers group")
            }
            DecodeError::InvalidGreFlags(flags) => {
                write!(f, "invalid GRE flags: {:#04x}", flags)
            }
        }
    }
}

impl std::error::Error for DecodeError {}
