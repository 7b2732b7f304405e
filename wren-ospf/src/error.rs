//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::debug;
use wren_packet::error::DecodeError;

// PWOSPF errors.
//
// Every one of these drops the offending packet without touching protocol
// state, so they log at debug level and are never propagated further.
#[derive(Debug)]
pub enum Error {
    PacketDecodeError(DecodeError),
    AreaIdMismatch(Ipv4Addr, Ipv4Addr),
    HelloMaskMismatch(String, Ipv4Addr),
    HelloIntervalMismatch(String, u16),
    SelfOriginatedLsu(Ipv4Addr),
    StaleSeqno(Ipv4Addr, u16),
    MissingEnclosingIp,
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::PacketDecodeError(error) => {
                debug!(%error, "{}", self);
            }
            Error::AreaIdMismatch(ours, theirs) => {
                debug!(%ours, %theirs, "{}", self);
            }
            Error::HelloMaskMismatch(iface, mask) => {
                debug!(%iface, %mask, "{}", self);
            }
            Error::HelloIntervalMismatch(iface, helloint) => {
                debug!(%iface, %helloint, "{}", self);
            }
            Error::SelfOriginatedLsu(router_id) => {
                debug!(%router_id, "{}", self);
            }
            Error::StaleSeqno(router_id, seqno) => {
                debug!(%router_id, %seqno, "{}", self);
            }
            Error::MissingEnclosingIp => {
                debug!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PacketDecodeError(..) => {
                write!(f, "invalid packet")
            }
            Error::AreaIdMismatch(..) => {
                write!(f, "area ID mismatch")
            }
            Error::HelloMaskMismatch(..) => {
                write!(f, "HELLO subnet mask does not match the interface")
            }
            Error::HelloIntervalMismatch(..) => {
                write!(f, "HELLO interval does not match the interface")
            }
            Error::SelfOriginatedLsu(..) => {
                write!(f, "LSU originated by this router")
            }
            Error::StaleSeqno(..) => {
                write!(f, "LSU sequence number is not newer")
            }
            Error::MissingEnclosingIp => {
                write!(f, "packet has no enclosing IP header")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<DecodeError> for Error {
    fn from(error: DecodeError) -> Error {
        Error::PacketDecodeError(error)
    }
}
