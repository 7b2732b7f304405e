//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use enum_as_inner::EnumAsInner;

use crate::arp::ArpView;
use crate::buffer::PacketBuffer;
use crate::error::DecodeResult;
use crate::ethernet::EthernetView;
use crate::gre::GreView;
use crate::icmp::IcmpView;
use crate::ip::IpView;
use crate::ospf::{LsuAdvView, OspfHelloView, OspfLsuView, OspfView};

/// A typed cursor into a [`PacketBuffer`].
///
/// Views own no bytes: they carry a reverse offset into the shared buffer
/// plus an optional back-reference to the view they were parsed out of,
/// which lets a handler rewrite outer headers (the ARP reply path rewrites
/// the enclosing Ethernet source). Each subsystem dispatches on the variant
/// with a plain `match`.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
pub enum PacketView {
    Ethernet(EthernetView),
    Arp(ArpView),
    Ip(IpView),
    Icmp(IcmpView),
    Gre(GreView),
    Ospf(OspfView),
    OspfHello(OspfHelloView),
    OspfLsu(OspfLsuView),
    LsuAdvertisement(LsuAdvView),
    Unknown(UnknownView),
}

/// Common behavior of all packet views.
pub trait View {
    /// Offset of the view's first byte, counted back from the end of the
    /// buffer. Stable across buffer growth.
    fn reverse_offset(&self) -> usize;

    /// The view this one was parsed out of, if any.
    fn enclosing(&self) -> Option<&PacketView>;

    /// Verifies length, version and (where present) checksum fields.
    fn validate(&self, buf: &PacketBuffer) -> DecodeResult<()>;

    /// Offset of the view's first byte from the start of the buffer.
    fn offset(&self, buf: &PacketBuffer) -> usize {
        buf.size() - self.reverse_offset()
    }

    /// Bytes spanned by this view, from its first byte to the end of the
    /// buffer.
    fn len(&self) -> usize {
        self.reverse_offset()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The view's bytes, from its first byte to the end of the buffer.
    fn bytes<'a>(&self, buf: &'a PacketBuffer) -> &'a [u8] {
        buf.bytes(self.offset(buf), self.len())
    }

    fn valid(&self, buf: &PacketBuffer) -> bool {
        self.validate(buf).is_ok()
    }
}

/// Payload of an unrecognized ethertype or IP protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownView {
    reverse_offset: usize,
    enclosing: Option<Box<PacketView>>,
}

// ===== impl PacketView =====

impl PacketView {
    pub fn kind(&self) -> &'static str {
        match self {
            PacketView::Ethernet(_) => "ethernet",
            PacketView::Arp(_) => "arp",
            PacketView::Ip(_) => "ipv4",
            PacketView::Icmp(_) => "icmp",
            PacketView::Gre(_) => "gre",
            PacketView::Ospf(_) => "ospf",
            PacketView::OspfHello(_) => "ospf-hello",
            PacketView::OspfLsu(_) => "ospf-lsu",
            PacketView::LsuAdvertisement(_) => "ospf-lsu-adv",
            PacketView::Unknown(_) => "unknown",
        }
    }
}

impl View for PacketView {
    fn reverse_offset(&self) -> usize {
        match self {
            PacketView::Ethernet(view) => view.reverse_offset(),
            PacketView::Arp(view) => view.reverse_offset(),
            PacketView::Ip(view) => view.reverse_offset(),
            PacketView::Icmp(view) => view.reverse_offset(),
            PacketView::Gre(view) => view.reverse_offset(),
            PacketView::Ospf(view) => view.reverse_offset(),
            PacketView::OspfHello(view) => view.reverse_offset(),
            PacketView::OspfLsu(view) => view.reverse_offset(),
            PacketView::LsuAdvertisement(view) => view.reverse_offset(),
            PacketView::Unknown(view) => view.reverse_offset(),
        }
    }

    fn enclosing(&self) -> Option<&PacketView> {
        match self {
            PacketView::Ethernet(view) => view.enclosing(),
            PacketView::Arp(view) => view.enclosing(),
            PacketView::Ip(view) => view.enclosing(),
            PacketView::Icmp(view) => view.enclosing(),
            PacketView::Gre(view) => view.enclosing(),
            PacketView::Ospf(view) => view.enclosing(),
            PacketView::OspfHello(view) => view.enclosing(),
            PacketView::OspfLsu(view) => view.enclosing(),
            PacketView::LsuAdvertisement(view) => view.enclosing(),
            PacketView::Unknown(view) => view.enclosing(),
        }
    }

    fn validate(&self, buf: &PacketBuffer) -> DecodeResult<()> {
        match self {
            PacketView::Ethernet(view) => view.validate(buf),
            PacketView::Arp(view) => view.validate(buf),
            PacketView::Ip(view) => view.validate(buf),
            PacketView::Icmp(view) => view.validate(buf),
            PacketView::Gre(view) => view.validate(buf),
            PacketView::Ospf(view) => view.validate(buf),
            PacketView::OspfHello(view) => view.validate(buf),
            PacketView::OspfLsu(view) => view.validate(buf),
            PacketView::LsuAdvertisement(view) => view.validate(buf),
            PacketView::Unknown(view) => view.validate(buf),
        }
    }
}

// ===== impl UnknownView =====

impl UnknownView {
    pub fn new(reverse_offset: usize) -> UnknownView {
        UnknownView {
            reverse_offset,
            enclosing: None,
        }
    }

    pub(crate) fn with_enclosing(
        reverse_offset: usize,
        enclosing: PacketView,
    ) -> UnknownView {
        UnknownView {
            reverse_offset,
            enclosing: Some(Box::new(enclosing)),
        }
    }
}

impl View for UnknownView {
    fn reverse_offset(&self) -> usize {
        self.reverse_offset
    }

    fn enclosing(&self) -> Option<&PacketView> {
        self.enclosing.as_deref()
    }

    fn validate(&self, _buf: &PacketBuffer) -> DecodeResult<()> {
        Ok(())
    }
}
