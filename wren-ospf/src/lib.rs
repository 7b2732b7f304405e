//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod advertisement;
pub mod daemon;
pub mod debug;
pub mod error;
pub mod interface;
pub mod neighbor;
pub mod route;
pub mod router;
pub mod spf;
pub mod topology;

use std::net::Ipv4Addr;
use std::time::Duration;

pub use crate::router::OspfRouter;

/// Seconds between HELLOs on an interface unless configured otherwise.
pub const DEFAULT_HELLO_INTERVAL: u16 = 10;

/// Interval between unsolicited link-state floods.
pub const DEFAULT_LSU_INTERVAL: Duration = Duration::from_secs(30);

/// Links and nodes unconfirmed for three flood intervals are dead.
pub const LSU_TIMEOUT: Duration = Duration::from_secs(90);

/// Hop limit carried by originated link-state updates.
pub const DEFAULT_LSU_TTL: u16 = 64;

/// The single area this router participates in.
pub const DEFAULT_AREA_ID: Ipv4Addr = Ipv4Addr::UNSPECIFIED;
