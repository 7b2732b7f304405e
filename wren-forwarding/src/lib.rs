//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod arp_cache;
pub mod arp_queue;
pub mod engine;
pub mod error;
pub mod interface;
pub mod rib;
pub mod tunnel;

pub use crate::engine::{Engine, FrameOutput};
pub use crate::error::Error;
