//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::{Duration, Instant};

use wren_utils::task::PeriodicTask;

use crate::router::OspfRouter;

/// Periodic task driving the router's HELLO emission, LSU flooding,
/// neighbor expiry and spanning-tree refresh at 1 s granularity.
pub struct OspfDaemon {
    router: Arc<OspfRouter>,
}

// ===== impl OspfDaemon =====

impl OspfDaemon {
    pub fn new(router: Arc<OspfRouter>) -> OspfDaemon {
        OspfDaemon { router }
    }
}

impl PeriodicTask for OspfDaemon {
    fn name(&self) -> &'static str {
        "ospf"
    }

    fn period(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn run(&mut self, now: Instant) {
        self.router.on_tick(now);
    }
}
