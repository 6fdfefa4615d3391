//
// link.rs - Contracts with the Outside World
//
// The router core is synchronous and owns no I/O. Whatever carries frames to
// and from the network substrate hands the router a Link to emit on, and a
// Clock for wall-time; the driver loop feeds inbound frames to
// Router::handle and calls Router::tick in between.
//

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

/// Frame emitter. An error is a transient downstream failure: the router
/// logs it and drops the frame, it never retries.
pub trait Link: Send {
    fn transmit(&mut self, frame: &[u8], ifname: &str) -> io::Result<()>;
}

/// Wall-clock seconds. All ARP and backlog ages compare values from the
/// same clock, so any monotonic second counter works too.
pub trait Clock: Send {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
