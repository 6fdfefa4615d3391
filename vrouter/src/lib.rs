#![doc = include_str!("../../README.md")]

pub mod arp;
pub mod backlog;
pub mod checksum;
pub mod iface;
pub mod ip;
pub mod link;
pub mod packet;
pub mod route;
pub mod router;

pub use arp::{ARP_CHECK_EVERY, ARP_MAX_TRIES, ARP_TTL, ArpEntry, ArpLookup, ArpTable};
pub use backlog::{BACKLOG_SIZE, Backlog, STALE_TIMEOUT};
pub use checksum::inet_checksum;
pub use iface::{Iface, IfaceTable};
pub use link::{Clock, Link, SystemClock};
pub use route::{RouteEntry, RouteTable};
pub use router::{Router, SendStatus};

#[cfg(test)]
mod tests;
