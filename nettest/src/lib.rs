//!
//! # Router Test Network
//!
//! An in-memory network for exercising the router end to end: scripted
//! hosts wired to the router's interfaces over channels, a hub carrying its
//! outbound frames, and async handles for commanding the hosts and awaiting
//! what they see. Everything here talks to the router only through its
//! public contract: frames in, frames out, ticks in between.
//!

pub mod runner;
pub mod topo;

pub use runner::{HOST0_IP, HOST1_IP, HostHandle, Net, ROUTER_IP0, ROUTER_IP1};
pub use topo::{Host, HostCmd, HostEvent, HubLink, run_router};
