//
// runner.rs - Test Network Orchestration
//
// Purpose:
//   Builds the standard two-subnet topology (host0 - eth0 - router - eth1 -
//   host1), runs the router and both hosts on blocking tasks, and gives
//   async callers handles to command the hosts and await what they observe.
//
// How it works:
//   - Net::start wires the channels, configures the router and spawns the
//     three loops with tokio::task::spawn_blocking.
//   - HostHandle exposes ping commands and an awaitable event stream fed
//     from the host's thread.
//   - shutdown() cancels the shared token and joins the tasks.
//

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use eui48::MacAddress;
use tokio_util::sync::CancellationToken;

use vrouter::{Iface, Router, SystemClock};

use crate::topo::{Host, HostCmd, HostEvent, HubLink, run_router};

pub const ROUTER_SUBNET: &str = "10.0.0.0/24";
pub const ROUTER_IP0: &str = "10.0.0.1";
pub const ROUTER_IP1: &str = "10.0.1.1";
pub const HOST0_IP: &str = "10.0.0.100";
pub const HOST1_IP: &str = "10.0.1.5";

fn mac(s: &str) -> anyhow::Result<[u8; 6]> {
    Ok(MacAddress::parse_str(s)
        .with_context(|| format!("bad mac address {s:?}"))?
        .to_array())
}

fn addr(s: &str) -> anyhow::Result<Ipv4Addr> {
    s.parse().with_context(|| format!("bad address {s:?}"))
}

pub struct HostHandle {
    pub name: String,
    cmds: mpsc::Sender<HostCmd>,
    events: tokio::sync::mpsc::UnboundedReceiver<HostEvent>,
}

impl HostHandle {
    pub fn ping(&self, dst: Ipv4Addr, id: u16, seq: u16) {
        self.ping_with_ttl(dst, id, seq, 64);
    }

    pub fn ping_with_ttl(&self, dst: Ipv4Addr, id: u16, seq: u16, ttl: u8) {
        let _ = self.cmds.send(HostCmd::Ping { dst, id, seq, ttl });
    }

    pub async fn next_event(&mut self, wait: Duration) -> Option<HostEvent> {
        tokio::time::timeout(wait, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for an echo reply, skipping over other observations.
    pub async fn wait_echo_reply(&mut self, wait: Duration) -> Option<(Ipv4Addr, u16, u16)> {
        let deadline = Instant::now() + wait;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            match self.next_event(left).await? {
                HostEvent::EchoReply { from, id, seq } => return Some((from, id, seq)),
                other => log::debug!("{}: skipping {other:?}", self.name),
            }
        }
    }

    pub async fn wait_time_exceeded(&mut self, wait: Duration) -> Option<Ipv4Addr> {
        let deadline = Instant::now() + wait;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            match self.next_event(left).await? {
                HostEvent::TimeExceeded { from } => return Some(from),
                other => log::debug!("{}: skipping {other:?}", self.name),
            }
        }
    }
}

pub struct Net {
    pub host0: HostHandle,
    pub host1: HostHandle,
    token: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Net {
    /// Bring up the router and both hosts. Must be called inside a tokio
    /// runtime.
    pub fn start() -> anyhow::Result<Net> {
        let token = CancellationToken::new();
        let (uplink_tx, uplink_rx) = mpsc::channel();
        let (port0_tx, port0_rx) = mpsc::channel();
        let (port1_tx, port1_rx) = mpsc::channel();

        let mut ports = HashMap::new();
        ports.insert("eth0".to_string(), port0_tx);
        ports.insert("eth1".to_string(), port1_tx);

        let subnet = ROUTER_SUBNET
            .parse()
            .with_context(|| format!("bad subnet {ROUTER_SUBNET:?}"))?;
        let mut router = Router::new(subnet, Box::new(HubLink::new(ports)), Box::new(SystemClock));
        router.add_interface("eth0")?;
        router.set_iface_mac(mac("02:00:00:00:00:01")?)?;
        router.set_iface_ip(addr(ROUTER_IP0)?)?;
        router.set_iface_speed(100_000_000)?;
        router.add_interface("eth1")?;
        router.set_iface_mac(mac("02:00:00:00:00:02")?)?;
        router.set_iface_ip(addr(ROUTER_IP1)?)?;
        router.set_iface_speed(10_000_000)?;
        router.add_route(addr("0.0.0.0")?, addr(HOST0_IP)?, addr("0.0.0.0")?, "eth0")?;
        router.add_route(
            addr("10.0.1.0")?,
            addr(HOST1_IP)?,
            addr("255.255.255.0")?,
            "eth1",
        )?;

        let mut tasks = Vec::new();
        let router_token = token.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            run_router(router, uplink_rx, router_token)
        }));

        let (host0, task) = spawn_host(
            "host0",
            mac("02:00:00:00:01:00")?,
            addr(HOST0_IP)?,
            addr(ROUTER_IP0)?,
            "eth0",
            port0_rx,
            uplink_tx.clone(),
            token.clone(),
        );
        tasks.push(task);
        let (host1, task) = spawn_host(
            "host1",
            mac("02:00:00:00:02:00")?,
            addr(HOST1_IP)?,
            addr(ROUTER_IP1)?,
            "eth1",
            port1_rx,
            uplink_tx,
            token.clone(),
        );
        tasks.push(task);

        Ok(Net {
            host0,
            host1,
            token,
            tasks,
        })
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_host(
    name: &str,
    mac: [u8; 6],
    ip: Ipv4Addr,
    gateway: Ipv4Addr,
    attach: &str,
    rx: mpsc::Receiver<Vec<u8>>,
    uplink: mpsc::Sender<(String, Vec<u8>)>,
    token: CancellationToken,
) -> (HostHandle, tokio::task::JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let iface = Iface {
        name: name.to_string(),
        index: 0,
        mac,
        ip,
        speed: 0,
    };
    let host = Host::new(
        iface,
        attach.to_string(),
        gateway,
        rx,
        cmd_rx,
        uplink,
        event_tx,
        token,
    );
    let task = tokio::task::spawn_blocking(move || host.run());
    (
        HostHandle {
            name: name.to_string(),
            cmds: cmd_tx,
            events: event_rx,
        },
        task,
    )
}
