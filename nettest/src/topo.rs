//
// topo.rs - In-Memory Network Topology
//
// Purpose:
//   The synchronous half of the test network: a hub that carries the
//   router's outbound frames to per-interface host channels, scripted hosts
//   that speak just enough ARP and ICMP to exercise the router, and the
//   blocking driver loop that feeds the router and its periodic tick.
//
// How it works:
//   - The router transmits through HubLink, which maps interface names to
//     host channels. Hosts push frames back over a shared uplink channel
//     tagged with the interface they are wired to.
//   - A Host resolves its gateway with a real ARP exchange before the first
//     ping, answers ARP requests for its own address, answers echo
//     requests, and reports what it observes as HostEvents.
//   - run_router is the outer loop the router core expects: one frame, one
//     tick, until cancelled.
//

use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use etherparse::PacketBuilder;
use tokio_util::sync::CancellationToken;

use vrouter::packet::{
    ARP_FRAME_LEN, ARP_OP_REPLY, ARP_OP_REQUEST, ArpFrame, ETH_HDR_LEN, ETHERTYPE_ARP,
    ETHERTYPE_IPV4, EthFrame, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, ICMP_TIME_EXCEEDED,
    IPPROTO_ICMP, Ipv4Frame, L4_OFF,
};
use vrouter::{Iface, Link, Router, arp, inet_checksum, ip};

const POLL_EVERY: Duration = Duration::from_millis(20);

/// Delivers the router's outbound frames to whatever is wired to the named
/// interface.
pub struct HubLink {
    ports: HashMap<String, Sender<Vec<u8>>>,
}

impl HubLink {
    pub fn new(ports: HashMap<String, Sender<Vec<u8>>>) -> Self {
        Self { ports }
    }
}

impl Link for HubLink {
    fn transmit(&mut self, frame: &[u8], ifname: &str) -> io::Result<()> {
        let Some(port) = self.ports.get(ifname) else {
            return Err(io::Error::other(format!("no port wired to {ifname}")));
        };
        port.send(frame.to_vec())
            .map_err(|_| io::Error::other(format!("port {ifname} is down")))
    }
}

/// Drive the router until cancelled: pull one frame, deliver it, tick.
pub fn run_router(
    mut router: Router,
    ingress: Receiver<(String, Vec<u8>)>,
    token: CancellationToken,
) {
    router.dump();
    // Prime the ARP cache with one probe per route gateway.
    router.arp_scan();
    while !token.is_cancelled() {
        match ingress.recv_timeout(POLL_EVERY) {
            Ok((ifname, frame)) => router.handle(&frame, &ifname),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        router.tick();
    }
    router.clear();
    log::debug!("router loop finished");
}

pub enum HostCmd {
    Ping {
        dst: Ipv4Addr,
        id: u16,
        seq: u16,
        ttl: u8,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    GatewayResolved,
    EchoRequest { from: Ipv4Addr },
    EchoReply { from: Ipv4Addr, id: u16, seq: u16 },
    TimeExceeded { from: Ipv4Addr },
}

/// A scripted endpoint wired to one router interface.
pub struct Host {
    pub iface: Iface,
    pub attach: String,
    pub gateway: Ipv4Addr,
    pub rx: Receiver<Vec<u8>>,
    pub cmds: Receiver<HostCmd>,
    pub uplink: Sender<(String, Vec<u8>)>,
    pub events: tokio::sync::mpsc::UnboundedSender<HostEvent>,
    pub token: CancellationToken,
    gw_mac: Option<[u8; 6]>,
    pending: Vec<(Ipv4Addr, u16, u16, u8)>,
}

impl Host {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        iface: Iface,
        attach: String,
        gateway: Ipv4Addr,
        rx: Receiver<Vec<u8>>,
        cmds: Receiver<HostCmd>,
        uplink: Sender<(String, Vec<u8>)>,
        events: tokio::sync::mpsc::UnboundedSender<HostEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            iface,
            attach,
            gateway,
            rx,
            cmds,
            uplink,
            events,
            token,
            gw_mac: None,
            pending: Vec::new(),
        }
    }

    pub fn run(mut self) {
        while !self.token.is_cancelled() {
            while let Ok(cmd) = self.cmds.try_recv() {
                self.command(cmd);
            }
            match self.rx.recv_timeout(POLL_EVERY) {
                Ok(frame) => self.inbound(&frame),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("{}: host loop finished", self.iface.name);
    }

    fn command(&mut self, cmd: HostCmd) {
        match cmd {
            HostCmd::Ping { dst, id, seq, ttl } => {
                if self.gw_mac.is_some() {
                    self.send_echo(dst, id, seq, ttl);
                } else {
                    log::debug!("{}: resolving gateway {}", self.iface.name, self.gateway);
                    self.pending.push((dst, id, seq, ttl));
                    let request = arp::build_request(&self.iface, self.gateway);
                    self.transmit(request.to_vec());
                }
            }
        }
    }

    fn transmit(&self, frame: Vec<u8>) {
        let _ = self.uplink.send((self.attach.clone(), frame));
    }

    fn send_echo(&self, dst: Ipv4Addr, id: u16, seq: u16, ttl: u8) {
        let Some(gw_mac) = self.gw_mac else { return };
        let builder = PacketBuilder::ethernet2(self.iface.mac, gw_mac)
            .ipv4(self.iface.ip.octets(), dst.octets(), ttl)
            .icmpv4_echo_request(id, seq);
        let payload = [0x42u8; 24];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        if builder.write(&mut frame, &payload).is_ok() {
            log::debug!("{}: ping {} (seq {})", self.iface.name, dst, seq);
            self.transmit(frame);
        }
    }

    fn inbound(&mut self, frame: &[u8]) {
        if frame.len() < ETH_HDR_LEN {
            return;
        }
        match EthFrame::new(frame).ethertype() {
            ETHERTYPE_ARP => self.arp_inbound(frame),
            ETHERTYPE_IPV4 => self.ipv4_inbound(frame),
            _ => {}
        }
    }

    fn arp_inbound(&mut self, frame: &[u8]) {
        if frame.len() < ARP_FRAME_LEN {
            return;
        }
        let view = ArpFrame::new(frame);
        match view.opcode() {
            ARP_OP_REQUEST => {
                let mut reply = frame.to_vec();
                if arp::convert_request_to_reply(&mut reply, &self.iface) {
                    self.transmit(reply);
                }
            }
            ARP_OP_REPLY if view.target_ip() == self.iface.ip => {
                if view.sender_ip() == self.gateway {
                    log::debug!(
                        "{}: gateway {} resolved",
                        self.iface.name,
                        self.gateway
                    );
                    self.gw_mac = Some(view.sender_mac());
                    let _ = self.events.send(HostEvent::GatewayResolved);
                    for (dst, id, seq, ttl) in std::mem::take(&mut self.pending) {
                        self.send_echo(dst, id, seq, ttl);
                    }
                }
            }
            _ => {}
        }
    }

    fn ipv4_inbound(&mut self, frame: &[u8]) {
        if frame.len() < L4_OFF + 8 {
            return;
        }
        let view = Ipv4Frame::new(frame);
        if view.dst() != self.iface.ip || view.protocol() != IPPROTO_ICMP {
            return;
        }
        let from = view.src();
        match view.icmp_type() {
            ICMP_ECHO_REQUEST => {
                let _ = self.events.send(HostEvent::EchoRequest { from });
                let mut reply = frame.to_vec();
                let total = Ipv4Frame::new(&reply[..]).total_len();
                ip::reverse(&mut reply, total);
                let mut v = Ipv4Frame::new(&mut reply[..]);
                v.set_icmp_type(ICMP_ECHO_REPLY);
                v.set_icmp_code(0);
                v.set_icmp_checksum(0);
                let sum = inet_checksum(&reply[L4_OFF..]);
                Ipv4Frame::new(&mut reply[..]).set_icmp_checksum(sum);
                self.transmit(reply);
            }
            ICMP_ECHO_REPLY => {
                let id = u16::from_be_bytes([frame[38], frame[39]]);
                let seq = u16::from_be_bytes([frame[40], frame[41]]);
                let _ = self.events.send(HostEvent::EchoReply { from, id, seq });
            }
            ICMP_TIME_EXCEEDED => {
                let _ = self.events.send(HostEvent::TimeExceeded { from });
            }
            _ => {}
        }
    }
}
