//
// router.rs - Router Aggregate and Packet Dispatcher
//
// Purpose:
//   This module owns all router state (interfaces, routes, ARP cache,
//   backlog, subnet filter) and the two entry points the driver loop calls:
//   handle() for each inbound frame and tick() for the periodic ARP age
//   check.
//
// How it works:
//   - handle() classifies the frame by EtherType. ARP requests are answered
//     in place; ARP replies update the cache and drain the backlog. IPv4
//     frames pass the subnet filter and header checksum, then run the
//     TTL / ICMP / local-delivery / forward chain, after which the backlog
//     is drained and the (possibly rewritten) frame handed to the send
//     path.
//   - try_send() resolves the route and the next hop's ARP entry. An
//     unresolved hop defers the frame into the backlog behind a broadcast
//     probe; a hop that exhausted its retries gets the frame rewritten into
//     an ICMP error back to the sender; a resolved hop fills in the
//     Ethernet addresses and emits.
//   - Inbound bytes are copied once into an owned scratch buffer, so reply
//     builders can grow the frame and deferred frames move into the
//     backlog without another copy.
//
// Main components:
//   - Router: the owned aggregate, configured at startup and then driven
//     single-threadedly by the outer loop.
//   - SendStatus: what became of a frame handed to the send path.
//

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::path::Path;

use etherparse::Ipv4HeaderSlice;
use ipnet::Ipv4Net;

use crate::arp::{self, ARP_MAX_TRIES, ArpLookup, ArpTable};
use crate::backlog::{Backlog, STALE_TIMEOUT};
use crate::checksum::inet_checksum;
use crate::iface::IfaceTable;
use crate::link::{Clock, Link};
use crate::packet::{
    ARP_FRAME_LEN, ARP_OP_REPLY, ARP_OP_REQUEST, ArpFrame, ETH_HDR_LEN, ETHERTYPE_ARP,
    ETHERTYPE_IPV4, EthFrame, IPPROTO_ICMP, Ipv4Frame,
};
use crate::route::RouteTable;

/// One IPv4 frame on its way through the router: the owned scratch bytes,
/// the length to put on the wire (replies may shrink or grow it), and the
/// arrival interface.
pub(crate) struct Bundle {
    pub(crate) data: Vec<u8>,
    pub(crate) len: usize,
    pub(crate) ifidx: u8,
}

/// Outcome of a send attempt.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SendStatus {
    /// Handed to the link (or dropped on a transient link error).
    Sent,
    /// Parked behind an unresolved or in-progress ARP resolution.
    Deferred,
    /// Undeliverable; the frame is discarded.
    Failed,
}

pub struct Router {
    ifaces: IfaceTable,
    routes: RouteTable,
    arp: ArpTable,
    backlog: Backlog,
    subnet: u32,
    mask: u32,
    link: Box<dyn Link>,
    clock: Box<dyn Clock>,
}

impl Router {
    pub fn new(subnet: Ipv4Net, link: Box<dyn Link>, clock: Box<dyn Clock>) -> Self {
        Self {
            ifaces: IfaceTable::new(),
            routes: RouteTable::new(),
            arp: ArpTable::new(),
            backlog: Backlog::new(),
            subnet: u32::from(subnet.network()),
            mask: u32::from(subnet.netmask()),
            link,
            clock,
        }
    }

    // Startup configuration. The substrate hands over interfaces one at a
    // time: add first, then the setters for the most recent record.

    pub fn add_interface(&mut self, name: &str) -> io::Result<()> {
        self.ifaces.add(name)
    }

    pub fn set_iface_mac(&mut self, mac: [u8; 6]) -> io::Result<()> {
        self.ifaces.set_mac(mac)
    }

    pub fn set_iface_ip(&mut self, ip: Ipv4Addr) -> io::Result<()> {
        self.ifaces.set_ip(ip)
    }

    pub fn set_iface_speed(&mut self, speed: u32) -> io::Result<()> {
        self.ifaces.set_speed(speed)
    }

    pub fn add_route(
        &mut self,
        dest: Ipv4Addr,
        gw: Ipv4Addr,
        mask: Ipv4Addr,
        ifname: &str,
    ) -> io::Result<()> {
        self.routes.add(dest, gw, mask, ifname)
    }

    pub fn load_routes(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        self.routes.load(path.as_ref())
    }

    pub fn ifaces(&self) -> &IfaceTable {
        &self.ifaces
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn arp(&self) -> &ArpTable {
        &self.arp
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    /// Log the configured interfaces and routes.
    pub fn dump(&self) {
        for iface in self.ifaces.iter() {
            log::info!("{iface}");
        }
        for route in self.routes.iter() {
            log::info!("{route}");
        }
    }

    /// Entry point for one inbound frame.
    pub fn handle(&mut self, frame: &[u8], ifname: &str) {
        let Some(iface) = self.ifaces.find_by_name(ifname) else {
            log::warn!("router: frame on unknown interface {ifname}, dropping");
            return;
        };
        let ifidx = iface.index;
        if frame.len() < ETH_HDR_LEN {
            log::debug!("router: runt frame ({} bytes) on {ifname}", frame.len());
            return;
        }
        match EthFrame::new(frame).ethertype() {
            ETHERTYPE_ARP => self.handle_arp(frame, ifidx),
            ETHERTYPE_IPV4 => self.handle_ipv4(frame, ifidx),
            other => log::debug!("router: unhandled ethertype {other:#06x} on {ifname}"),
        }
    }

    fn handle_arp(&mut self, frame: &[u8], ifidx: u8) {
        if frame.len() < ARP_FRAME_LEN {
            log::debug!("router: short arp frame ({} bytes)", frame.len());
            return;
        }
        let view = ArpFrame::new(frame);
        match view.opcode() {
            ARP_OP_REQUEST => {
                let Some(iface) = self.ifaces.by_index(ifidx) else {
                    return;
                };
                let mut reply = frame.to_vec();
                if arp::convert_request_to_reply(&mut reply, iface) {
                    if let Err(e) = self.link.transmit(&reply, &iface.name) {
                        log::warn!("router: arp reply on {} failed: {e}", iface.name);
                    }
                }
            }
            ARP_OP_REPLY => {
                let sender_ip = view.sender_ip();
                let sender_mac = view.sender_mac();
                if sender_ip.is_unspecified() {
                    log::debug!("router: arp reply with zero sender, ignoring");
                    return;
                }
                let now = self.clock.now();
                self.arp.insert(sender_ip, sender_mac, ifidx, now);
                self.drain_backlog(now);
            }
            op => log::debug!("router: unknown arp opcode {op}"),
        }
    }

    fn handle_ipv4(&mut self, frame: &[u8], ifidx: u8) {
        let Ok(hdr) = Ipv4HeaderSlice::from_slice(&frame[ETH_HDR_LEN..]) else {
            log::debug!("router: malformed ipv4 header, dropping");
            return;
        };
        let src = hdr.source_addr();
        let dst = hdr.destination_addr();

        // Only traffic with at least one end in the configured subnet is
        // this router's business.
        let in_subnet = |ip: Ipv4Addr| u32::from(ip) & self.subnet & self.mask == self.subnet;
        if !in_subnet(dst) && !in_subnet(src) {
            log::debug!("router: {src} -> {dst} is not for our subnet");
            return;
        }

        let folded = inet_checksum(hdr.slice());
        if folded != 0 {
            log::debug!("router: ip checksum failed (got {folded:#06x}), dropping");
            return;
        }

        let mut b = Bundle {
            data: frame.to_vec(),
            len: frame.len(),
            ifidx,
        };

        let deliver = if hdr.ttl() <= 1 {
            log::debug!("router: ttl expired for {src} -> {dst}");
            self.icmp_error_reply(&mut b);
            true
        } else if hdr.protocol().0 == IPPROTO_ICMP {
            self.icmp_handler(&mut b)
        } else if self.ifaces.find_by_ip(dst).is_some() {
            // Addressed to the router itself but nothing here consumes it.
            self.icmp_error_reply(&mut b);
            true
        } else {
            self.ip_handler(&mut b)
        };
        if !deliver {
            return;
        }

        let now = self.clock.now();
        self.drain_backlog(now);

        let Bundle {
            mut data,
            mut len,
            ifidx,
        } = b;
        if self.try_send(&mut data, &mut len, ifidx) == SendStatus::Deferred {
            self.backlog.push(data, len, ifidx, now);
        }
    }

    /// Resolve the route and next hop for the frame's destination and
    /// either emit it, defer it behind ARP resolution, or turn it into an
    /// ICMP error when the hop is unreachable.
    fn try_send(&mut self, data: &mut Vec<u8>, len: &mut usize, ifidx: u8) -> SendStatus {
        let dst = Ipv4Frame::new(&data[..]).dst();
        let Some((gw, ifname)) = self.next_hop(dst) else {
            log::warn!("router: no route to {dst}, dropping");
            return SendStatus::Failed;
        };
        match self.arp.lookup(gw) {
            ArpLookup::Free(_) => {
                log::debug!("router: next hop {gw} unresolved, buffering");
                self.arp_refresh(gw, &ifname);
                SendStatus::Deferred
            }
            ArpLookup::Full => {
                log::warn!("router: arp table full, dropping packet for {dst}");
                SendStatus::Failed
            }
            ArpLookup::Hit(slot) => {
                let tries = self.arp.entry(slot).map_or(0, |e| e.tries);
                if tries >= ARP_MAX_TRIES {
                    log::debug!("router: next hop {gw} dead after {tries} tries");
                    let mut b = Bundle {
                        data: mem::take(data),
                        len: *len,
                        ifidx,
                    };
                    self.icmp_error_reply(&mut b);
                    *data = b.data;
                    *len = b.len;
                    self.send_error_reply(data, *len)
                } else if tries > 0 {
                    log::debug!("router: next hop {gw} being refreshed (tries {tries}), buffering");
                    SendStatus::Deferred
                } else {
                    self.emit(data, *len, slot, &ifname)
                }
            }
        }
    }

    /// Second resolution pass for a frame just rewritten into an ICMP
    /// error: route it back to the original sender if that hop is usable.
    fn send_error_reply(&mut self, data: &mut Vec<u8>, len: usize) -> SendStatus {
        let dst = Ipv4Frame::new(&data[..]).dst();
        let Some((gw, ifname)) = self.next_hop(dst) else {
            log::warn!("router: no route back to {dst}, dropping");
            return SendStatus::Failed;
        };
        match self.arp.lookup(gw) {
            ArpLookup::Free(_) => {
                self.arp_refresh(gw, &ifname);
                SendStatus::Deferred
            }
            ArpLookup::Full => SendStatus::Failed,
            ArpLookup::Hit(slot) => {
                let tries = self.arp.entry(slot).map_or(0, |e| e.tries);
                if tries >= ARP_MAX_TRIES {
                    log::debug!("router: hop back to {dst} also dead, giving up");
                    SendStatus::Failed
                } else if tries > 0 {
                    SendStatus::Deferred
                } else {
                    self.emit(data, len, slot, &ifname)
                }
            }
        }
    }

    /// Fill in the Ethernet addresses from a resolved ARP slot and hand the
    /// frame to the link. A transient link error drops the frame without
    /// rebuffering.
    fn emit(&mut self, data: &mut [u8], len: usize, slot: usize, ifname: &str) -> SendStatus {
        let Some(entry) = self.arp.entry(slot) else {
            return SendStatus::Failed;
        };
        let dst_mac = entry.mac;
        let Some(iface) = self.ifaces.by_index(entry.ifidx) else {
            log::warn!("router: arp entry bound to missing interface {}", entry.ifidx);
            return SendStatus::Failed;
        };
        let src_mac = iface.mac;
        let mut eth = EthFrame::new(&mut *data);
        eth.set_src(&src_mac);
        eth.set_dst(&dst_mac);
        if let Err(e) = self.link.transmit(&data[..len], ifname) {
            log::warn!("router: send on {ifname} failed: {e}, dropping");
        }
        SendStatus::Sent
    }

    fn next_hop(&self, dst: Ipv4Addr) -> Option<(Ipv4Addr, String)> {
        self.routes
            .locate(dst)
            .map(|r| (r.gw, r.ifname.clone()))
    }

    /// Broadcast a request for `ip` out of `ifname`.
    pub fn arp_refresh(&mut self, ip: Ipv4Addr, ifname: &str) {
        let Some(iface) = self.ifaces.find_by_name(ifname) else {
            log::warn!("router: arp refresh: interface {ifname} not found, aborting");
            return;
        };
        let request = arp::build_request(iface, ip);
        if let Err(e) = self.link.transmit(&request, ifname) {
            log::warn!("router: arp probe on {ifname} failed: {e}");
        }
    }

    /// Prime the cache: one broadcast per routing entry's gateway.
    pub fn arp_scan(&mut self) {
        if self.routes.is_empty() {
            log::info!("router: routing table empty, nothing to scan");
            return;
        }
        let targets: Vec<(Ipv4Addr, String)> = self
            .routes
            .iter()
            .map(|r| (r.gw, r.ifname.clone()))
            .collect();
        for (gw, ifname) in targets {
            self.arp_refresh(gw, &ifname);
        }
    }

    /// Periodic maintenance; cheap to call often, the ARP age sweep gates
    /// itself.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        for (ip, ifidx) in self.arp.sweep(now) {
            let Some(name) = self.ifaces.by_index(ifidx).map(|i| i.name.clone()) else {
                continue;
            };
            log::debug!("router: arp entry for {ip} stale, refreshing on {name}");
            self.arp_refresh(ip, &name);
        }
    }

    /// Retry the parked frames, oldest first. Stale entries go away
    /// silently; still-unresolved ones stay put.
    fn drain_backlog(&mut self, now: u64) {
        let mut cursor = self.backlog.head();
        while let Some(pos) = cursor {
            let next = self.backlog.next_of(pos);
            let created = self.backlog.created(pos).unwrap_or(now);
            if now.saturating_sub(created) > STALE_TIMEOUT {
                log::debug!("router: backlog entry {pos} too old, deleting");
                self.backlog.remove(pos);
            } else if let Some((mut data, mut len, ifidx)) = self.backlog.take_frame(pos) {
                match self.try_send(&mut data, &mut len, ifidx) {
                    SendStatus::Deferred => self.backlog.restore_frame(pos, data, len),
                    _ => self.backlog.remove(pos),
                }
            }
            cursor = next;
        }
    }

    /// Drop all state: interfaces, routes, ARP cache and parked frames.
    pub fn clear(&mut self) {
        self.backlog.clear();
        self.arp.clear();
        self.routes.clear();
        self.ifaces.clear();
    }
}
