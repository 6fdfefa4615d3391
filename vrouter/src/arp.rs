//
// arp.rs - ARP Resolver State and Frame Surgery
//
// Purpose:
//   This module keeps the bounded IP-to-MAC cache the send path resolves
//   next hops against, and builds the two ARP frames the router emits:
//   broadcast requests and in-place request-to-reply conversions.
//
// How it works:
//   - The cache is a fixed array of 256 slots. Lookup is a single linear
//     scan that stops at the first slot which either matches the address or
//     is free, so a subsequent insert lands in exactly the slot the lookup
//     reported. A scan that finds neither reports the table as full.
//   - Entries are never evicted, only overwritten. A sweep, gated to run at
//     most once per ARP_CHECK_EVERY seconds, bumps the retry counter of
//     every entry older than ARP_TTL and reports it for a refresh
//     broadcast; the send path treats a counter at ARP_MAX_TRIES as an
//     unreachable next hop.
//   - Probing is fire-and-forget: nothing here returns errors, the reply
//     (or its absence) is the only signal.
//
// Main components:
//   - ArpTable / ArpEntry / ArpLookup: the cache and its tagged lookup
//     result.
//   - build_request / convert_request_to_reply: frame construction.
//

use std::net::Ipv4Addr;

use crate::iface::Iface;
use crate::packet::{
    ARP_FRAME_LEN, ARP_HRD_ETHER, ARP_OP_REPLY, ARP_OP_REQUEST, ArpFrame, ETH_BROADCAST,
    ETHERTYPE_ARP, ETHERTYPE_IPV4, EthFrame,
};

pub const ARP_TABLE_SIZE: usize = 256;

/// Seconds before an entry goes stale and gets refreshed.
pub const ARP_TTL: u64 = 60;
/// Minimum seconds between age sweeps.
pub const ARP_CHECK_EVERY: u64 = 10;
/// Unacknowledged refreshes before a next hop counts as unreachable.
pub const ARP_MAX_TRIES: u8 = 5;

#[derive(Clone, Debug)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: [u8; 6],
    pub ifidx: u8,
    pub tries: u8,
    pub created: u64,
}

/// Where a lookup landed: a matching slot, the first free slot (usable for
/// an immediate insert), or nowhere at all.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArpLookup {
    Hit(usize),
    Free(usize),
    Full,
}

pub struct ArpTable {
    slots: [Option<ArpEntry>; ARP_TABLE_SIZE],
    last_sweep: u64,
}

impl ArpTable {
    pub fn new() -> Self {
        Self {
            slots: [const { None }; ARP_TABLE_SIZE],
            last_sweep: 0,
        }
    }

    /// Scan for `ip`, stopping at the first slot that matches or is free.
    pub fn lookup(&self, ip: Ipv4Addr) -> ArpLookup {
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(entry) if entry.ip == ip => return ArpLookup::Hit(i),
                None => return ArpLookup::Free(i),
                _ => {}
            }
        }
        ArpLookup::Full
    }

    pub fn entry(&self, slot: usize) -> Option<&ArpEntry> {
        self.slots.get(slot)?.as_ref()
    }

    /// Install a resolution, overwriting whatever the lookup slot held and
    /// resetting its retry budget.
    pub fn insert(&mut self, ip: Ipv4Addr, mac: [u8; 6], ifidx: u8, now: u64) -> Option<usize> {
        match self.lookup(ip) {
            ArpLookup::Hit(i) | ArpLookup::Free(i) => {
                self.slots[i] = Some(ArpEntry {
                    ip,
                    mac,
                    ifidx,
                    tries: 0,
                    created: now,
                });
                log::debug!("arp: learned {ip} in slot {i}");
                Some(i)
            }
            ArpLookup::Full => {
                log::warn!("arp: table full, cannot learn {ip}");
                None
            }
        }
    }

    /// Age pass. Gated to once per ARP_CHECK_EVERY seconds; every entry
    /// older than ARP_TTL gets its retry counter bumped and is reported as
    /// `(ip, ifidx)` for a refresh broadcast.
    pub fn sweep(&mut self, now: u64) -> Vec<(Ipv4Addr, u8)> {
        if now.saturating_sub(self.last_sweep) < ARP_CHECK_EVERY {
            return Vec::new();
        }
        self.last_sweep = now;
        let mut due = Vec::new();
        for entry in self.slots.iter_mut().flatten() {
            if now.saturating_sub(entry.created) <= ARP_TTL {
                continue;
            }
            entry.tries = entry.tries.saturating_add(1);
            due.push((entry.ip, entry.ifidx));
        }
        due
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn clear(&mut self) {
        self.slots = [const { None }; ARP_TABLE_SIZE];
        self.last_sweep = 0;
    }
}

impl Default for ArpTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a broadcast request asking for `target`, sourced from `iface`.
/// The target hardware address is left zero, as a request's should be.
pub fn build_request(iface: &Iface, target: Ipv4Addr) -> [u8; ARP_FRAME_LEN] {
    let mut buf = [0u8; ARP_FRAME_LEN];
    let mut eth = EthFrame::new(&mut buf[..]);
    eth.set_dst(&ETH_BROADCAST);
    eth.set_src(&iface.mac);
    eth.set_ethertype(ETHERTYPE_ARP);
    let mut arp = ArpFrame::new(&mut buf[..]);
    arp.set_hardware(ARP_HRD_ETHER);
    arp.set_protocol(ETHERTYPE_IPV4);
    arp.set_addr_lens(6, 4);
    arp.set_opcode(ARP_OP_REQUEST);
    arp.set_sender_mac(&iface.mac);
    arp.set_sender_ip(iface.ip);
    arp.set_target_ip(target);
    buf
}

/// Rewrite a request addressed to `iface` into the reply, in place, ready
/// to go back out the way it came. A request for any other address is left
/// alone and the caller drops it.
pub fn convert_request_to_reply(frame: &mut [u8], iface: &Iface) -> bool {
    let mut arp = ArpFrame::new(&mut *frame);
    if arp.target_ip() != iface.ip {
        log::debug!("arp: request for {} is not ours", arp.target_ip());
        return false;
    }
    let sender_mac = arp.sender_mac();
    let sender_ip = arp.sender_ip();
    let target_ip = arp.target_ip();
    arp.set_opcode(ARP_OP_REPLY);
    arp.set_target_mac(&sender_mac);
    arp.set_sender_mac(&iface.mac);
    arp.set_sender_ip(target_ip);
    arp.set_target_ip(sender_ip);
    let mut eth = EthFrame::new(frame);
    let requester = eth.src();
    eth.set_dst(&requester);
    eth.set_src(&iface.mac);
    true
}
