//
// ip.rs - IPv4/ICMP Engine
//
// Purpose:
//   Everything that rewrites an IPv4 datagram: turning a packet around as a
//   reply (echo, traceroute, time exceeded) and pushing one forward with a
//   decremented TTL. All surgery is in place on the scratch buffer the
//   dispatcher built; replies are always emitted with a 20-byte IP header.
//
// How it works:
//   - reverse() is the shared reply step: swap MACs and addresses,
//     normalize the header (IHL 5, no fragmentation, fresh TTL, protocol
//     ICMP), stamp the new total length and recompute the header checksum.
//   - The ICMP builders then fix up the type-specific fields and checksum
//     the ICMP region.
//   - The time-exceeded builder keeps the leading 32 bytes of the offending
//     datagram as the reply payload and addresses the reply from the
//     interface the datagram would have left through, growing the scratch
//     buffer when the 74-byte reply is longer than the original frame.
//

use crate::checksum::inet_checksum;
use crate::packet::{
    ETH_HDR_LEN, EthFrame, HOP_LIMIT, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, ICMP_TIME_EXCEEDED,
    ICMP_TRACEROUTE, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP, IPV4_OFF, Ipv4Frame, L4_OFF,
};
use crate::router::{Bundle, Router};
use std::net::Ipv4Addr;

/// Bytes of the offending datagram preserved in a time-exceeded reply.
const SNAPSHOT_LEN: usize = 32;
/// IP total length of a time-exceeded reply: header + ICMP header + snapshot.
const REPLY_TOTAL: u16 = 60;
const REPLY_FRAME: usize = ETH_HDR_LEN + REPLY_TOTAL as usize;

const TRACEROUTE_MTU: u32 = 1500;

/// Turn a packet around: swap Ethernet addresses, normalize the IP header
/// to IHL 5, clear fragmentation, reset the TTL, set protocol ICMP, swap
/// the IP addresses, stamp `total_len` and recompute the header checksum.
pub fn reverse(frame: &mut [u8], total_len: u16) {
    let mut eth = EthFrame::new(&mut *frame);
    let dst = eth.dst();
    let src = eth.src();
    eth.set_dst(&src);
    eth.set_src(&dst);

    let mut ip = Ipv4Frame::new(&mut *frame);
    ip.set_version_ihl(0x45);
    ip.set_frag_off(0);
    ip.set_ttl(HOP_LIMIT);
    ip.set_protocol(IPPROTO_ICMP);
    ip.set_checksum(0);
    let s = ip.src();
    let d = ip.dst();
    ip.set_src(d);
    ip.set_dst(s);
    ip.set_total_len(total_len);
    let sum = inet_checksum(&frame[IPV4_OFF..L4_OFF]);
    Ipv4Frame::new(frame).set_checksum(sum);
}

/// Decrement the TTL and recompute the header checksum.
pub fn forward(frame: &mut [u8]) {
    let mut ip = Ipv4Frame::new(&mut *frame);
    let ttl = ip.ttl();
    ip.set_ttl(ttl.wrapping_sub(1));
    ip.set_checksum(0);
    let header_len = ip.header_len();
    let sum = inet_checksum(&frame[IPV4_OFF..IPV4_OFF + header_len]);
    Ipv4Frame::new(frame).set_checksum(sum);
}

fn echo_reply(b: &mut Bundle) {
    let raw_len = b.data.len();
    let total = Ipv4Frame::new(&b.data[..]).total_len();
    reverse(&mut b.data, total);
    let mut ip = Ipv4Frame::new(&mut b.data[..]);
    ip.set_icmp_type(ICMP_ECHO_REPLY);
    ip.set_icmp_code(0);
    ip.set_icmp_checksum(0);
    let sum = inet_checksum(&b.data[L4_OFF..raw_len]);
    Ipv4Frame::new(&mut b.data[..]).set_icmp_checksum(sum);
}

fn traceroute_reply(b: &mut Bundle, speed: u32) {
    let raw_len = b.data.len();
    let total = Ipv4Frame::new(&b.data[..]).total_len();
    reverse(&mut b.data, total);
    let mut ip = Ipv4Frame::new(&mut b.data[..]);
    ip.set_icmp_checksum(0);
    let hops = ip.traceroute_in_hops().wrapping_add(1);
    ip.set_traceroute_in_hops(hops);
    ip.set_traceroute_mtu(TRACEROUTE_MTU);
    ip.set_traceroute_speed(speed);
    let sum = inet_checksum(&b.data[L4_OFF..raw_len]);
    Ipv4Frame::new(&mut b.data[..]).set_icmp_checksum(sum);
}

impl Router {
    /// Rewrite the bundle into an ICMP time-exceeded reply to its sender,
    /// preserving the head of the offending datagram. Also reused when a
    /// destination turns out to be unreachable.
    pub(crate) fn icmp_error_reply(&self, b: &mut Bundle) {
        let mut snapshot = [0u8; SNAPSHOT_LEN];
        let avail = (b.data.len() - IPV4_OFF).min(SNAPSHOT_LEN);
        snapshot[..avail].copy_from_slice(&b.data[IPV4_OFF..IPV4_OFF + avail]);

        // Source the reply from the interface the datagram was heading out
        // of; reverse() swaps it into place.
        let orig_dst = Ipv4Frame::new(&b.data[..]).dst();
        let reply_src = self
            .routes()
            .locate(orig_dst)
            .and_then(|r| self.ifaces().by_index(r.ifidx))
            .or_else(|| self.ifaces().by_index(b.ifidx))
            .map(|i| i.ip)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        Ipv4Frame::new(&mut b.data[..]).set_dst(reply_src);

        if b.data.len() < REPLY_FRAME {
            b.data.resize(REPLY_FRAME, 0);
        }
        reverse(&mut b.data, REPLY_TOTAL);

        let mut ip = Ipv4Frame::new(&mut b.data[..]);
        ip.set_icmp_type(ICMP_TIME_EXCEEDED);
        ip.set_icmp_code(0);
        ip.set_icmp_checksum(0);
        ip.set_icmp_unused();
        b.data[L4_OFF + 8..REPLY_FRAME].copy_from_slice(&snapshot);
        let sum = inet_checksum(&b.data[L4_OFF..REPLY_FRAME]);
        Ipv4Frame::new(&mut b.data[..]).set_icmp_checksum(sum);
        b.len = REPLY_FRAME;
    }

    /// ICMP dispatch. Returns true when the bundle should continue to the
    /// send path, false when it has been consumed.
    pub(crate) fn icmp_handler(&self, b: &mut Bundle) -> bool {
        if b.data.len() < L4_OFF + 8 {
            log::debug!("ip: truncated icmp message, dropping");
            return false;
        }
        let icmp_type = Ipv4Frame::new(&b.data[..]).icmp_type();
        match icmp_type {
            ICMP_ECHO_REQUEST => {
                echo_reply(b);
                true
            }
            ICMP_TRACEROUTE => {
                if b.data.len() < L4_OFF + 20 {
                    log::debug!("ip: truncated traceroute message, dropping");
                    return false;
                }
                // After the turnaround the reply's source is the original
                // destination, which is the interface whose speed gets
                // reported.
                let dst = Ipv4Frame::new(&b.data[..]).dst();
                let speed = self.ifaces().find_by_ip(dst).map_or(0, |i| i.speed);
                traceroute_reply(b, speed);
                true
            }
            other => {
                let dst = Ipv4Frame::new(&b.data[..]).dst();
                if self.ifaces().find_by_ip(dst).is_some() {
                    log::debug!("ip: icmp type {other} for us, nothing to do");
                    false
                } else {
                    forward(&mut b.data);
                    true
                }
            }
        }
    }

    /// Non-ICMP dispatch: TCP and UDP are forwarded, anything else dropped.
    pub(crate) fn ip_handler(&self, b: &mut Bundle) -> bool {
        let proto = Ipv4Frame::new(&b.data[..]).protocol();
        match proto {
            IPPROTO_TCP | IPPROTO_UDP => {
                forward(&mut b.data);
                true
            }
            other => {
                log::debug!("ip: protocol {other} not handled, dropping");
                false
            }
        }
    }
}
