//
// pingpong.rs - End-to-End Topology Tests
//
// The full dance over the in-memory network: gateway resolution, echo
// through the router, forwarding across subnets behind the router's own
// ARP resolution, and TTL expiry reported back to the sender.
//

use std::net::Ipv4Addr;
use std::time::Duration;

use nettest::{HOST1_IP, Net, ROUTER_IP0, ROUTER_IP1};

const WAIT: Duration = Duration::from_secs(10);

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn addr(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

#[tokio::test]
async fn ping_the_router_interface() {
    init_logs();
    let mut net = Net::start().unwrap();
    net.host0.ping(addr(ROUTER_IP0), 0x77, 1);
    let reply = net
        .host0
        .wait_echo_reply(WAIT)
        .await
        .expect("the router answers pings to its own address");
    assert_eq!(reply, (addr(ROUTER_IP0), 0x77, 1));
    net.shutdown().await;
}

#[tokio::test]
async fn ping_across_subnets() {
    init_logs();
    let mut net = Net::start().unwrap();
    net.host0.ping(addr(HOST1_IP), 0x99, 1);
    let (from, id, seq) = net
        .host0
        .wait_echo_reply(WAIT)
        .await
        .expect("host1 answers through the router");
    assert_eq!(from, addr(HOST1_IP));
    assert_eq!((id, seq), (0x99, 1));
    net.shutdown().await;
}

#[tokio::test]
async fn expired_ttl_is_reported_to_the_sender() {
    init_logs();
    let mut net = Net::start().unwrap();
    net.host0.ping_with_ttl(addr(HOST1_IP), 1, 1, 1);
    let from = net
        .host0
        .wait_time_exceeded(WAIT)
        .await
        .expect("the router reports the expiry");
    // The reply is sourced from the interface the packet was heading out of.
    assert_eq!(from, addr(ROUTER_IP1));
    net.shutdown().await;
}
