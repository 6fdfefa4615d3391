//
// main.rs - Ping Scenario
//
// Brings up the two-subnet test network and walks the router through its
// paces: host0 resolves its gateway with ARP, pings the router's own
// address, then pings host1 on the far subnet, which the router can only
// deliver after resolving host1 itself. Run with RUST_LOG=debug to watch
// the exchanges.
//

use std::time::Duration;

use anyhow::Context as _;

use nettest::{HOST1_IP, Net, ROUTER_IP0};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut net = Net::start()?;

    log::info!("pinging the router's own address {ROUTER_IP0}");
    net.host0.ping(ROUTER_IP0.parse()?, 1, 1);
    let (from, _, seq) = net
        .host0
        .wait_echo_reply(WAIT)
        .await
        .context("no echo reply from the router")?;
    log::info!("reply from {from} (seq {seq})");

    log::info!("pinging {HOST1_IP} across subnets");
    net.host0.ping(HOST1_IP.parse()?, 1, 2);
    let (from, _, seq) = net
        .host0
        .wait_echo_reply(WAIT)
        .await
        .context("no echo reply from the far host")?;
    log::info!("reply from {from} (seq {seq})");

    net.shutdown().await;
    log::info!("all pings answered");
    Ok(())
}
