use crate::route::RouteTable;
use std::net::Ipv4Addr;

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn table(routes: &[(&str, &str, &str, &str)]) -> RouteTable {
    let mut t = RouteTable::new();
    for (dest, gw, mask, ifname) in routes {
        t.add(ip(dest), ip(gw), ip(mask), ifname).unwrap();
    }
    t
}

#[test]
fn most_specific_prefix_wins() {
    let t = table(&[
        ("10.1.0.0", "10.1.0.254", "255.255.0.0", "eth0"),
        ("10.1.2.0", "10.1.2.254", "255.255.255.0", "eth1"),
        ("0.0.0.0", "10.0.0.100", "0.0.0.0", "eth2"),
    ]);
    // 10.1.2.0 is numerically greater than 10.1.0.0, so the /24 is chosen.
    assert_eq!(t.locate(ip("10.1.2.3")).unwrap().ifname, "eth1");
    assert_eq!(t.locate(ip("10.1.9.9")).unwrap().ifname, "eth0");
}

#[test]
fn default_is_the_fallback() {
    let t = table(&[
        ("10.1.0.0", "10.1.0.254", "255.255.0.0", "eth0"),
        ("0.0.0.0", "10.0.0.100", "0.0.0.0", "eth2"),
    ]);
    assert_eq!(t.locate(ip("192.168.9.9")).unwrap().ifname, "eth2");
}

#[test]
fn last_default_wins() {
    let t = table(&[
        ("0.0.0.0", "10.0.0.100", "0.0.0.0", "eth0"),
        ("0.0.0.0", "10.0.0.200", "0.0.0.0", "eth1"),
    ]);
    assert_eq!(t.locate(ip("192.168.9.9")).unwrap().ifname, "eth1");
}

#[test]
fn host_route_short_circuits() {
    let t = table(&[
        ("10.1.2.3", "10.1.2.3", "255.255.255.255", "eth3"),
        ("10.1.0.0", "10.1.0.254", "255.255.0.0", "eth0"),
    ]);
    assert_eq!(t.locate(ip("10.1.2.3")).unwrap().ifname, "eth3");
    assert_eq!(t.locate(ip("10.1.2.4")).unwrap().ifname, "eth0");
}

#[test]
fn a_match_beats_the_default_even_with_prefix_zero() {
    // Masked prefix 0.0.0.0 on a non-default entry still counts as a match.
    let t = table(&[
        ("0.0.0.9", "10.0.0.9", "255.0.0.0", "eth1"),
        ("0.0.0.0", "10.0.0.100", "0.0.0.0", "eth0"),
    ]);
    assert_eq!(t.locate(ip("0.1.2.3")).unwrap().ifname, "eth1");
}

#[test]
fn no_route_at_all() {
    let t = table(&[("10.1.0.0", "10.1.0.254", "255.255.0.0", "eth0")]);
    assert!(t.locate(ip("192.168.9.9")).is_none());
    assert!(RouteTable::new().locate(ip("10.1.1.1")).is_none());
}

#[test]
fn load_from_file() {
    let path = std::env::temp_dir().join(format!("rt-load-{}", std::process::id()));
    std::fs::write(
        &path,
        "0.0.0.0 10.0.0.100 0.0.0.0 eth0\n\n10.0.1.0 10.0.1.5 255.255.255.0 eth1\n",
    )
    .unwrap();
    let mut t = RouteTable::new();
    t.load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(t.len(), 2);
    assert_eq!(t.locate(ip("10.0.1.7")).unwrap().gw, ip("10.0.1.5"));
}

#[test]
fn load_rejects_garbage() {
    let path = std::env::temp_dir().join(format!("rt-bad-{}", std::process::id()));
    std::fs::write(&path, "0.0.0.0 not-an-ip 0.0.0.0 eth0\n").unwrap();
    let mut t = RouteTable::new();
    assert!(t.load(&path).is_err());
    std::fs::remove_file(&path).ok();

    let path = std::env::temp_dir().join(format!("rt-short-{}", std::process::id()));
    std::fs::write(&path, "0.0.0.0 10.0.0.100\n").unwrap();
    let mut t = RouteTable::new();
    assert!(t.load(&path).is_err());
    std::fs::remove_file(&path).ok();
}
