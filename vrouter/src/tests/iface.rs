use crate::iface::{IfaceTable, name_index};
use std::io::ErrorKind;
use std::net::Ipv4Addr;

#[test]
fn name_suffix_is_the_index() {
    assert_eq!(name_index("eth0").unwrap(), 0);
    assert_eq!(name_index("eth17").unwrap(), 17);
    assert_eq!(name_index("vif255").unwrap(), 255);
    assert!(name_index("eth").is_err());
    assert!(name_index("ethx").is_err());
    assert!(name_index("eth256").is_err());
}

#[test]
fn add_then_mutate_last() {
    let mut t = IfaceTable::new();
    t.add("eth0").unwrap();
    t.set_mac([2, 0, 0, 0, 0, 1]).unwrap();
    t.set_ip(Ipv4Addr::new(10, 0, 0, 1)).unwrap();
    t.set_speed(100_000_000).unwrap();
    t.add("eth1").unwrap();
    t.set_mac([2, 0, 0, 0, 0, 2]).unwrap();
    t.set_ip(Ipv4Addr::new(10, 0, 1, 1)).unwrap();

    let eth0 = t.find_by_name("eth0").unwrap();
    assert_eq!(eth0.mac, [2, 0, 0, 0, 0, 1]);
    assert_eq!(eth0.ip, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(eth0.speed, 100_000_000);
    let eth1 = t.by_index(1).unwrap();
    assert_eq!(eth1.name, "eth1");
    assert_eq!(eth1.ip, Ipv4Addr::new(10, 0, 1, 1));
}

#[test]
fn duplicate_index_is_rejected() {
    let mut t = IfaceTable::new();
    t.add("eth0").unwrap();
    let err = t.add("eth0").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    // Different prefix, same suffix: still the same index.
    let err = t.add("vif0").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn setters_require_an_interface() {
    let mut t = IfaceTable::new();
    assert!(t.set_mac([0; 6]).is_err());
    assert!(t.set_ip(Ipv4Addr::new(10, 0, 0, 1)).is_err());
}

#[test]
fn find_by_ip_verifies_the_bucket() {
    let mut t = IfaceTable::new();
    t.add("eth0").unwrap();
    t.set_ip(Ipv4Addr::new(10, 0, 0, 5)).unwrap();
    t.add("eth1").unwrap();
    // Same low byte: the bucket now points at eth1, and the colliding
    // lookup for eth0's address is a miss rather than a wrong record.
    t.set_ip(Ipv4Addr::new(10, 0, 1, 5)).unwrap();

    assert_eq!(t.find_by_ip(Ipv4Addr::new(10, 0, 1, 5)).unwrap().name, "eth1");
    assert!(t.find_by_ip(Ipv4Addr::new(10, 0, 0, 5)).is_none());
    assert!(t.find_by_ip(Ipv4Addr::new(192, 168, 0, 9)).is_none());
}

#[test]
fn clear_releases_everything() {
    let mut t = IfaceTable::new();
    t.add("eth0").unwrap();
    t.set_ip(Ipv4Addr::new(10, 0, 0, 1)).unwrap();
    t.clear();
    assert!(t.is_empty());
    assert!(t.find_by_name("eth0").is_none());
    assert!(t.find_by_ip(Ipv4Addr::new(10, 0, 0, 1)).is_none());
}
