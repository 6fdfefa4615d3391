use crate::checksum::inet_checksum;
use etherparse::PacketBuilder;

#[test]
fn rfc1071_example() {
    // The worked example from RFC 1071 §3.
    let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
    assert_eq!(inet_checksum(&data), 0x220d);
}

#[test]
fn odd_trailing_byte_is_high_padded() {
    let data = [0x01, 0x02, 0x03];
    // 0x0102 + 0x0300 = 0x0402, inverted
    assert_eq!(inet_checksum(&data), !0x0402);
}

#[test]
fn empty_range() {
    assert_eq!(inet_checksum(&[]), 0xffff);
}

#[test]
fn folds_to_zero_over_intact_header() {
    let builder = PacketBuilder::ethernet2(
        [0x02, 0, 0, 0, 0, 1],
        [0x02, 0, 0, 0, 0, 2],
    )
    .ipv4([10, 0, 0, 100], [10, 0, 1, 5], 64)
    .udp(9000, 9001);
    let payload = [0u8; 16];
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, &payload).unwrap();
    // A header carrying its own transmitted checksum folds to zero.
    assert_eq!(inet_checksum(&frame[14..34]), 0);
    // And does not once a bit flips.
    frame[18] ^= 0x40;
    assert_ne!(inet_checksum(&frame[14..34]), 0);
}
