//
// iface.rs - Interface Registry
//
// Interface records are inserted at startup from the substrate's hardware
// description: add() first, then the MAC/IP/speed setters, which always
// mutate the most recently added record. Two O(1) indexes are derived: the
// decimal suffix of the name ("eth0" -> 0), and the low byte of the IPv4
// address. The low-byte index is a single-bucket hash, so find_by_ip
// verifies the full address and treats a colliding bucket as a miss.
//

use std::fmt;
use std::io;
use std::net::Ipv4Addr;

pub const IFACE_NAME_MAX: usize = 32;

const INDEX_SLOTS: usize = 256;

pub struct Iface {
    pub name: String,
    pub index: u8,
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    /// Link speed in bits per second, reported in traceroute replies.
    pub speed: u32,
}

impl fmt::Display for Iface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mac;
        write!(
            f,
            "{}\tHWaddr {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}\tinet addr {}",
            self.name, m[0], m[1], m[2], m[3], m[4], m[5], self.ip
        )
    }
}

/// Parse the decimal suffix that follows the three-character prefix of an
/// interface name. The suffix is the interface's index and must fit in a
/// byte; anything else is a configuration error.
pub fn name_index(name: &str) -> io::Result<u8> {
    let suffix = match name.get(3..) {
        Some(s) if !s.is_empty() && name.len() <= IFACE_NAME_MAX => s,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bad interface name {name:?}"),
            ));
        }
    };
    let idx: u16 = suffix.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bad interface name {name:?}"),
        )
    })?;
    if idx >= INDEX_SLOTS as u16 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("interface index {idx} out of range"),
        ));
    }
    Ok(idx as u8)
}

pub struct IfaceTable {
    list: Vec<Iface>,
    by_index: [Option<usize>; INDEX_SLOTS],
    by_ip_low: [Option<usize>; INDEX_SLOTS],
}

impl IfaceTable {
    pub fn new() -> Self {
        Self {
            list: Vec::new(),
            by_index: [None; INDEX_SLOTS],
            by_ip_low: [None; INDEX_SLOTS],
        }
    }

    /// Append a new record. The name's decimal suffix becomes its index;
    /// inserting over an occupied index is a configuration error.
    pub fn add(&mut self, name: &str) -> io::Result<()> {
        let index = name_index(name)?;
        if self.by_index[index as usize].is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("interface index {index} already configured"),
            ));
        }
        self.by_index[index as usize] = Some(self.list.len());
        self.list.push(Iface {
            name: name.to_string(),
            index,
            mac: [0; 6],
            ip: Ipv4Addr::UNSPECIFIED,
            speed: 0,
        });
        Ok(())
    }

    fn last_mut(&mut self) -> io::Result<&mut Iface> {
        self.list
            .last_mut()
            .ok_or_else(|| io::Error::other("no interfaces configured"))
    }

    pub fn set_mac(&mut self, mac: [u8; 6]) -> io::Result<()> {
        self.last_mut()?.mac = mac;
        Ok(())
    }

    /// Set the address of the last added record and hook it into the
    /// low-byte index so find_by_ip stays O(1).
    pub fn set_ip(&mut self, ip: Ipv4Addr) -> io::Result<()> {
        let pos = self
            .list
            .len()
            .checked_sub(1)
            .ok_or_else(|| io::Error::other("no interfaces configured"))?;
        self.list[pos].ip = ip;
        self.by_ip_low[ip.octets()[3] as usize] = Some(pos);
        Ok(())
    }

    pub fn set_speed(&mut self, speed: u32) -> io::Result<()> {
        self.last_mut()?.speed = speed;
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Iface> {
        let index = name_index(name).ok()?;
        self.by_index(index)
    }

    pub fn by_index(&self, index: u8) -> Option<&Iface> {
        self.by_index[index as usize].map(|pos| &self.list[pos])
    }

    /// O(1) via the low-byte bucket, then exact-match verification; a
    /// colliding bucket that holds a different address is a miss.
    pub fn find_by_ip(&self, ip: Ipv4Addr) -> Option<&Iface> {
        let pos = self.by_ip_low[ip.octets()[3] as usize]?;
        let iface = &self.list[pos];
        if iface.ip == ip { Some(iface) } else { None }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Iface> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.by_index = [None; INDEX_SLOTS];
        self.by_ip_low = [None; INDEX_SLOTS];
    }
}

impl Default for IfaceTable {
    fn default() -> Self {
        Self::new()
    }
}
