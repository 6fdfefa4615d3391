//
// route.rs - Static Routing Table
//
// The table is loaded once at startup (from the four-column ASCII format:
// destination, gateway, netmask, interface) and is read-only afterwards.
// Lookup scans all entries and keeps the match whose masked prefix is
// numerically largest, falling back to the default entry (destination
// 0.0.0.0) when nothing matched; a host route (/32 mask) wins immediately.
//

use std::fmt;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::iface::name_index;

pub struct RouteEntry {
    pub dest: Ipv4Addr,
    pub gw: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub ifname: String,
    pub ifidx: u8,
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.dest, self.gw, self.mask, self.ifname
        )
    }
}

pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

fn parse_addr(field: Option<&str>, line: &str) -> io::Result<Ipv4Addr> {
    let field = field.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("short routing table line {line:?}"),
        )
    })?;
    field.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("cannot convert {field:?} to a valid IP"),
        )
    })
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(
        &mut self,
        dest: Ipv4Addr,
        gw: Ipv4Addr,
        mask: Ipv4Addr,
        ifname: &str,
    ) -> io::Result<()> {
        let ifidx = name_index(ifname)?;
        self.entries.push(RouteEntry {
            dest,
            gw,
            mask,
            ifname: ifname.to_string(),
            ifidx,
        });
        Ok(())
    }

    /// Load routes from a file, one `dest gw mask iface` line per route.
    /// Blank lines are skipped; anything else that does not parse is fatal
    /// to the load.
    pub fn load(&mut self, path: &Path) -> io::Result<()> {
        let text = fs::read_to_string(path)?;
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let Some(first) = fields.next() else { continue };
            let dest = parse_addr(Some(first), line)?;
            let gw = parse_addr(fields.next(), line)?;
            let mask = parse_addr(fields.next(), line)?;
            let ifname = fields.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("missing interface in routing table line {line:?}"),
                )
            })?;
            self.add(dest, gw, mask, ifname)?;
        }
        log::info!("loaded {} routes", self.entries.len());
        Ok(())
    }

    /// Select the route for a destination address.
    ///
    /// Every entry whose masked destination equals the masked address is a
    /// candidate; among candidates the one with the numerically greatest
    /// masked prefix wins, and a full-mask match short-circuits. Entries
    /// with destination 0 are remembered separately (last one wins) and
    /// returned only when no candidate matched.
    pub fn locate(&self, ip: Ipv4Addr) -> Option<&RouteEntry> {
        let ip = u32::from(ip);
        let mut best: Option<(u32, &RouteEntry)> = None;
        let mut default = None;
        for entry in &self.entries {
            let dest = u32::from(entry.dest);
            if dest == 0 {
                default = Some(entry);
                continue;
            }
            let mask = u32::from(entry.mask);
            let prefix = dest & mask;
            if prefix != ip & mask {
                continue;
            }
            if best.is_none_or(|(b, _)| prefix > b) {
                if mask == u32::MAX {
                    return Some(entry);
                }
                best = Some((prefix, entry));
            }
        }
        best.map(|(_, e)| e).or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
