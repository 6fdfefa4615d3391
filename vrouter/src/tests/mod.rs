mod checksum;
mod iface;
mod route;
