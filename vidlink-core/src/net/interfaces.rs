//! Discovery of the network attachments a server can be reached on.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// Address entry as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub up: bool,
    /// `None` for entries without an address (for example link-layer
    /// entries).
    pub address: Option<IpAddr>,
}

/// Source of the host's address entries, in enumeration order.
pub trait InterfaceSource {
    fn addresses(&self) -> io::Result<Vec<InterfaceAddress>>;
}

/// Interface that carries an IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: String,
    pub address: Ipv4Addr,
}

impl fmt::Display for InterfaceRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.address)
    }
}

/// List the interfaces that are up and carry a non-loopback IPv4 address.
/// The enumeration order of the source is kept.
pub fn discover(source: &impl InterfaceSource) -> io::Result<Vec<InterfaceRecord>> {
    let records = source
        .addresses()?
        .into_iter()
        .filter(|entry| entry.up)
        .filter_map(|entry| match entry.address {
            Some(IpAddr::V4(address)) if !address.is_loopback() => Some(InterfaceRecord {
                name: entry.name,
                address,
            }),
            _ => None,
        })
        .collect::<Vec<_>>();
    tracing::debug!(count = records.len(), "discovered network interfaces");
    Ok(records)
}

/// Addresses of the local host, enumerated with `getifaddrs`.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

#[cfg(unix)]
impl InterfaceSource for SystemInterfaces {
    fn addresses(&self) -> io::Result<Vec<InterfaceAddress>> {
        use nix::ifaddrs::getifaddrs;
        use nix::net::if_::InterfaceFlags;

        let addresses = getifaddrs()
            .map_err(io::Error::from)?
            .map(|entry| InterfaceAddress {
                up: entry.flags.contains(InterfaceFlags::IFF_UP),
                address: entry
                    .address
                    .as_ref()
                    .and_then(|address| address.as_sockaddr_in())
                    .map(|address| IpAddr::V4(address.ip())),
                name: entry.interface_name,
            })
            .collect();
        Ok(addresses)
    }
}
