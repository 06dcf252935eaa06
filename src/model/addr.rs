use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};

/// A device's router IPv4 address, as returned by `DeviceConfig::router_ipv4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4RouterAddress(pub Ipv4Addr);

impl Ipv4RouterAddress {
    /// The host's `/32` prefix, used as the MPLS-SR node segment and as the
    /// router-IP rule's match prefix.
    pub fn as_prefix(&self) -> Ipv4Net {
        Ipv4Net::new(self.0, 32).expect("/32 is always a valid IPv4 prefix")
    }
}

/// A device's router IPv6 address, as returned by `DeviceConfig::router_ipv6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv6RouterAddress(pub Ipv6Addr);

impl Ipv6RouterAddress {
    pub fn as_prefix(&self) -> Ipv6Net {
        Ipv6Net::new(self.0, 128).expect("/128 is always a valid IPv6 prefix")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_address_lowers_to_host_prefix() {
        let v4 = Ipv4RouterAddress(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(v4.as_prefix(), Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 1), 32).unwrap());
    }
}
