//! Networking helpers for SDN inventory checks.
//!
//! SDN providers report subnets as an address plus a dotted netmask, while the
//! inventory renders them in CIDR notation. This library converts between the
//! two and names the IP protocol the way the inventory does.

use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),

    /// Netmask whose set bits are not contiguous.
    #[error("invalid netmask: {0} (bits are not contiguous)")]
    InvalidNetmask(Ipv4Addr),

    /// Unknown IP protocol name.
    #[error("unknown IP protocol: {0}")]
    UnknownProtocol(String),
}

// ============================================================================
// Netmasks
// ============================================================================

/// Number of leading one bits in a netmask (`255.255.255.0` is 24).
pub fn netmask_bits(netmask: Ipv4Addr) -> Result<u8, NetworkError> {
    let bits = u32::from(netmask);
    let ones = bits.leading_ones();
    // Everything after the leading ones must be zero.
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return Err(NetworkError::InvalidNetmask(netmask));
    }
    Ok(ones as u8)
}

/// Netmask for a prefix length (24 is `255.255.255.0`).
pub fn netmask_from_bits(prefix_len: u8) -> Result<Ipv4Addr, NetworkError> {
    if prefix_len > 32 {
        return Err(NetworkError::InvalidPrefix(format!(
            "prefix length {} exceeds 32",
            prefix_len
        )));
    }
    Ok(Ipv4Addr::from(mask_bits(prefix_len)))
}

fn mask_bits(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len.min(32)))
    }
}

// ============================================================================
// CIDR
// ============================================================================

/// An IPv4 address with a prefix length.
///
/// The address is kept as given rather than masked, because that is how the
/// inventory renders a subnet's CIDR (`address/bits`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    /// Address as reported by the provider.
    pub address: Ipv4Addr,

    /// Prefix length (e.g., 24 for /24).
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a CIDR, validating the prefix length.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        if prefix_len > 32 {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds 32",
                prefix_len
            )));
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// Build from an address and a dotted netmask, both as strings.
    pub fn from_netmask(address: &str, netmask: &str) -> Result<Self, NetworkError> {
        let address = parse_v4(address)?;
        let netmask = parse_v4(netmask)?;
        Self::new(address, netmask_bits(netmask)?)
    }

    /// Parse from CIDR notation (e.g., "10.0.0.0/24").
    pub fn from_cidr(s: &str) -> Result<Self, NetworkError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(NetworkError::InvalidPrefix(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = parse_v4(addr_str)?;
        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    /// Network address (the address with host bits cleared).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & mask_bits(self.prefix_len))
    }

    /// Netmask in dotted form.
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(mask_bits(self.prefix_len))
    }

    /// Check if an address is within this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask_bits(self.prefix_len) == u32::from(self.network())
    }

    /// Number of addresses in the subnet.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s)
    }
}

fn parse_v4(s: &str) -> Result<Ipv4Addr, NetworkError> {
    Ipv4Addr::from_str(s.trim()).map_err(|_| NetworkError::InvalidAddress(s.to_string()))
}

// ============================================================================
// Protocol
// ============================================================================

/// IP protocol of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    Ipv4,
    Ipv6,
}

impl IpProtocol {
    /// Lowercase name, as shown in the inventory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

impl FromStr for IpProtocol {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            _ => Err(NetworkError::UnknownProtocol(s.to_string())),
        }
    }
}

impl std::fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netmask_bits() {
        assert_eq!(netmask_bits(Ipv4Addr::new(255, 255, 255, 0)).unwrap(), 24);
        assert_eq!(netmask_bits(Ipv4Addr::new(255, 255, 240, 0)).unwrap(), 20);
        assert_eq!(netmask_bits(Ipv4Addr::new(255, 255, 255, 255)).unwrap(), 32);
        assert_eq!(netmask_bits(Ipv4Addr::new(0, 0, 0, 0)).unwrap(), 0);

        assert!(netmask_bits(Ipv4Addr::new(255, 0, 255, 0)).is_err());
        assert!(netmask_bits(Ipv4Addr::new(0, 255, 255, 255)).is_err());
    }

    #[test]
    fn test_netmask_from_bits() {
        assert_eq!(
            netmask_from_bits(24).unwrap(),
            Ipv4Addr::new(255, 255, 255, 0)
        );
        assert_eq!(netmask_from_bits(0).unwrap(), Ipv4Addr::UNSPECIFIED);
        assert!(netmask_from_bits(33).is_err());
    }

    #[test]
    fn test_cidr_from_netmask_keeps_address() {
        let cidr = Ipv4Cidr::from_netmask("10.1.2.3", "255.255.255.0").unwrap();
        assert_eq!(cidr.to_string(), "10.1.2.3/24");
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 1, 2, 0));
        assert_eq!(cidr.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(cidr.size(), 256);
    }

    #[test]
    fn test_cidr_parse_and_contains() {
        let cidr: Ipv4Cidr = "192.168.0.0/16".parse().unwrap();
        assert!(cidr.contains(Ipv4Addr::new(192, 168, 44, 1)));
        assert!(!cidr.contains(Ipv4Addr::new(192, 169, 0, 1)));

        assert!(Ipv4Cidr::from_cidr("192.168.0.0").is_err());
        assert!(Ipv4Cidr::from_cidr("192.168.0.0/40").is_err());
        assert!(Ipv4Cidr::from_cidr("not-an-ip/8").is_err());
    }

    #[test]
    fn test_ip_protocol() {
        assert_eq!("IPV4".parse::<IpProtocol>().unwrap(), IpProtocol::Ipv4);
        assert_eq!(IpProtocol::Ipv6.to_string(), "ipv6");
        assert!("ipx".parse::<IpProtocol>().is_err());
    }
}
