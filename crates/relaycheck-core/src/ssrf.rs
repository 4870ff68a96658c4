//! Outbound address guard.
//!
//! A relay host supplied by a user must never steer the validator into the
//! local network, the loopback interface or cloud metadata endpoints. Every
//! address the host resolves to is checked against a fixed table of reserved
//! ranges before any connection is opened.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A CIDR range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    base: IpAddr,
    prefix: u8,
}

impl IpRange {
    const fn v4(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> Self {
        Self {
            base: IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
            prefix,
        }
    }

    #[allow(clippy::many_single_char_names)]
    const fn v6(segments: [u16; 8], prefix: u8) -> Self {
        let [a, b, c, d, e, f, g, h] = segments;
        Self {
            base: IpAddr::V6(Ipv6Addr::new(a, b, c, d, e, f, g, h)),
            prefix,
        }
    }

    /// Returns true if `ip` lies inside the range. Families never mix.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.base, ip) {
            (IpAddr::V4(base), IpAddr::V4(ip)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix))
                    .unwrap_or(0);
                u32::from(base) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(base), IpAddr::V6(ip)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix))
                    .unwrap_or(0);
                u128::from(base) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

/// Ranges a relay host must not resolve into.
pub static BLOCKED_RANGES: &[IpRange] = &[
    // "this network"
    IpRange::v4(0, 0, 0, 0, 8),
    // RFC 1918
    IpRange::v4(10, 0, 0, 0, 8),
    // carrier-grade NAT
    IpRange::v4(100, 64, 0, 0, 10),
    IpRange::v4(127, 0, 0, 0, 8),
    // link-local, includes cloud metadata at 169.254.169.254
    IpRange::v4(169, 254, 0, 0, 16),
    IpRange::v4(172, 16, 0, 0, 12),
    IpRange::v4(192, 0, 0, 0, 24),
    IpRange::v4(192, 168, 0, 0, 16),
    // benchmarking
    IpRange::v4(198, 18, 0, 0, 15),
    // multicast, then reserved through broadcast
    IpRange::v4(224, 0, 0, 0, 4),
    IpRange::v4(240, 0, 0, 0, 4),
    IpRange::v6([0, 0, 0, 0, 0, 0, 0, 0], 128),
    IpRange::v6([0, 0, 0, 0, 0, 0, 0, 1], 128),
    // unique local
    IpRange::v6([0xfc00, 0, 0, 0, 0, 0, 0, 0], 7),
    IpRange::v6([0xfe80, 0, 0, 0, 0, 0, 0, 0], 10),
];

/// Returns the IPv4 address carried by a translated IPv6 form.
///
/// Covers NAT64 (`64:ff9b::/96`), 6to4 (`2002::/16`) and the deprecated
/// IPv4-compatible form (`::a.b.c.d`). Mapped addresses are handled by
/// [`IpAddr::to_canonical`].
// Truncating casts keep exactly the 32 bits wanted
#[allow(clippy::cast_possible_truncation)]
fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let bits = u128::from(ip);
    let low = Ipv4Addr::from(bits as u32);
    match ip.segments() {
        [0x0064, 0xff9b, 0, 0, 0, 0, _, _] => Some(low),
        [0x2002, ..] => Some(Ipv4Addr::from((bits >> 80) as u32)),
        // :: and ::1 stay in the IPv6 table
        [0, 0, 0, 0, 0, 0, _, _] if bits > 1 => Some(low),
        _ => None,
    }
}

/// Returns the blocked range containing `ip`, if any.
///
/// IPv6 forms that carry an IPv4 address (mapped, NAT64, 6to4 and
/// IPv4-compatible) are judged as that IPv4 address.
#[must_use]
pub fn blocked_range(ip: IpAddr) -> Option<&'static IpRange> {
    let ip = match ip.to_canonical() {
        IpAddr::V6(v6) => embedded_ipv4(v6).map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    };
    BLOCKED_RANGES.iter().find(|range| range.contains(ip))
}

/// Returns true if `ip` falls in any blocked range.
#[must_use]
pub fn is_blocked_addr(ip: IpAddr) -> bool {
    blocked_range(ip).is_some()
}

/// Returns true if the textual address is blocked.
///
/// Text that does not parse as an IP address is treated as blocked.
#[must_use]
pub fn is_blocked(ip: &str) -> bool {
    ip.trim().parse::<IpAddr>().map_or(true, is_blocked_addr)
}
