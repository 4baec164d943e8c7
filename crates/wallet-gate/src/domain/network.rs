//! IP address classification shared by proxy trust and URL screening.
//!
//! [`is_private_ip`] is the narrow set of internal networks a reverse proxy
//! may live on. [`is_blocked_ip`] widens it to everything a server must never
//! be pointed at, including IPv4 addresses embedded in IPv6 transition forms.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Loopback, RFC 1918, link-local and IPv6 unique-local addresses.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(&v4),
            None => v6.is_loopback() || is_unique_local(v6) || is_link_local_v6(v6),
        },
    }
}

/// `true` for addresses a server must never be pointed at.
pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private() || ip.is_link_local() || ip.is_loopback()
}

fn is_blocked_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    is_private_v4(ip)
        || ip.is_unspecified()
        || ip.is_multicast()
        // 0.0.0.0/8 this network
        || a == 0
        // 240.0.0.0/4 reserved, including broadcast
        || a >= 240
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_blocked_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = embedded_v4(ip) {
        return is_blocked_v4(&v4);
    }
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || is_unique_local(ip)
        || is_link_local_v6(ip)
}

/// IPv4 address carried by a mapped, compatible, NAT64 or 6to4 address.
fn embedded_v4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }
    let join = |hi: u16, lo: u16| {
        let [a, b] = hi.to_be_bytes();
        let [c, d] = lo.to_be_bytes();
        Ipv4Addr::new(a, b, c, d)
    };
    match ip.segments() {
        // ::/96 IPv4-compatible (also covers :: and ::1)
        [0, 0, 0, 0, 0, 0, hi, lo] => Some(join(hi, lo)),
        // 64:ff9b::/96 NAT64
        [0x64, 0xff9b, 0, 0, 0, 0, hi, lo] => Some(join(hi, lo)),
        // 2002::/16 6to4
        [0x2002, hi, lo, ..] => Some(join(hi, lo)),
        _ => None,
    }
}

/// fc00::/7
fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

/// fe80::/10
fn is_link_local_v6(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}
