//! CIDR blocks and address parsing.
//!
//! Blocks are stored with their network address already masked, so a
//! membership test is a shift or mask plus one comparison.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A prefix block for one address family.
pub trait CidrBlock: Copy {
    /// Integer form of an address in this family.
    type Addr: Copy;

    fn contains(&self, addr: Self::Addr) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Block {
    network: u32,
    prefix_len: u8,
}

impl Ipv4Block {
    pub const MAX_PREFIX: u8 = 32;

    /// Build a block, masking off host bits. `None` if the prefix is too long.
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > Self::MAX_PREFIX {
            return None;
        }
        Some(Self {
            network: u32::from(network) & Self::mask(prefix_len),
            prefix_len,
        })
    }

    /// Parse `a.b.c.d/len`. Malformed text yields `None`.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, len) = split_cidr(cidr)?;
        Self::new(addr.parse().ok()?, len)
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn mask(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_len))
        }
    }
}

impl CidrBlock for Ipv4Block {
    type Addr = u32;

    fn contains(&self, addr: u32) -> bool {
        addr & Self::mask(self.prefix_len) == self.network
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Block {
    network: u128,
    prefix_len: u8,
}

impl Ipv6Block {
    pub const MAX_PREFIX: u8 = 128;

    pub fn new(network: Ipv6Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > Self::MAX_PREFIX {
            return None;
        }
        let network = match prefix_len {
            0 => 0,
            len => {
                let shift = 128 - u32::from(len);
                (u128::from(network) >> shift) << shift
            }
        };
        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Parse `x:x::x/len`, including `::` shorthand.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, len) = split_cidr(cidr)?;
        Self::new(addr.parse().ok()?, len)
    }

    pub fn network(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.network)
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }
}

impl CidrBlock for Ipv6Block {
    type Addr = u128;

    fn contains(&self, addr: u128) -> bool {
        if self.prefix_len == 0 {
            return true;
        }
        let shift = 128 - u32::from(self.prefix_len);
        addr >> shift == self.network >> shift
    }
}

fn split_cidr(cidr: &str) -> Option<(&str, u8)> {
    let (addr, len) = cidr.trim().split_once('/')?;
    if addr.is_empty() || len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((addr, len.parse().ok()?))
}

/// Parse a candidate client address. The family is decided by syntax; a
/// malformed address (bad octet, wrong group count, repeated `::`) is `None`.
pub fn parse_address(candidate: &str) -> Option<IpAddr> {
    candidate.trim().parse().ok()
}
