//! IPv4 CIDR parsing and subnet carving.

use std::fmt;
use std::net::Ipv4Addr;

use edgestack_common::error::{EdgestackError, Result};

/// Smallest subnet AWS accepts.
pub const MAX_SUBNET_PREFIX: u8 = 28;

/// Largest VPC AWS accepts.
pub const MIN_VPC_PREFIX: u8 = 16;

/// An IPv4 network block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Parses `a.b.c.d/n`, requiring the address to be the network address.
    ///
    /// # Errors
    ///
    /// Returns an error if the notation is malformed or host bits are set.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || EdgestackError::config(format!("invalid CIDR block: \"{value}\""));
        let (addr, prefix) = value.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        let network = u32::from(addr);
        if network & !mask(prefix) != 0 {
            return Err(invalid());
        }
        Ok(Self { network, prefix })
    }

    /// Prefix length.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block.
    #[must_use]
    pub const fn size(&self) -> u64 {
        1u64 << (32 - self.prefix)
    }

    /// Splits the block into consecutive subnets.
    ///
    /// Each request is either a fixed prefix length or `None`. Requests
    /// without a prefix share the space left over by the fixed ones equally,
    /// rounded down to a power of two. Subnets are laid out in request order,
    /// each aligned to its own size.
    ///
    /// # Errors
    ///
    /// Returns an error if the requests do not fit, or if any subnet would be
    /// larger than the block or smaller than a `/28`.
    pub fn carve(&self, requests: &[Option<u8>]) -> Result<Vec<Self>> {
        let fixed: u64 = requests.iter().flatten().map(|p| block_size(*p)).sum();
        let auto_count = requests.iter().filter(|r| r.is_none()).count() as u64;
        let auto_prefix = if auto_count == 0 {
            None
        } else {
            let remaining = self.size().saturating_sub(fixed);
            let each = remaining / auto_count;
            if each == 0 {
                return Err(self.exhausted());
            }
            let bits = 63 - each.leading_zeros();
            Some(u8::try_from(32 - bits.min(32)).map_err(|_| self.exhausted())?)
        };

        let start = u64::from(self.network);
        let end = start + self.size();
        let mut cursor = start;
        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            let prefix = request.or(auto_prefix).ok_or_else(|| self.exhausted())?;
            if prefix < self.prefix || prefix > MAX_SUBNET_PREFIX {
                return Err(EdgestackError::config(format!(
                    "subnet prefix /{prefix} does not fit in {self} (allowed /{}../{MAX_SUBNET_PREFIX})",
                    self.prefix
                )));
            }
            let size = block_size(prefix);
            let aligned = cursor.div_ceil(size) * size;
            if aligned + size > end {
                return Err(self.exhausted());
            }
            let network = u32::try_from(aligned).map_err(|_| self.exhausted())?;
            out.push(Self { network, prefix });
            cursor = aligned + size;
        }
        Ok(out)
    }

    fn exhausted(&self) -> EdgestackError {
        EdgestackError::config(format!("not enough address space in {self} for the requested subnets"))
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.prefix)
    }
}

const fn mask(prefix: u8) -> u32 {
    if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) }
}

const fn block_size(prefix: u8) -> u64 {
    1u64 << 32u8.saturating_sub(prefix)
}
