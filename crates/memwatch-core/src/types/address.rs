//! Physical address type.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::WatchError;

/// Strongly typed physical (or kernel-virtual) address
///
/// This wrapper around `u64` keeps device addresses apart from process-local
/// pointers, sizes and sample values, which are all `u64`/`usize` too.
///
/// ## Parsing
///
/// Addresses are written in hex, optionally as a chain of `+`/`-` terms so a
/// register can be named relative to its block base:
///
/// ```rust
/// use memwatch_core::types::Address;
///
/// let addr: Address = "fe200000+34".parse()?;
/// assert_eq!(addr.value(), 0xfe20_0034);
///
/// let addr: Address = "0x1000+20-4".parse()?;
/// assert_eq!(addr.value(), 0x101c);
/// # Ok::<(), memwatch_core::WatchError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value, usable in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use memwatch_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Round down to a multiple of `page_size` (a power of two).
    pub const fn page_base(self, page_size: usize) -> Self
    {
        Address(self.0 & !(page_size as u64 - 1))
    }

    /// Offset of this address within its page.
    pub const fn page_offset(self, page_size: usize) -> usize
    {
        (self.0 & (page_size as u64 - 1)) as usize
    }

    /// Whether the address is a multiple of `align` (a power of two).
    pub const fn is_aligned(self, align: usize) -> bool
    {
        self.0 & (align as u64 - 1) == 0
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:X}", self.0)
    }
}

impl fmt::UpperHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

impl FromStr for Address
{
    type Err = WatchError;

    /// Parse `term ((+|-) term)*`, each term hex with an optional `0x` prefix.
    ///
    /// Arithmetic wraps, matching what the hardware address bus would see.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let bad = || WatchError::InvalidArgument(format!("bad address '{s}'"));

        let mut total = 0u64;
        let mut sign = '+';
        let mut rest = s.trim();
        loop {
            let end = rest.find(['+', '-']).unwrap_or(rest.len());
            let term = parse_hex(&rest[..end]).ok_or_else(bad)?;
            total = if sign == '-' {
                total.wrapping_sub(term)
            } else {
                total.wrapping_add(term)
            };
            if end == rest.len() {
                return Ok(Address(total));
            }
            sign = rest[end..].chars().next().ok_or_else(bad)?;
            rest = &rest[end + 1..];
        }
    }
}

/// Parse a hex number with an optional `0x`/`0X` prefix.
///
/// Used for addresses, masks and poke values alike.
pub fn parse_hex(s: &str) -> Option<u64>
{
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
