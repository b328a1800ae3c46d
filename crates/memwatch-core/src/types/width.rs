//! Access width type.

use std::fmt;
use std::str::FromStr;

use crate::error::WatchError;

/// Size of a single memory access
///
/// The width is fixed for a whole invocation. It decides which dereference
/// instruction is issued (a device register must be read with its own width,
/// or the bus may return garbage or fault), how values are formatted and how
/// many values fit on one dump row.
///
/// The letters follow the classic monitor convention:
///
/// | Letter | Width   | Bytes |
/// |--------|---------|-------|
/// | `B`    | byte    | 1     |
/// | `W`    | word    | 2     |
/// | `L`    | long    | 4     |
/// | `Q`    | quad    | 8     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessWidth
{
    /// 8-bit access
    Byte,
    /// 16-bit access
    Word,
    /// 32-bit access
    Long,
    /// 64-bit access
    Quad,
}

impl AccessWidth
{
    /// All widths, narrowest first.
    pub const ALL: [AccessWidth; 4] = [AccessWidth::Byte, AccessWidth::Word, AccessWidth::Long, AccessWidth::Quad];

    /// Number of bytes moved by one access.
    pub const fn bytes(self) -> usize
    {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Word => 2,
            AccessWidth::Long => 4,
            AccessWidth::Quad => 8,
        }
    }

    /// Hex digits needed to print a full value of this width.
    pub const fn hex_digits(self) -> usize
    {
        self.bytes() * 2
    }

    /// Values printed per row in dumps (16 for bytes and words, 8 longs, 4 quads).
    pub const fn per_row(self) -> usize
    {
        match self {
            AccessWidth::Byte | AccessWidth::Word => 16,
            AccessWidth::Long => 8,
            AccessWidth::Quad => 4,
        }
    }

    /// Mask with every bit of this width set.
    pub const fn value_mask(self) -> u64
    {
        match self {
            AccessWidth::Quad => u64::MAX,
            _ => (1u64 << (self.bytes() * 8)) - 1,
        }
    }

    /// Drop any bits above this width.
    pub const fn truncate(self, value: u64) -> u64
    {
        value & self.value_mask()
    }

    /// Parse the single width letter (`b`, `w`, `l`, `q`, any case).
    pub fn from_letter(letter: char) -> Option<Self>
    {
        match letter.to_ascii_lowercase() {
            'b' => Some(AccessWidth::Byte),
            'w' => Some(AccessWidth::Word),
            'l' => Some(AccessWidth::Long),
            'q' => Some(AccessWidth::Quad),
            _ => None,
        }
    }
}

impl fmt::Display for AccessWidth
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let letter = match self {
            AccessWidth::Byte => 'B',
            AccessWidth::Word => 'W',
            AccessWidth::Long => 'L',
            AccessWidth::Quad => 'Q',
        };
        write!(f, "{letter}")
    }
}

impl FromStr for AccessWidth
{
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let mut chars = s.chars();
        match (chars.next().and_then(AccessWidth::from_letter), chars.next()) {
            (Some(width), None) => Ok(width),
            _ => Err(WatchError::InvalidArgument(format!("bad size '{s}'"))),
        }
    }
}
