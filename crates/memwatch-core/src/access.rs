//! Width-generic raw accessors.
//!
//! One volatile load/store per call, typed by the register width. Callers
//! dispatch on [`AccessWidth`] once with [`with_width!`](crate::with_width)
//! and run a loop monomorphised for that width, so the hot path carries no
//! per-sample branch on the width.
//!
//! A misaligned pointer is read or written as one volatile access to the
//! word's byte array, which has no alignment requirement. The hardware then
//! decides: it may split the access, or raise SIGBUS.

use std::ptr::NonNull;

use crate::types::AccessWidth;

mod sealed
{
    pub trait Sealed {}
}

/// An unsigned integer that can be moved in a single bus access.
pub trait Word: Copy + sealed::Sealed
{
    /// Width tag for this type
    const WIDTH: AccessWidth;

    /// Native-endian byte representation
    type Bytes: Copy;

    /// Zero-extend to 64 bits.
    fn widen(self) -> u64;

    /// Truncate from 64 bits.
    fn narrow(value: u64) -> Self;

    fn from_bytes(bytes: Self::Bytes) -> Self;

    fn into_bytes(self) -> Self::Bytes;
}

macro_rules! impl_word {
    ($($ty:ty => $width:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Word for $ty
            {
                const WIDTH: AccessWidth = AccessWidth::$width;

                type Bytes = [u8; std::mem::size_of::<$ty>()];

                #[inline(always)]
                fn widen(self) -> u64
                {
                    u64::from(self)
                }

                #[inline(always)]
                #[allow(clippy::cast_possible_truncation)]
                fn narrow(value: u64) -> Self
                {
                    value as $ty
                }

                #[inline(always)]
                fn from_bytes(bytes: Self::Bytes) -> Self
                {
                    <$ty>::from_ne_bytes(bytes)
                }

                #[inline(always)]
                fn into_bytes(self) -> Self::Bytes
                {
                    self.to_ne_bytes()
                }
            }
        )*
    };
}

impl_word!(u8 => Byte, u16 => Word, u32 => Long, u64 => Quad);

/// Volatile load of one `W` at `ptr`, zero-extended.
///
/// # Safety
///
/// `ptr` must point at `size_of::<W>()` bytes of a live mapping. The access
/// may still fault (that is what [`crate::fault::guarded`] is for).
#[inline(always)]
pub unsafe fn load<W: Word>(ptr: NonNull<u8>) -> u64
{
    let word = ptr.cast::<W>();
    if word.is_aligned() {
        std::ptr::read_volatile(word.as_ptr()).widen()
    } else {
        W::from_bytes(std::ptr::read_volatile(ptr.cast::<W::Bytes>().as_ptr())).widen()
    }
}

/// Volatile store of the low bits of `value` as one `W` at `ptr`.
///
/// # Safety
///
/// Same contract as [`load`], and the mapping must be writable.
#[inline(always)]
pub unsafe fn store<W: Word>(ptr: NonNull<u8>, value: u64)
{
    let word = ptr.cast::<W>();
    if word.is_aligned() {
        std::ptr::write_volatile(word.as_ptr(), W::narrow(value));
    } else {
        std::ptr::write_volatile(ptr.cast::<W::Bytes>().as_ptr(), W::narrow(value).into_bytes());
    }
}

/// Bind a type alias to the [`Word`] type of an [`AccessWidth`] and evaluate
/// `$body` with it.
///
/// ```rust
/// use memwatch_core::types::AccessWidth;
/// use memwatch_core::with_width;
///
/// let bits = with_width!(AccessWidth::Long, W => 8 * std::mem::size_of::<W>());
/// assert_eq!(bits, 32);
/// ```
#[macro_export]
macro_rules! with_width {
    ($width:expr, $alias:ident => $body:expr) => {
        match $width {
            $crate::types::AccessWidth::Byte => {
                type $alias = u8;
                $body
            }
            $crate::types::AccessWidth::Word => {
                type $alias = u16;
                $body
            }
            $crate::types::AccessWidth::Long => {
                type $alias = u32;
                $body
            }
            $crate::types::AccessWidth::Quad => {
                type $alias = u64;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_word_widths_match_types()
    {
        for width in AccessWidth::ALL {
            let size = with_width!(width, W => {
                assert_eq!(W::WIDTH, width);
                std::mem::size_of::<W>()
            });
            assert_eq!(size, width.bytes());
        }
    }

    #[test]
    fn test_load_store_in_local_buffer()
    {
        let mut backing = [0u64; 2];
        let ptr = NonNull::from(&mut backing).cast::<u8>();
        unsafe {
            store::<u32>(ptr, 0x1_dead_beef);
            assert_eq!(load::<u32>(ptr), 0xdead_beef);
            store::<u8>(ptr, 0x42);
            assert_eq!(load::<u8>(ptr), 0x42);
        }
    }

    #[test]
    fn test_misaligned_load_store()
    {
        let mut backing = [0u64; 2];
        let base = NonNull::from(&mut backing).cast::<u8>();
        let ptr = unsafe { base.add(3) };
        unsafe {
            store::<u32>(ptr, 0xdead_beef);
            assert_eq!(load::<u32>(ptr), 0xdead_beef);
            store::<u64>(ptr, 0x0102_0304_0506_0708);
            assert_eq!(load::<u64>(ptr), 0x0102_0304_0506_0708);
        }
        let bytes: Vec<u8> = backing.iter().flat_map(|word| word.to_ne_bytes()).collect();
        assert_eq!(&bytes[3..11], &0x0102_0304_0506_0708_u64.to_ne_bytes());
        assert_eq!(bytes[..3], [0, 0, 0]);
    }
}
