//! Bit-field access on unsigned integers.

use num_traits::{PrimInt, Unsigned};
use std::ops::RangeInclusive;

/// Get/set access to an inclusive range of bits, `lo..=hi`.
///
/// Extracted fields are right-justified. Assigning a field clears it first and
/// masks the new value to the field width, so bits outside the range are never
/// disturbed.
pub trait BitField: Sized {
    fn bits(self, range: RangeInclusive<u32>) -> Self;
    fn set_bits(&mut self, range: RangeInclusive<u32>, value: Self);

    /// Builder-style variant of `set_bits`.
    fn with_bits(mut self, range: RangeInclusive<u32>, value: Self) -> Self {
        self.set_bits(range, value);
        self
    }
}

/// All-ones mask of `width` bits.
fn low_mask<T: PrimInt>(width: u32) -> T {
    let total = T::zero().count_zeros();
    if width >= total {
        !T::zero()
    } else {
        (T::one() << width as usize) - T::one()
    }
}

impl<T: PrimInt + Unsigned> BitField for T {
    fn bits(self, range: RangeInclusive<u32>) -> T {
        let (lo, hi) = (*range.start(), *range.end());
        debug_assert!(lo <= hi && hi < T::zero().count_zeros());
        (self >> lo as usize) & low_mask(hi - lo + 1)
    }

    fn set_bits(&mut self, range: RangeInclusive<u32>, value: T) {
        let (lo, hi) = (*range.start(), *range.end());
        debug_assert!(lo <= hi && hi < T::zero().count_zeros());
        let field: T = low_mask(hi - lo + 1);
        *self = (*self & !(field << lo as usize)) | ((value & field) << lo as usize);
    }
}

/// Interprets bit `bits - 1` of `pattern` as a sign bit and replicates it
/// upward. `bits` must be in `1..=32`.
pub fn sign_extend(pattern: u32, bits: u32) -> i32 {
    debug_assert!(bits >= 1 && bits <= 32);
    let shift = 32 - bits;
    ((pattern << shift) as i32) >> shift
}

/// Whether `value` is representable as a two's complement integer of `bits` bits.
pub fn fits_signed(value: i64, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    min <= value && value <= max
}

/// Whether `value` is representable as an unsigned integer of `bits` bits.
pub fn fits_unsigned(value: i64, bits: u32) -> bool {
    value >= 0 && value < (1i64 << bits)
}
