/*
 * Created on Tue Feb 06 2024
 *
 * This file is a part of segmap-layout
 * segmap-layout is a free and open-source sizing and layout-planning
 * engine for a segmented, memory-mappable concurrent hash map, written
 * by Sayan Nandan ("the Author") with the vision to provide predictable
 * capacity planning without compromising on performance or concurrency.
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! Small numeric helpers shared by the rest of the planner. Nothing here
//! knows anything about segments, chunks or entries -- it's the load-bearing
//! arithmetic underneath those concepts.

/// Returns `true` iff `n` is a power of two. Zero is not a power of two.
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Smallest power of two that is `>= max(n, min)`.
///
/// Saturates at `1 << 63` rather than overflowing; callers that need a
/// tighter ceiling (e.g. `MAX_SEGMENTS`) must check the result themselves.
pub const fn next_power_of_two(n: u64, min: u64) -> u64 {
    let base = if n > min { n } else { min };
    let base = if base == 0 { 1 } else { base };
    if is_power_of_two(base) {
        base
    } else {
        let shift = 64 - (base - 1).leading_zeros();
        if shift >= 63 {
            1 << 63
        } else {
            1 << shift
        }
    }
}

/// Euclidean GCD. `gcd(0, x) == x`.
pub const fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Rounds `x` up to the next multiple of `a`, where `a` must be a power of two.
pub const fn align_up(x: u64, a: u64) -> u64 {
    debug_assert!(is_power_of_two(a), "alignment must be a power of two");
    (x + a - 1) & !(a - 1)
}

/// Checked multiplication that also asserts the product fits a signed 64-bit
/// integer, matching invariant 2 in the layout record ("chunksPerSegment *
/// segments fits in a signed 64-bit integer").
pub fn checked_mul_fits_i64(a: u64, b: u64) -> Option<u64> {
    let product = a.checked_mul(b)?;
    if product <= i64::MAX as u64 {
        Some(product)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_basic() {
        assert!(!is_power_of_two(0));
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(!is_power_of_two(3));
        assert!(is_power_of_two(1024));
        assert!(!is_power_of_two(1023));
    }

    #[test]
    fn next_power_of_two_basic() {
        assert_eq!(next_power_of_two(0, 1), 1);
        assert_eq!(next_power_of_two(1, 1), 1);
        assert_eq!(next_power_of_two(5, 1), 8);
        assert_eq!(next_power_of_two(8, 1), 8);
        assert_eq!(next_power_of_two(9, 1), 16);
        assert_eq!(next_power_of_two(1, 100), 128);
    }

    #[test]
    fn gcd_basic() {
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(17, 5), 1);
    }

    #[test]
    fn align_up_basic() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(5, 4), 8);
    }

    #[test]
    fn checked_mul_detects_overflow_past_i64() {
        assert_eq!(checked_mul_fits_i64(2, 3), Some(6));
        assert_eq!(checked_mul_fits_i64(u64::MAX, 2), None);
        assert_eq!(checked_mul_fits_i64(i64::MAX as u64, 2), None);
    }
}
