/*
 * Created on Fri Feb 09 2024
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

//! Computes the average byte footprint of one entry, and the worst-case
//! bytes lost to alignment padding between the entry's head (its length
//! prefixes, replication header and checksum) and the value payload.

use crate::layout::{ADDITIONAL_ENTRY_BYTES, CHECKSUM_STORED_BYTES};
use crate::numberkit::{align_up, gcd};
use crate::oracle::SizeMarshaller;

/// How big one side (key or value) of an entry is, resolved down to a
/// single average size plus whether that size is a hard constant.
#[derive(Debug, Clone, Copy)]
pub struct SizeResolution {
    pub average_size: f64,
    pub is_constant: bool,
}

impl SizeResolution {
    pub fn constant(size: u32) -> Self {
        Self {
            average_size: size as f64,
            is_constant: true,
        }
    }

    pub fn average(size: f64) -> Self {
        Self {
            average_size: size,
            is_constant: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EntrySizeEstimate {
    pub average_entry_size: f64,
    pub worst_alignment_padding: u32,
}

/// The maximum number of chunks an average (non-constant-sized) entry is
/// allowed to spread across before the default chunk-size search backs off
/// to a smaller chunk size. 8 without replication, 4 with -- replication
/// adds a fixed per-entry overhead so we budget fewer chunks to keep the
/// relative overhead comparable.
pub(crate) fn max_default_chunks_per_average_entry(replicated: bool) -> u32 {
    if replicated {
        4
    } else {
        8
    }
}

/// `storingLength` interpolated linearly between the floor and ceiling of a
/// (possibly fractional) average size. When the average is itself an
/// integer this collapses to a single call.
pub fn average_storing_length(marshaller: &dyn SizeMarshaller, average_size: f64) -> f64 {
    if average_size.fract() == 0.0 {
        marshaller.storing_length(average_size as u64) as f64
    } else {
        let lo = average_size.floor();
        let hi = average_size.ceil();
        let storing_lo = marshaller.storing_length(lo as u64) as f64;
        let storing_hi = marshaller.storing_length(hi as u64) as f64;
        let frac = average_size - lo;
        storing_lo + (storing_hi - storing_lo) * frac
    }
}

/// Worst-case padding between a head of `size_before_alignment` bytes and a
/// payload that must start on an `alignment`-byte boundary, given that the
/// head always lands on a multiple of `chunk_size` bytes away from the
/// segment's entry space origin.
///
/// `chunk_size` and `alignment` interact through their GCD: stepping the
/// head's start offset by one chunk moves the required padding by `gcd`
/// bytes (modulo `alignment`), so the observed padding cycles through a
/// residue class of stride `gcd` rather than taking on every value in
/// `[0, alignment)`.
pub fn worst_padding_given_chunk_size(
    size_before_alignment: u64,
    chunk_size: u32,
    alignment: u32,
) -> u32 {
    if alignment <= 1 {
        return 0;
    }
    let g = gcd(alignment as u64, chunk_size as u64) as u32;
    let first = (align_up(size_before_alignment, alignment as u64) - size_before_alignment) as u32;
    if g == alignment {
        return first;
    }
    let mut padding = first;
    loop {
        let next = padding + g;
        if next >= alignment {
            break;
        }
        padding = next;
    }
    padding
}

pub struct EntrySizerInput<'a> {
    pub key: SizeResolution,
    pub value: SizeResolution,
    pub key_length_marshaller: &'a dyn SizeMarshaller,
    pub value_length_marshaller: &'a dyn SizeMarshaller,
    pub replicated: bool,
    pub checksums: bool,
    pub value_alignment: u32,
    pub actual_chunk_size: Option<u32>,
}

pub struct EntrySizer;

impl EntrySizer {
    pub fn estimate(input: &EntrySizerInput<'_>) -> EntrySizeEstimate {
        // A constant-sized side needs no length prefix at all -- its size is
        // already fixed by configuration, so there is nothing for a prefix
        // to communicate that the layout doesn't already encode.
        let key_length_prefix = if input.key.is_constant {
            0.0
        } else {
            average_storing_length(input.key_length_marshaller, input.key.average_size)
        };
        let value_length_prefix = if input.value.is_constant {
            0.0
        } else {
            average_storing_length(input.value_length_marshaller, input.value.average_size)
        };

        let replication_bytes = if input.replicated {
            ADDITIONAL_ENTRY_BYTES as f64
        } else {
            0.0
        };
        let checksum_bytes = if input.checksums {
            CHECKSUM_STORED_BYTES as f64
        } else {
            0.0
        };

        // Everything up to (but not including) the value payload.
        let head_size = key_length_prefix
            + input.key.average_size
            + replication_bytes
            + checksum_bytes
            + value_length_prefix;

        let worst_alignment_padding = Self::worst_alignment(input, head_size);

        let average_entry_size = head_size + worst_alignment_padding as f64 + input.value.average_size;

        EntrySizeEstimate {
            average_entry_size,
            worst_alignment_padding,
        }
    }

    fn worst_alignment(input: &EntrySizerInput<'_>, head_size: f64) -> u32 {
        if input.value_alignment <= 1 {
            return 0;
        }

        // The value's length contribution is "constant-sized" either
        // because the value itself never varies (so there's no prefix at
        // all, see `estimate` above) or because the marshaller always
        // spends the same number of bytes on a prefix regardless of `n`.
        let value_length_prefix_constant =
            input.value.is_constant || input.value_length_marshaller.is_constant_width();

        if input.key.is_constant && value_length_prefix_constant {
            if input.value.is_constant {
                let size = head_size.round() as u64;
                return (align_up(size, input.value_alignment as u64) - size) as u32;
            }
            if let Some(chunk_size) = input.actual_chunk_size {
                return worst_padding_given_chunk_size(
                    head_size.round() as u64,
                    chunk_size,
                    input.value_alignment,
                );
            }
            let cap = max_default_chunks_per_average_entry(input.replicated);
            let mut chosen = 4u32;
            for candidate in [8u32, 4u32] {
                let per_entry_chunks = (head_size / candidate as f64).ceil();
                if per_entry_chunks <= cap as f64 {
                    chosen = candidate;
                    break;
                }
            }
            return worst_padding_given_chunk_size(
                head_size.round() as u64,
                chosen,
                input.value_alignment,
            );
        }

        // Either the key or the value length prefix varies: no periodic
        // structure to exploit, so assume the worst.
        input.value_alignment - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{FixedWidthSizeMarshaller, VarIntSizeMarshaller};

    #[test]
    fn both_constant_sizes_give_exact_padding() {
        let key_m = FixedWidthSizeMarshaller::new(1);
        let value_m = FixedWidthSizeMarshaller::new(1);
        let input = EntrySizerInput {
            key: SizeResolution::constant(4),
            value: SizeResolution::constant(4),
            key_length_marshaller: &key_m,
            value_length_marshaller: &value_m,
            replicated: false,
            checksums: false,
            value_alignment: 4,
            actual_chunk_size: None,
        };
        let estimate = EntrySizer::estimate(&input);
        assert_eq!(estimate.worst_alignment_padding, 0);
    }

    #[test]
    fn alignment_of_one_has_no_padding() {
        let key_m = VarIntSizeMarshaller;
        let value_m = VarIntSizeMarshaller;
        let input = EntrySizerInput {
            key: SizeResolution::average(10.0),
            value: SizeResolution::average(10.0),
            key_length_marshaller: &key_m,
            value_length_marshaller: &value_m,
            replicated: false,
            checksums: false,
            value_alignment: 1,
            actual_chunk_size: None,
        };
        let estimate = EntrySizer::estimate(&input);
        assert_eq!(estimate.worst_alignment_padding, 0);
    }

    #[test]
    fn variable_length_prefix_assumes_worst_case() {
        let key_m = VarIntSizeMarshaller;
        let value_m = VarIntSizeMarshaller;
        let input = EntrySizerInput {
            key: SizeResolution::average(10.0),
            value: SizeResolution::average(1_000_000.0),
            key_length_marshaller: &key_m,
            value_length_marshaller: &value_m,
            replicated: false,
            checksums: false,
            value_alignment: 8,
            actual_chunk_size: None,
        };
        let estimate = EntrySizer::estimate(&input);
        assert_eq!(estimate.worst_alignment_padding, 7);
    }

    #[test]
    fn padding_is_always_less_than_alignment() {
        for alignment in [2u32, 4, 8, 16, 32] {
            for chunk_size in [1u32, 2, 3, 4, 5, 7, 8, 16, 32, 64] {
                for size in 0u64..64 {
                    let padding = worst_padding_given_chunk_size(size, chunk_size, alignment);
                    assert!(padding < alignment, "padding {padding} >= alignment {alignment}");
                }
            }
        }
    }
}
