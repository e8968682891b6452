/*
 * Created on Tue Feb 13 2024
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

//! The frozen output of the planner: one immutable [`Layout`] record,
//! assembled from every other component's output, plus the handful of
//! remaining decisions (header size, tier budget, checksum resolution)
//! that don't belong to any single earlier stage.

use crate::error::{LayoutError, Result};
use crate::numberkit::is_power_of_two;
use serde::{Deserialize, Serialize};

/// Upper bound on chunks addressable within one segment.
pub const MAX_SEGMENT_CHUNKS: u64 = 1 << 32;
/// Upper bound on entries addressable within one segment.
pub const MAX_SEGMENT_ENTRIES: u64 = 1 << 32;
/// Upper bound on the number of segments a map can be split into.
pub const MAX_SEGMENTS: u64 = 1 << 30;
/// Bytes added to every entry when replication is enabled: a timestamp and
/// a replica identifier.
pub const ADDITIONAL_ENTRY_BYTES: u32 = 12;
/// Bytes added to every entry when per-entry checksums are enabled.
pub const CHECKSUM_STORED_BYTES: u32 = 4;

/// Default OS page size assumed when the platform's actual page size can't
/// be read. 4096 is correct for the overwhelming majority of deployment
/// targets; see [`os_page_size`].
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// Reads the OS page size, falling back to [`DEFAULT_PAGE_SIZE`] on
/// platforms where the syscall isn't available or fails. Only consulted by
/// the page-efficiency guard in segment search and by segment-header
/// sizing -- nothing in this crate maps memory itself.
#[cfg(unix)]
pub fn os_page_size() -> u32 {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size > 0 {
        page_size as u32
    } else {
        DEFAULT_PAGE_SIZE
    }
}

#[cfg(not(unix))]
pub fn os_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumPolicy {
    Yes,
    No,
    IfPersisted,
}

impl Default for ChecksumPolicy {
    fn default() -> Self {
        ChecksumPolicy::IfPersisted
    }
}

impl ChecksumPolicy {
    pub fn resolve(self, will_be_persisted: bool) -> bool {
        match self {
            ChecksumPolicy::Yes => true,
            ChecksumPolicy::No => false,
            ChecksumPolicy::IfPersisted => will_be_persisted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The physical shape of a segmented, memory-mappable hash map, as
/// computed by [`crate::ConfigBuilder::emit`]. Immutable, cheaply
/// `Clone`-able, and safe to hand to any thread.
pub struct Layout {
    pub segments: u64,
    pub entries_per_segment: u64,
    pub chunk_size: u32,
    pub chunks_per_segment: u64,
    pub hash_lookup_value_bits: u32,
    pub hash_lookup_key_bits: u32,
    pub hash_lookup_slot_bytes: u32,
    pub segment_header_bytes: u32,
    pub value_alignment: u32,
    pub worst_alignment_padding: u32,
    pub segment_inner_offset: u32,
    pub max_chunks_per_entry: u32,
    pub max_extra_tiers: u64,
    pub checksums: bool,
    pub replicated: bool,
}

pub struct LayoutAssemblerInput {
    pub segments: u64,
    pub entries_per_segment: u64,
    pub chunk_size: u32,
    pub chunks_per_segment: u64,
    pub hash_lookup_value_bits: u32,
    pub hash_lookup_key_bits: u32,
    pub hash_lookup_slot_bytes: u32,
    pub value_alignment: u32,
    pub worst_alignment_padding: u32,
    pub segment_inner_offset: u32,
    pub entries_are_constant_sized: bool,
    pub user_max_chunks_per_entry: Option<u32>,
    pub allow_segment_tiering: bool,
    pub max_bloat_factor: f64,
    pub checksums: ChecksumPolicy,
    pub will_be_persisted: bool,
    pub replicated: bool,
    pub aligned_64_bit_memory_operations_atomic: bool,
}

pub struct LayoutAssembler;

impl LayoutAssembler {
    pub fn assemble(input: LayoutAssemblerInput) -> Result<Layout> {
        let max_chunks_per_entry = Self::max_chunks_per_entry(&input);
        let max_extra_tiers = Self::max_extra_tiers(&input);
        let segment_header_bytes = Self::segment_header_bytes(input.segments);
        let checksums = input.checksums.resolve(input.will_be_persisted);

        let layout = Layout {
            segments: input.segments,
            entries_per_segment: input.entries_per_segment,
            chunk_size: input.chunk_size,
            chunks_per_segment: input.chunks_per_segment,
            hash_lookup_value_bits: input.hash_lookup_value_bits,
            hash_lookup_key_bits: input.hash_lookup_key_bits,
            hash_lookup_slot_bytes: input.hash_lookup_slot_bytes,
            segment_header_bytes,
            value_alignment: input.value_alignment,
            worst_alignment_padding: input.worst_alignment_padding,
            segment_inner_offset: input.segment_inner_offset,
            max_chunks_per_entry,
            max_extra_tiers,
            checksums,
            replicated: input.replicated,
        };

        Self::check_invariants(&layout)?;
        log::info!(
            "planned layout: {} segments x {} entries/segment, {} byte chunks, \
             {} byte slots, {} byte headers",
            layout.segments,
            layout.entries_per_segment,
            layout.chunk_size,
            layout.hash_lookup_slot_bytes,
            layout.segment_header_bytes,
        );
        Ok(layout)
    }

    fn max_chunks_per_entry(input: &LayoutAssemblerInput) -> u32 {
        if input.entries_are_constant_sized {
            return 1;
        }
        let mut cap = input.chunks_per_segment.min((i32::MAX - 1) as u64) as u32;
        if let Some(user_cap) = input.user_max_chunks_per_entry {
            cap = cap.min(user_cap);
        }
        cap
    }

    fn max_extra_tiers(input: &LayoutAssemblerInput) -> u64 {
        if !input.allow_segment_tiering {
            return 0;
        }
        let bloat_headroom = ((input.max_bloat_factor - 1.0) * input.segments as f64).floor();
        bloat_headroom.max(0.0) as u64 + input.segments
    }

    /// Larger headers reduce false sharing between adjacent segments' lock
    /// and bookkeeping state when there are few enough segments that the
    /// extra bytes don't matter; at high segment counts the per-segment
    /// overhead dominates and headers shrink back down.
    fn segment_header_bytes(segments: u64) -> u32 {
        const PAGE: u64 = DEFAULT_PAGE_SIZE as u64;
        if segments * 192 < 2 * PAGE {
            192
        } else if segments * 128 < 3 * PAGE {
            128
        } else if segments <= 16384 {
            64
        } else {
            32
        }
    }

    fn check_invariants(layout: &Layout) -> Result<()> {
        if !is_power_of_two(layout.segments) || layout.segments == 0 || layout.segments > MAX_SEGMENTS
        {
            return Err(LayoutError::InvalidConfig {
                field: "segments",
                reason: "must be a power of two in [1, 2^30]",
            });
        }
        if crate::numberkit::checked_mul_fits_i64(layout.chunks_per_segment, layout.segments)
            .is_none()
        {
            return Err(LayoutError::TooManyChunks {
                computed: layout.chunks_per_segment as u128 * layout.segments as u128,
                limit: MAX_SEGMENT_CHUNKS,
            });
        }
        if layout.entries_per_segment > layout.chunks_per_segment {
            return Err(LayoutError::ConflictingConfig {
                reason: "entriesPerSegment exceeds chunksPerSegment",
            });
        }
        if (layout.hash_lookup_value_bits as u64 + layout.hash_lookup_key_bits as u64)
            > 8 * layout.hash_lookup_slot_bytes as u64
        {
            return Err(LayoutError::InvalidConfig {
                field: "hash_lookup_slot_bytes",
                reason: "too narrow to hold valueBits + keyBits",
            });
        }
        if layout.hash_lookup_slot_bytes != 4 && layout.hash_lookup_slot_bytes != 8 {
            return Err(LayoutError::InvalidConfig {
                field: "hash_lookup_slot_bytes",
                reason: "must be 4 or 8",
            });
        }
        if layout.max_chunks_per_entry as u64 > layout.chunks_per_segment {
            return Err(LayoutError::ConflictingConfig {
                reason: "maxChunksPerEntry exceeds chunksPerSegment",
            });
        }
        if layout.value_alignment > 1 && layout.worst_alignment_padding >= layout.value_alignment {
            return Err(LayoutError::InvalidConfig {
                field: "worst_alignment_padding",
                reason: "must be smaller than valueAlignment",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> LayoutAssemblerInput {
        LayoutAssemblerInput {
            segments: 128,
            entries_per_segment: 8192,
            chunk_size: 8,
            chunks_per_segment: 8192,
            hash_lookup_value_bits: 13,
            hash_lookup_key_bits: 16,
            hash_lookup_slot_bytes: 4,
            value_alignment: 1,
            worst_alignment_padding: 0,
            segment_inner_offset: 0,
            entries_are_constant_sized: false,
            user_max_chunks_per_entry: None,
            allow_segment_tiering: true,
            max_bloat_factor: 1.0,
            checksums: ChecksumPolicy::No,
            will_be_persisted: false,
            replicated: false,
            aligned_64_bit_memory_operations_atomic: true,
        }
    }

    #[test]
    fn assembles_a_valid_layout() {
        let layout = LayoutAssembler::assemble(valid_input()).unwrap();
        assert_eq!(layout.segments, 128);
        assert!(layout.max_extra_tiers >= layout.segments);
    }

    #[test]
    fn tiering_disabled_means_zero_extra_tiers() {
        let mut input = valid_input();
        input.allow_segment_tiering = false;
        let layout = LayoutAssembler::assemble(input).unwrap();
        assert_eq!(layout.max_extra_tiers, 0);
    }

    #[test]
    fn non_power_of_two_segments_is_rejected() {
        let mut input = valid_input();
        input.segments = 100;
        assert!(LayoutAssembler::assemble(input).is_err());
    }

    #[test]
    fn small_segment_counts_get_large_headers() {
        assert_eq!(LayoutAssembler::segment_header_bytes(1), 192);
        assert_eq!(LayoutAssembler::segment_header_bytes(16384), 64);
        assert_eq!(LayoutAssembler::segment_header_bytes(1 << 20), 32);
    }

    #[test]
    fn checksum_policy_resolution() {
        assert!(ChecksumPolicy::Yes.resolve(false));
        assert!(!ChecksumPolicy::No.resolve(true));
        assert!(ChecksumPolicy::IfPersisted.resolve(true));
        assert!(!ChecksumPolicy::IfPersisted.resolve(false));
    }
}
