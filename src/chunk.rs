/*
 * Created on Sat Feb 10 2024
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

//! Picks the byte granule ("chunk") that entries are packed into, and how
//! many of them an average entry needs.

use crate::entry::max_default_chunks_per_average_entry;

/// Smallest chunk size this planner will ever choose on its own. Below this
/// the per-chunk bookkeeping overhead (one slot per chunk boundary) would
/// dwarf the savings from finer granularity.
const MIN_CHUNK_SIZE: u32 = 4;
/// Largest chunk size, matching the largest `chunkSize` the layout record
/// can express.
const MAX_CHUNK_SIZE: u32 = 1 << 30;

#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan {
    pub chunk_size: u32,
    pub average_chunks_per_entry: f64,
    pub segment_entry_space_inner_offset: u32,
}

pub struct ChunkPlannerInput {
    pub actual_chunk_size: Option<u32>,
    pub entries_constant_sized: bool,
    pub average_entry_size: f64,
    pub replicated: bool,
    pub value_alignment: u32,
    pub constant_value_size: Option<u32>,
}

pub struct ChunkPlanner;

impl ChunkPlanner {
    pub fn plan(input: &ChunkPlannerInput) -> ChunkPlan {
        let chunk_size = if let Some(sz) = input.actual_chunk_size {
            sz
        } else if input.entries_constant_sized {
            input.average_entry_size.round() as u32
        } else {
            Self::default_chunk_size(input.average_entry_size, input.replicated)
        };

        let average_chunks_per_entry = if input.entries_constant_sized {
            1.0
        } else {
            (input.average_entry_size / chunk_size as f64).ceil()
        };

        let segment_entry_space_inner_offset = if input.entries_constant_sized {
            input
                .constant_value_size
                .map(|v| v % input.value_alignment.max(1))
                .unwrap_or(0)
        } else {
            0
        };

        ChunkPlan {
            chunk_size,
            average_chunks_per_entry,
            segment_entry_space_inner_offset,
        }
    }

    /// Smallest power-of-two chunk size in `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`
    /// such that an average entry fits within
    /// `maxDefaultChunksPerAverageEntry` chunks.
    fn default_chunk_size(average_entry_size: f64, replicated: bool) -> u32 {
        let cap = max_default_chunks_per_average_entry(replicated) as f64;
        let mut chunk_size = MIN_CHUNK_SIZE;
        while (chunk_size as f64 * cap) <= average_entry_size && chunk_size < MAX_CHUNK_SIZE {
            chunk_size *= 2;
        }
        chunk_size.min(MAX_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_entries_get_exactly_one_chunk() {
        let input = ChunkPlannerInput {
            actual_chunk_size: None,
            entries_constant_sized: true,
            average_entry_size: 8.0,
            replicated: false,
            value_alignment: 4,
            constant_value_size: Some(4),
        };
        let plan = ChunkPlanner::plan(&input);
        assert_eq!(plan.chunk_size, 8);
        assert_eq!(plan.average_chunks_per_entry, 1.0);
        assert_eq!(plan.segment_entry_space_inner_offset, 0);
    }

    #[test]
    fn variable_entries_pick_smallest_chunk_fitting_budget() {
        let input = ChunkPlannerInput {
            actual_chunk_size: None,
            entries_constant_sized: false,
            average_entry_size: 100.0,
            replicated: false,
            value_alignment: 1,
            constant_value_size: None,
        };
        let plan = ChunkPlanner::plan(&input);
        // 8 chunks * 16 bytes = 128 > 100, and 8 * 8 = 64 <= 100, so 16 is chosen.
        assert_eq!(plan.chunk_size, 16);
        assert!(plan.average_chunks_per_entry <= 8.0);
    }

    #[test]
    fn replicated_entries_use_tighter_chunk_budget() {
        let input = ChunkPlannerInput {
            actual_chunk_size: None,
            entries_constant_sized: false,
            average_entry_size: 100.0,
            replicated: true,
            value_alignment: 1,
            constant_value_size: None,
        };
        let plan = ChunkPlanner::plan(&input);
        // 4 chunks * 32 bytes = 128 > 100, and 4 * 16 = 64 <= 100, so 32 is chosen.
        assert_eq!(plan.chunk_size, 32);
    }

    #[test]
    fn explicit_override_wins() {
        let input = ChunkPlannerInput {
            actual_chunk_size: Some(64),
            entries_constant_sized: false,
            average_entry_size: 100.0,
            replicated: false,
            value_alignment: 1,
            constant_value_size: None,
        };
        let plan = ChunkPlanner::plan(&input);
        assert_eq!(plan.chunk_size, 64);
    }
}
