/*
 * Created on Sun Feb 11 2024
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

//! Sizing for a segment's hash-lookup array: a flat, open-addressed array
//! of slots, each slot packing a chunk index (so a probe can jump straight
//! to an entry's chunks) alongside enough hash bits to make false-positive
//! probes rare. The actual probe sequence and collision policy belong to
//! the hash-table collaborator this module only sizes for; see
//! [`HashTableMath`].

/// `ceil(log2(n))`, with `ceil_log2(0) == ceil_log2(1) == 0`.
pub fn ceil_log2(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros()
    }
}

/// The hash-table collaborator's sizing math: how many bits are needed to
/// address a chunk, how many bits are needed (beyond that) to make hash
/// collisions rare, and how many bytes a slot holding both needs. The
/// planner treats all three as pure functions of segment shape; the probe
/// sequence and collision resolution they support are out of scope here.
pub trait HashTableMath: Send + Sync {
    /// Bits needed to address any chunk index within a segment holding
    /// `chunks_per_segment` chunks.
    fn value_bits(&self, chunks_per_segment: u64) -> u32;

    /// Bits needed, beyond `value_bits`, to distinguish entries hashing
    /// into a segment of `entries_per_segment` capacity.
    fn key_bits(&self, entries_per_segment: u64, value_bits: u32) -> u32;

    /// Bytes needed for a slot holding `key_bits + value_bits` of packed
    /// state. Must return 4 or 8.
    fn entry_size(&self, key_bits: u32, value_bits: u32) -> u32;
}

/// The default hash-table math: addresses chunks with `ceil(log2(chunks+1))`
/// bits (the `+1` reserves the all-ones pattern as an "empty slot" sentinel)
/// and reserves `extra_hash_bits` beyond what's needed to address entries,
/// to keep probe false-positive rates low.
#[derive(Debug, Clone, Copy)]
pub struct StandardHashTableMath {
    pub extra_hash_bits: u32,
}

impl Default for StandardHashTableMath {
    fn default() -> Self {
        // 3 extra bits keeps the false-positive probability of a random
        // hash collision during a probe under 1/8, which is plenty given
        // the full key comparison that follows any slot match.
        Self { extra_hash_bits: 3 }
    }
}

impl HashTableMath for StandardHashTableMath {
    fn value_bits(&self, chunks_per_segment: u64) -> u32 {
        ceil_log2(chunks_per_segment.saturating_add(1))
    }

    fn key_bits(&self, entries_per_segment: u64, value_bits: u32) -> u32 {
        let wanted = ceil_log2(entries_per_segment.max(1)) + self.extra_hash_bits;
        wanted.saturating_sub(value_bits)
    }

    fn entry_size(&self, key_bits: u32, value_bits: u32) -> u32 {
        if key_bits + value_bits <= 32 {
            4
        } else {
            8
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HashLookupPlan {
    pub value_bits: u32,
    pub key_bits: u32,
    pub slot_bytes: u32,
}

pub struct HashLookupSizer<'a> {
    math: &'a dyn HashTableMath,
}

impl<'a> HashLookupSizer<'a> {
    pub fn new(math: &'a dyn HashTableMath) -> Self {
        Self { math }
    }

    /// Sizes a hash-lookup slot for the given segment shape. Returns `None`
    /// if no valid slot width can represent this shape -- either because
    /// the bits needed exceed 64, or because an 8-byte slot would be needed
    /// but 64-bit atomics aren't available.
    pub fn plan(
        &self,
        chunks_per_segment: u64,
        entries_per_segment: u64,
        aligned_64_bit_memory_operations_atomic: bool,
    ) -> Option<HashLookupPlan> {
        let value_bits = self.math.value_bits(chunks_per_segment);
        let key_bits = self.math.key_bits(entries_per_segment, value_bits);
        let slot_bytes = self.math.entry_size(key_bits, value_bits);

        if slot_bytes != 4 && slot_bytes != 8 {
            return None;
        }
        if slot_bytes == 8 && !aligned_64_bit_memory_operations_atomic {
            return None;
        }
        if (value_bits as u64 + key_bits as u64) > 8 * slot_bytes as u64 {
            return None;
        }

        Some(HashLookupPlan {
            value_bits,
            key_bits,
            slot_bytes,
        })
    }

    /// Just the slot width, for callers (like the segment-count search)
    /// that only need to know 4 vs 8 without the rest of the plan.
    pub fn slot_bytes(
        &self,
        chunks_per_segment: u64,
        entries_per_segment: u64,
        aligned_64_bit_memory_operations_atomic: bool,
    ) -> Option<u32> {
        self.plan(
            chunks_per_segment,
            entries_per_segment,
            aligned_64_bit_memory_operations_atomic,
        )
        .map(|p| p.slot_bytes)
    }
}
