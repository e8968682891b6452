/*
 * Created on Wed Feb 14 2024
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

//! The mutable builder surface, and the one-shot resolution pass
//! (`emit`) that turns it into a frozen [`Layout`].

use crate::chunk::{ChunkPlanner, ChunkPlannerInput};
use crate::entry::{EntrySizer, EntrySizerInput, SizeResolution};
use crate::error::{LayoutError, Result};
use crate::hashlookup::{HashLookupSizer, HashTableMath, StandardHashTableMath};
use crate::layout::{
    ChecksumPolicy, Layout, LayoutAssembler, LayoutAssemblerInput, MAX_SEGMENTS, os_page_size,
};
use crate::numberkit::is_power_of_two;
use crate::oracle::{ConstantSize, SizeMarshaller, VarIntSizeMarshaller};
use crate::segment::{SegmentPlanner, SegmentPlannerInput};
use std::cell::Cell;
use std::sync::Arc;

const DEFAULT_ENTRIES: u64 = 1 << 20;

#[derive(Clone)]
enum SizeSource {
    Unset,
    Average(f64),
    Sample(Arc<[u8]>),
    Constant(u32),
}

/// The mutable, `Configuring`-state builder for a [`Layout`]. Every setter
/// validates eagerly and returns a structured [`LayoutError`] rather than
/// panicking; after [`ConfigBuilder::emit`] succeeds once, the builder is
/// considered `Frozen` and further mutators fail with
/// [`LayoutError::AlreadyFrozen`]. Call [`ConfigBuilder::clone`] to get an
/// independent, un-frozen copy.
pub struct ConfigBuilder {
    entries: u64,
    key_size: SizeSource,
    value_size: SizeSource,
    key_marshaller: Option<Arc<dyn ConstantSize>>,
    value_marshaller: Option<Arc<dyn ConstantSize>>,
    length_marshaller: Arc<dyn SizeMarshaller>,
    hash_table_math: Arc<dyn HashTableMath>,
    actual_chunk_size: Option<u32>,
    actual_chunks_per_segment: Option<u64>,
    entries_per_segment: Option<u64>,
    actual_segments: Option<u64>,
    min_segments: u64,
    max_chunks_per_entry: Option<u32>,
    value_alignment: u32,
    replicated: bool,
    checksum_entries: ChecksumPolicy,
    persisted: bool,
    max_bloat_factor: f64,
    allow_segment_tiering: bool,
    non_tiered_segments_percentile: f64,
    aligned_64_bit_memory_operations_atomic: bool,
    frozen: Cell<bool>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES,
            key_size: SizeSource::Unset,
            value_size: SizeSource::Unset,
            key_marshaller: None,
            value_marshaller: None,
            length_marshaller: Arc::new(VarIntSizeMarshaller),
            hash_table_math: Arc::new(StandardHashTableMath::default()),
            actual_chunk_size: None,
            actual_chunks_per_segment: None,
            entries_per_segment: None,
            actual_segments: None,
            min_segments: 0,
            max_chunks_per_entry: None,
            value_alignment: 1,
            replicated: false,
            checksum_entries: ChecksumPolicy::IfPersisted,
            persisted: false,
            max_bloat_factor: 1.0,
            allow_segment_tiering: true,
            non_tiered_segments_percentile: 0.99999,
            aligned_64_bit_memory_operations_atomic: cfg!(target_pointer_width = "64"),
            frozen: Cell::new(false),
        }
    }
}

impl Clone for ConfigBuilder {
    /// Deep-copies every configuration field, including marshaller handles.
    /// The clone always starts in the `Configuring` state regardless of
    /// whether `self` was frozen, so a second `emit()` on the clone sees
    /// the same inputs the original had at clone time.
    fn clone(&self) -> Self {
        Self {
            entries: self.entries,
            key_size: self.key_size.clone(),
            value_size: self.value_size.clone(),
            key_marshaller: self.key_marshaller.clone(),
            value_marshaller: self.value_marshaller.clone(),
            length_marshaller: self.length_marshaller.clone(),
            hash_table_math: self.hash_table_math.clone(),
            actual_chunk_size: self.actual_chunk_size,
            actual_chunks_per_segment: self.actual_chunks_per_segment,
            entries_per_segment: self.entries_per_segment,
            actual_segments: self.actual_segments,
            min_segments: self.min_segments,
            max_chunks_per_entry: self.max_chunks_per_entry,
            value_alignment: self.value_alignment,
            replicated: self.replicated,
            checksum_entries: self.checksum_entries,
            persisted: self.persisted,
            max_bloat_factor: self.max_bloat_factor,
            allow_segment_tiering: self.allow_segment_tiering,
            non_tiered_segments_percentile: self.non_tiered_segments_percentile,
            aligned_64_bit_memory_operations_atomic: self.aligned_64_bit_memory_operations_atomic,
            frozen: Cell::new(false),
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard_mutable(&self) -> Result<()> {
        if self.frozen.get() {
            Err(LayoutError::AlreadyFrozen)
        } else {
            Ok(())
        }
    }

    pub fn entries(&mut self, n: u64) -> Result<&mut Self> {
        self.guard_mutable()?;
        if n < 1 {
            return Err(LayoutError::InvalidConfig {
                field: "entries",
                reason: "must be at least 1",
            });
        }
        self.entries = n;
        Ok(self)
    }

    pub fn average_key_size(&mut self, size: f64) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.reject_if_statically_known(&self.key_marshaller, "key")?;
        if !(size > 0.0 && size.is_finite()) {
            return Err(LayoutError::InvalidConfig {
                field: "averageKeySize",
                reason: "must be a positive finite number",
            });
        }
        self.key_size = SizeSource::Average(size);
        Ok(self)
    }

    pub fn average_key_sample(&mut self, sample: impl Into<Arc<[u8]>>) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.reject_if_statically_known(&self.key_marshaller, "key")?;
        self.key_size = SizeSource::Sample(sample.into());
        Ok(self)
    }

    pub fn constant_key_size(&mut self, size: u32) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.reject_if_statically_known(&self.key_marshaller, "key")?;
        self.key_size = SizeSource::Constant(size);
        Ok(self)
    }

    pub fn key_marshaller(&mut self, marshaller: Arc<dyn ConstantSize>) -> Result<&mut Self> {
        self.guard_mutable()?;
        if marshaller.is_statically_known() && !matches!(self.key_size, SizeSource::Unset) {
            return Err(LayoutError::ConflictingConfig {
                reason: "key marshaller is statically sized; clear averageKeySize/averageKey/constantKeySize first",
            });
        }
        self.key_marshaller = Some(marshaller);
        Ok(self)
    }

    pub fn average_value_size(&mut self, size: f64) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.reject_if_statically_known(&self.value_marshaller, "value")?;
        if !(size > 0.0 && size.is_finite()) {
            return Err(LayoutError::InvalidConfig {
                field: "averageValueSize",
                reason: "must be a positive finite number",
            });
        }
        self.value_size = SizeSource::Average(size);
        Ok(self)
    }

    pub fn average_value_sample(&mut self, sample: impl Into<Arc<[u8]>>) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.reject_if_statically_known(&self.value_marshaller, "value")?;
        self.value_size = SizeSource::Sample(sample.into());
        Ok(self)
    }

    pub fn constant_value_size(&mut self, size: u32) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.reject_if_statically_known(&self.value_marshaller, "value")?;
        self.value_size = SizeSource::Constant(size);
        Ok(self)
    }

    pub fn value_marshaller(&mut self, marshaller: Arc<dyn ConstantSize>) -> Result<&mut Self> {
        self.guard_mutable()?;
        if marshaller.is_statically_known() && !matches!(self.value_size, SizeSource::Unset) {
            return Err(LayoutError::ConflictingConfig {
                reason: "value marshaller is statically sized; clear averageValueSize/averageValue/constantValueSize first",
            });
        }
        self.value_marshaller = Some(marshaller);
        Ok(self)
    }

    pub fn length_marshaller(&mut self, marshaller: Arc<dyn SizeMarshaller>) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.length_marshaller = marshaller;
        Ok(self)
    }

    pub fn hash_table_math(&mut self, math: Arc<dyn HashTableMath>) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.hash_table_math = math;
        Ok(self)
    }

    pub fn actual_chunk_size(&mut self, size: u32) -> Result<&mut Self> {
        self.guard_mutable()?;
        if size < 1 {
            return Err(LayoutError::InvalidConfig {
                field: "actualChunkSize",
                reason: "must be at least 1",
            });
        }
        self.actual_chunk_size = Some(size);
        Ok(self)
    }

    pub fn actual_chunks_per_segment(&mut self, chunks: u64) -> Result<&mut Self> {
        self.guard_mutable()?;
        if chunks < 1 {
            return Err(LayoutError::InvalidConfig {
                field: "actualChunksPerSegment",
                reason: "must be at least 1",
            });
        }
        self.actual_chunks_per_segment = Some(chunks);
        Ok(self)
    }

    pub fn entries_per_segment(&mut self, entries: u64) -> Result<&mut Self> {
        self.guard_mutable()?;
        if entries < 1 {
            return Err(LayoutError::InvalidConfig {
                field: "entriesPerSegment",
                reason: "must be at least 1",
            });
        }
        self.entries_per_segment = Some(entries);
        Ok(self)
    }

    pub fn actual_segments(&mut self, segments: u64) -> Result<&mut Self> {
        self.guard_mutable()?;
        if segments < 1 || segments > MAX_SEGMENTS {
            return Err(LayoutError::InvalidConfig {
                field: "actualSegments",
                reason: "must be in [1, 2^30]",
            });
        }
        if !is_power_of_two(segments) {
            return Err(LayoutError::InvalidConfig {
                field: "actualSegments",
                reason: "must be a power of two",
            });
        }
        self.actual_segments = Some(segments);
        Ok(self)
    }

    pub fn min_segments(&mut self, segments: u64) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.min_segments = segments;
        Ok(self)
    }

    pub fn max_chunks_per_entry(&mut self, chunks: u32) -> Result<&mut Self> {
        self.guard_mutable()?;
        if chunks < 1 {
            return Err(LayoutError::InvalidConfig {
                field: "maxChunksPerEntry",
                reason: "must be at least 1",
            });
        }
        self.max_chunks_per_entry = Some(chunks);
        Ok(self)
    }

    pub fn value_alignment(&mut self, alignment: u32) -> Result<&mut Self> {
        self.guard_mutable()?;
        if !is_power_of_two(alignment as u64) {
            return Err(LayoutError::InvalidConfig {
                field: "valueAlignment",
                reason: "must be a power of two",
            });
        }
        self.value_alignment = alignment;
        Ok(self)
    }

    pub fn replicated(&mut self, replicated: bool) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.replicated = replicated;
        Ok(self)
    }

    pub fn checksum_entries(&mut self, policy: ChecksumPolicy) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.checksum_entries = policy;
        Ok(self)
    }

    /// Tells the planner whether the map being sized will ultimately be
    /// backed by a file, which is what `ChecksumPolicy::IfPersisted`
    /// resolves against. The runtime that actually opens the file is out
    /// of scope for this crate; this is just the one bit of its intent the
    /// checksum decision needs.
    pub fn persisted(&mut self, persisted: bool) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.persisted = persisted;
        Ok(self)
    }

    pub fn max_bloat_factor(&mut self, factor: f64) -> Result<&mut Self> {
        self.guard_mutable()?;
        if !(1.0..=1000.0).contains(&factor) {
            return Err(LayoutError::InvalidConfig {
                field: "maxBloatFactor",
                reason: "must be in [1, 1000]",
            });
        }
        self.max_bloat_factor = factor;
        Ok(self)
    }

    pub fn allow_segment_tiering(&mut self, allow: bool) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.allow_segment_tiering = allow;
        Ok(self)
    }

    pub fn non_tiered_segments_percentile(&mut self, percentile: f64) -> Result<&mut Self> {
        self.guard_mutable()?;
        if !(percentile > 0.5 && percentile < 1.0) {
            return Err(LayoutError::InvalidConfig {
                field: "nonTieredSegmentsPercentile",
                reason: "must be in (0.5, 1)",
            });
        }
        self.non_tiered_segments_percentile = percentile;
        Ok(self)
    }

    pub fn aligned_64_bit_memory_operations_atomic(&mut self, atomic: bool) -> Result<&mut Self> {
        self.guard_mutable()?;
        self.aligned_64_bit_memory_operations_atomic = atomic;
        Ok(self)
    }

    fn reject_if_statically_known(
        &self,
        marshaller: &Option<Arc<dyn ConstantSize>>,
        which: &'static str,
    ) -> Result<()> {
        if let Some(m) = marshaller {
            if m.is_statically_known() {
                return Err(LayoutError::ConflictingConfig {
                    reason: if which == "key" {
                        "key type is statically sized; averageKeySize/averageKey/constantKeySize cannot be set"
                    } else {
                        "value type is statically sized; averageValueSize/averageValue/constantValueSize cannot be set"
                    },
                });
            }
        }
        Ok(())
    }

    fn resolve_side(
        size: &SizeSource,
        marshaller: &Option<Arc<dyn ConstantSize>>,
        which: &'static str,
    ) -> Result<SizeResolution> {
        if let Some(m) = marshaller {
            if m.is_statically_known() {
                let size = m.constant_size().ok_or(LayoutError::MissingSize { which })?;
                return Ok(SizeResolution::constant(size));
            }
        }
        match size {
            SizeSource::Constant(n) => Ok(SizeResolution::constant(*n)),
            SizeSource::Average(avg) => Ok(SizeResolution::average(*avg)),
            SizeSource::Sample(sample) => {
                let m = marshaller
                    .as_ref()
                    .ok_or(LayoutError::MissingSize { which })?;
                let measured = m.measure(sample)?;
                Ok(SizeResolution::average(measured as f64))
            }
            SizeSource::Unset => {
                if let Some(m) = marshaller {
                    if let Some(constant) = m.constant_size() {
                        return Ok(SizeResolution::constant(constant));
                    }
                }
                Err(LayoutError::MissingSize { which })
            }
        }
    }

    /// Resolves every derived value exactly once, checks every invariant,
    /// and either returns a frozen [`Layout`] or a structured error. Can be
    /// called any number of times, including on an already-frozen builder
    /// -- identical configuration always produces a byte-identical layout.
    pub fn emit(&self) -> Result<Layout> {
        let key = Self::resolve_side(&self.key_size, &self.key_marshaller, "key")?;
        let value = Self::resolve_side(&self.value_size, &self.value_marshaller, "value")?;

        if self.actual_chunks_per_segment.is_some()
            && !(self.actual_segments.is_some()
                && self.entries_per_segment.is_some()
                && self.actual_chunk_size.is_some())
        {
            return Err(LayoutError::ConflictingConfig {
                reason: "actualChunksPerSegment requires actualSegments, entriesPerSegment and \
                         actualChunkSize to all be set",
            });
        }
        if let (Some(eps), Some(cps)) = (self.entries_per_segment, self.actual_chunks_per_segment)
        {
            if eps > cps {
                return Err(LayoutError::ConflictingConfig {
                    reason: "entriesPerSegment exceeds actualChunksPerSegment",
                });
            }
        }

        let entries_constant_sized = key.is_constant && value.is_constant;
        if entries_constant_sized && self.actual_chunk_size.is_some() {
            return Err(LayoutError::ConflictingConfig {
                reason: "actualChunkSize must not be set when both key and value are constant-sized",
            });
        }

        let checksums_for_sizing = self.checksum_entries.resolve(self.persisted);
        let entry_estimate = EntrySizer::estimate(&EntrySizerInput {
            key,
            value,
            key_length_marshaller: self.length_marshaller.as_ref(),
            value_length_marshaller: self.length_marshaller.as_ref(),
            replicated: self.replicated,
            checksums: checksums_for_sizing,
            value_alignment: self.value_alignment,
            actual_chunk_size: self.actual_chunk_size,
        });

        let constant_value_size = if value.is_constant {
            Some(value.average_size.round() as u32)
        } else {
            None
        };

        let chunk_plan = ChunkPlanner::plan(&ChunkPlannerInput {
            actual_chunk_size: self.actual_chunk_size,
            entries_constant_sized,
            average_entry_size: entry_estimate.average_entry_size,
            replicated: self.replicated,
            value_alignment: self.value_alignment,
            constant_value_size,
        });

        let segment_plan = SegmentPlanner::plan(
            &SegmentPlannerInput {
                entries: self.entries,
                average_entry_size: entry_estimate.average_entry_size,
                average_value_size: value.average_size,
                average_chunks_per_entry: chunk_plan.average_chunks_per_entry,
                non_tiered_segments_percentile: self.non_tiered_segments_percentile,
                min_segments_floor: self.min_segments,
                page_size: os_page_size(),
                aligned_64_bit_memory_operations_atomic: self
                    .aligned_64_bit_memory_operations_atomic,
                actual_segments: self.actual_segments,
                entries_per_segment_override: self.entries_per_segment,
                actual_chunks_per_segment: self.actual_chunks_per_segment,
            },
            self.hash_table_math.as_ref(),
        )?;

        if let Some(cap) = self.max_chunks_per_entry {
            if cap as u64 > segment_plan.chunks_per_segment {
                return Err(LayoutError::ConflictingConfig {
                    reason: "maxChunksPerEntry exceeds chunksPerSegment",
                });
            }
        }

        let hash_lookup_plan = HashLookupSizer::new(self.hash_table_math.as_ref())
            .plan(
                segment_plan.chunks_per_segment,
                segment_plan.entries_per_segment,
                self.aligned_64_bit_memory_operations_atomic,
            )
            .ok_or(LayoutError::InvalidConfig {
                field: "hashLookupSlotBytes",
                reason: "no slot width can address this segment shape",
            })?;

        let layout = LayoutAssembler::assemble(LayoutAssemblerInput {
            segments: segment_plan.segments,
            entries_per_segment: segment_plan.entries_per_segment,
            chunk_size: chunk_plan.chunk_size,
            chunks_per_segment: segment_plan.chunks_per_segment,
            hash_lookup_value_bits: hash_lookup_plan.value_bits,
            hash_lookup_key_bits: hash_lookup_plan.key_bits,
            hash_lookup_slot_bytes: hash_lookup_plan.slot_bytes,
            value_alignment: self.value_alignment,
            worst_alignment_padding: entry_estimate.worst_alignment_padding,
            segment_inner_offset: chunk_plan.segment_entry_space_inner_offset,
            entries_are_constant_sized: entries_constant_sized,
            user_max_chunks_per_entry: self.max_chunks_per_entry,
            allow_segment_tiering: self.allow_segment_tiering,
            max_bloat_factor: self.max_bloat_factor,
            checksums: self.checksum_entries,
            will_be_persisted: self.persisted,
            replicated: self.replicated,
            aligned_64_bit_memory_operations_atomic: self.aligned_64_bit_memory_operations_atomic,
        })?;

        self.frozen.set(true);
        Ok(layout)
    }
}
