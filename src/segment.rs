/*
 * Created on Mon Feb 12 2024
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

//! Chooses how many segments the map is split into and how many entries
//! (and chunks) each one is sized to hold without tiering. This is the
//! component with the most moving parts: it searches over hash-lookup slot
//! widths, leans on [`crate::poisson`] to translate a load percentile into
//! a segment capacity, and has to fall back gracefully when a candidate
//! slot width can't address enough of a segment.

use crate::error::{LayoutError, Result};
use crate::hashlookup::{HashLookupSizer, HashTableMath};
use crate::layout::{MAX_SEGMENT_CHUNKS, MAX_SEGMENT_ENTRIES, MAX_SEGMENTS};
use crate::numberkit::next_power_of_two;
use crate::poisson::PoissonSolver;

/// Candidate hash-lookup slot widths tried in order. A smaller slot width
/// is tried first because it packs more slots per cache line; a segment
/// too small to benefit from that (the page-efficiency guard) falls
/// through to the next, wider candidate.
const SLOT_WIDTH_CANDIDATES: [u32; 2] = [4, 8];

/// Entries must occupy at least this many pages per segment at slot width
/// 4, or the Poisson over-provisioning for many tiny segments wastes more
/// memory than the narrower slot saves. Inherited from the system this
/// design is modeled on, not independently re-derived; see `DESIGN.md`.
const PAGE_EFFICIENCY_MULTIPLIER: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct SegmentPlan {
    pub segments: u64,
    pub entries_per_segment: u64,
    pub chunks_per_segment: u64,
}

pub struct SegmentPlannerInput {
    pub entries: u64,
    pub average_entry_size: f64,
    pub average_value_size: f64,
    pub average_chunks_per_entry: f64,
    pub non_tiered_segments_percentile: f64,
    /// The user-configured `minSegments` floor (default 0).
    pub min_segments_floor: u64,
    pub page_size: u32,
    pub aligned_64_bit_memory_operations_atomic: bool,
    pub actual_segments: Option<u64>,
    pub entries_per_segment_override: Option<u64>,
    pub actual_chunks_per_segment: Option<u64>,
}

pub struct SegmentPlanner;

impl SegmentPlanner {
    pub fn plan(input: &SegmentPlannerInput, math: &dyn HashTableMath) -> Result<SegmentPlan> {
        let floor = Self::effective_min_segments(input);

        let (segments, entries_per_segment) = if let Some(segments) = input.actual_segments {
            let eps = Self::entries_per_segment_given_segments(input, segments)?;
            (segments, eps)
        } else if let Some(eps) = input.entries_per_segment_override {
            let segments = Self::segments_given_entries_per_segment(input, eps, floor)?;
            let segments = next_power_of_two(segments, floor.max(1));
            if segments > MAX_SEGMENTS {
                return Err(LayoutError::TooManyEntries {
                    requested: segments,
                    limit: MAX_SEGMENTS,
                });
            }
            (segments, eps)
        } else {
            Self::heuristic_search(input, math, floor)?
        };

        let chunks_per_segment = match input.actual_chunks_per_segment {
            Some(c) => c,
            None => (entries_per_segment as f64 * input.average_chunks_per_entry).round() as u64,
        };

        Ok(SegmentPlan {
            segments,
            entries_per_segment,
            chunks_per_segment,
        })
    }

    fn heuristic_search(
        input: &SegmentPlannerInput,
        math: &dyn HashTableMath,
        floor: u64,
    ) -> Result<(u64, u64)> {
        let sizer = HashLookupSizer::new(math);
        let mut last_err = LayoutError::TooManyEntries {
            requested: input.entries,
            limit: MAX_SEGMENTS,
        };

        for &width in &SLOT_WIDTH_CANDIDATES {
            if width == 8 && !input.aligned_64_bit_memory_operations_atomic {
                continue;
            }

            let entries_per_segment =
                Self::max_entries_per_segment_for_width(input, &sizer, width);
            if entries_per_segment == 0 {
                continue;
            }

            let segments = match Self::segments_given_entries_per_segment(
                input,
                entries_per_segment,
                floor,
            ) {
                Ok(s) => s,
                Err(e) => {
                    last_err = e;
                    continue;
                }
            };
            let segments = next_power_of_two(segments, floor.max(1));

            if width == 4 {
                let page_bytes = input.page_size as u64 * PAGE_EFFICIENCY_MULTIPLIER;
                let segment_bytes =
                    (entries_per_segment as f64 * input.average_entry_size) as u64;
                if segment_bytes < page_bytes {
                    log::debug!(
                        "rejecting slot width 4 (segment holds {segment_bytes} bytes, \
                         need >= {page_bytes} for page efficiency); trying width 8"
                    );
                    continue;
                }
            }

            if segments > MAX_SEGMENTS {
                last_err = LayoutError::TooManyEntries {
                    requested: segments,
                    limit: MAX_SEGMENTS,
                };
                continue;
            }

            log::debug!(
                "segment search settled on slot width {width}: {segments} segments x \
                 {entries_per_segment} entries/segment"
            );
            return Ok((segments, entries_per_segment));
        }

        Err(last_err)
    }

    /// Largest `entriesPerSegment` for which the hash-lookup slot fits in
    /// `width` bytes, found by exponential search followed by bisection
    /// (the slot width needed is monotonic non-decreasing in
    /// `entriesPerSegment`).
    fn max_entries_per_segment_for_width(
        input: &SegmentPlannerInput,
        sizer: &HashLookupSizer<'_>,
        width: u32,
    ) -> u64 {
        let fits = |e: u64| -> bool {
            let chunks = ((e as f64) * input.average_chunks_per_entry).round() as u64;
            matches!(
                sizer.slot_bytes(
                    chunks.max(1),
                    e.max(1),
                    input.aligned_64_bit_memory_operations_atomic,
                ),
                Some(bytes) if bytes <= width
            )
        };

        if !fits(1) {
            return 0;
        }

        let mut lo = 1u64;
        let mut hi = 2u64;
        while hi < MAX_SEGMENT_ENTRIES && fits(hi) {
            lo = hi;
            if hi > MAX_SEGMENT_ENTRIES / 2 {
                hi = MAX_SEGMENT_ENTRIES;
                break;
            }
            hi *= 2;
        }
        if fits(hi) {
            return hi;
        }
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if fits(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn segments_given_entries_per_segment(
        input: &SegmentPlannerInput,
        entries_per_segment: u64,
        floor: u64,
    ) -> Result<u64> {
        let precision = 1.0 / input.average_chunks_per_entry.max(1.0);
        let mean = PoissonSolver::mean_by_cumulative_probability_and_value(
            input.non_tiered_segments_percentile,
            entries_per_segment,
            precision,
        )
        .ok_or(LayoutError::TooManyEntries {
            requested: entries_per_segment,
            limit: MAX_SEGMENT_ENTRIES,
        })?;

        if mean <= 0.0 {
            return Err(LayoutError::TooManyEntries {
                requested: entries_per_segment,
                limit: MAX_SEGMENT_ENTRIES,
            });
        }

        let segments = (input.entries as f64 / mean).floor() as u64 + 1;
        if segments == 0 || segments > MAX_SEGMENTS {
            return Err(LayoutError::TooManyEntries {
                requested: segments,
                limit: MAX_SEGMENTS,
            });
        }
        Ok(segments.max(floor))
    }

    fn entries_per_segment_given_segments(
        input: &SegmentPlannerInput,
        segments: u64,
    ) -> Result<u64> {
        let average_load = input.entries as f64 / segments as f64;
        let entries_per_segment =
            PoissonSolver::inverse_cdf(average_load, input.non_tiered_segments_percentile).ok_or(
                LayoutError::TooManyEntries {
                    requested: input.entries,
                    limit: MAX_SEGMENT_ENTRIES,
                },
            )?;

        let chunks_needed = entries_per_segment as f64 * input.average_chunks_per_entry;
        if chunks_needed > MAX_SEGMENT_CHUNKS as f64 {
            return Err(LayoutError::TooManyChunks {
                computed: chunks_needed as u128,
                limit: MAX_SEGMENT_CHUNKS,
            });
        }
        if entries_per_segment > MAX_SEGMENT_ENTRIES {
            return Err(LayoutError::TooManyEntries {
                requested: entries_per_segment,
                limit: MAX_SEGMENT_ENTRIES,
            });
        }
        Ok(entries_per_segment)
    }

    fn effective_min_segments(input: &SegmentPlannerInput) -> u64 {
        let estimate = Self::estimate_min_segments(input.entries, input.average_value_size);
        input.min_segments_floor.max(estimate).max(1)
    }

    /// The default segment-count floor: a small ladder keyed on both the
    /// total estimated data volume (`entries * averageValueSize`) and, for
    /// very large average values, an extra multiplier so that a handful of
    /// huge values don't get crammed into one segment. See `DESIGN.md` for
    /// the reasoning behind this specific ladder.
    fn estimate_min_segments(entries: u64, average_value_size: f64) -> u64 {
        let total_size = entries as f64 * average_value_size.max(0.0);
        let base: u64 = if total_size < 1024.0 {
            1
        } else if total_size < 4096.0 {
            8
        } else if total_size < 16_384.0 {
            16
        } else if total_size < 131_072.0 {
            32
        } else if total_size < 1_048_576.0 {
            64
        } else if total_size < 200_000_000.0 {
            128
        } else {
            256
        };

        let multiplier: u64 = if average_value_size >= 1e6 {
            16
        } else if average_value_size >= 1e5 {
            8
        } else if average_value_size >= 1e4 {
            4
        } else if average_value_size >= 1e3 {
            2
        } else {
            1
        };

        let estimate_by_size = base * multiplier;
        let estimate_by_entries = next_power_of_two((entries / 32).max(1), 1);
        estimate_by_entries.min(estimate_by_size)
    }
}
