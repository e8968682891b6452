/*
 * Created on Wed Feb 07 2024
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

use std::fmt;

pub type Result<T> = std::result::Result<T, LayoutError>;

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
/// Everything that can go wrong while planning a layout. All variants are
/// synchronous and surface from [`crate::ConfigBuilder::emit`]; nothing here
/// is retried by the planner itself.
pub enum LayoutError {
    /// An option was set to a value outside its allowed range (e.g. a
    /// non-positive entry count, an alignment that isn't a power of two, a
    /// percentile outside `(0.5, 1)`).
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
    /// Two or more options were set that cannot coexist: an average/sample
    /// size configured on a statically-sized type, a partial set of
    /// low-level overrides, or `entriesPerSegment` exceeding
    /// `actualChunksPerSegment`.
    ConflictingConfig { reason: &'static str },
    /// The serialized size of a key or value could not be determined and no
    /// low-level override fully replaces it.
    MissingSize { which: &'static str },
    /// The configuration demands more segments, or more entries per
    /// segment, than the format can address.
    TooManyEntries { requested: u64, limit: u64 },
    /// `entriesPerSegment * averageChunksPerEntry` exceeds the maximum
    /// chunk count a segment can address.
    TooManyChunks { computed: u128, limit: u64 },
    /// A marshaller could not measure a user-supplied sample.
    BadSample { reason: String },
    /// A mutator was called on a builder after `emit()` was called.
    AlreadyFrozen,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::InvalidConfig { field, reason } => {
                write!(f, "invalid configuration for `{field}`: {reason}")
            }
            LayoutError::ConflictingConfig { reason } => {
                write!(f, "conflicting configuration: {reason}")
            }
            LayoutError::MissingSize { which } => {
                write!(
                    f,
                    "cannot determine serialized size of `{which}`: set an average size, a \
                     sample, a constant size, or a low-level override"
                )
            }
            LayoutError::TooManyEntries { requested, limit } => write!(
                f,
                "configuration requires {requested} which exceeds the limit of {limit}"
            ),
            LayoutError::TooManyChunks { computed, limit } => write!(
                f,
                "segment would need {computed} chunks which exceeds the limit of {limit}"
            ),
            LayoutError::BadSample { reason } => write!(f, "bad sample: {reason}"),
            LayoutError::AlreadyFrozen => {
                write!(f, "builder was already frozen by a prior call to emit()")
            }
        }
    }
}

impl std::error::Error for LayoutError {}
