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

//! Seams onto the marshalling layer. The planner never serializes a key or
//! a value itself -- that's the runtime's job -- but it needs to ask two
//! questions of whatever marshaller the caller plans to use: "do you always
//! produce the same number of bytes?" and "how many bytes does a length
//! prefix for `n` take?". Those two questions are this module's whole job.

use crate::error::{LayoutError, Result};
use std::sync::Arc;

/// Encodes an integer length prefix. The planner only ever calls
/// [`SizeMarshaller::storing_length`]; it never encodes or decodes anything
/// itself.
pub trait SizeMarshaller: Send + Sync {
    /// Number of bytes used to store `n` as a length prefix.
    fn storing_length(&self, n: u64) -> u32;

    /// `true` if `storing_length` returns the same value for every `n` this
    /// marshaller will ever be asked to encode. Fixed-width length fields
    /// (a `u32` length, say) are constant width; variable-length integer
    /// encodings are not. Defaults to `false`, which is the conservative
    /// answer.
    fn is_constant_width(&self) -> bool {
        false
    }
}

/// What a marshaller for `K` or `V` itself (not its length prefix) knows
/// about its own output size.
pub trait ConstantSize: Send + Sync {
    /// `true` if the *type* fixes the serialized size (not just this
    /// instance of the marshaller) -- e.g. a marshaller for `u64` always
    /// produces 8 bytes, and no amount of configuration changes that.
    fn is_statically_known(&self) -> bool {
        false
    }

    /// The constant serialized size in bytes, if this marshaller has one
    /// (whether statically known or merely configured to be constant at
    /// runtime).
    fn constant_size(&self) -> Option<u32> {
        None
    }

    /// Measures the serialized size of a sample value. Fails with
    /// [`LayoutError::BadSample`] if this marshaller cannot measure without
    /// fully encoding (callers should prefer `constant_size` where
    /// possible).
    fn measure(&self, sample: &[u8]) -> Result<u32> {
        let _ = sample;
        Err(LayoutError::BadSample {
            reason: "marshaller does not support sample measurement".into(),
        })
    }
}

/// Adapts a single `K` or `V` marshaller handle into the three questions
/// [`crate::entry::EntrySizer`] needs answered: is it statically sized, does
/// it have a constant size right now, and how big is this sample.
#[derive(Clone)]
pub struct SerializationOracle {
    marshaller: Arc<dyn ConstantSize>,
}

impl SerializationOracle {
    pub fn new(marshaller: Arc<dyn ConstantSize>) -> Self {
        Self { marshaller }
    }

    pub fn statically_known(&self) -> bool {
        self.marshaller.is_statically_known()
    }

    pub fn constant_size(&self) -> Option<u32> {
        self.marshaller.constant_size()
    }

    pub fn serialization_size(&self, sample: &[u8]) -> Result<u32> {
        self.marshaller.measure(sample)
    }
}

/// Length-prefix-less size oracle for a type whose marshaller reports no
/// constant size at all -- the common case for a plain average-size
/// configuration with no marshaller handle supplied.
#[derive(Clone, Copy, Default)]
pub struct UnknownSize;

impl ConstantSize for UnknownSize {}

/// A conventional variable-length (LEB128-style) integer length marshaller:
/// 7 bits of payload per byte, continuation bit in the high bit. This is
/// the default [`SizeMarshaller`] used when a caller doesn't supply their
/// own, matching the common on-disk varint length prefix used across the
/// storage and network layers this crate's layouts are planned for.
#[derive(Clone, Copy, Debug, Default)]
pub struct VarIntSizeMarshaller;

impl SizeMarshaller for VarIntSizeMarshaller {
    fn storing_length(&self, n: u64) -> u32 {
        let bits = 64 - n.leading_zeros();
        let bits = bits.max(1);
        (bits + 6) / 7
    }

    fn is_constant_width(&self) -> bool {
        false
    }
}

/// A fixed-width length marshaller, for formats that always reserve `width`
/// bytes for a length prefix regardless of the value being encoded.
#[derive(Clone, Copy, Debug)]
pub struct FixedWidthSizeMarshaller {
    pub width: u32,
}

impl FixedWidthSizeMarshaller {
    pub const fn new(width: u32) -> Self {
        Self { width }
    }
}

impl SizeMarshaller for FixedWidthSizeMarshaller {
    fn storing_length(&self, _n: u64) -> u32 {
        self.width
    }

    fn is_constant_width(&self) -> bool {
        true
    }
}

/// A marshaller for a type whose serialized size never changes, known at
/// the type level (e.g. a marshaller for `[u8; 16]`).
#[derive(Clone, Copy, Debug)]
pub struct StaticSize {
    pub size: u32,
}

impl StaticSize {
    pub const fn new(size: u32) -> Self {
        Self { size }
    }
}

impl ConstantSize for StaticSize {
    fn is_statically_known(&self) -> bool {
        true
    }

    fn constant_size(&self) -> Option<u32> {
        Some(self.size)
    }

    fn measure(&self, _sample: &[u8]) -> Result<u32> {
        Ok(self.size)
    }
}
