/*
 * Created on Mon Feb 05 2024
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

//! Sizing and layout-planning engine for a segmented, memory-mappable
//! concurrent hash map.
//!
//! This crate does not map memory, does not serialize keys or values, and
//! does not run a hash table. It answers one question: given an expected
//! entry count and a description of key/value size, alignment and
//! replication requirements, what is the concrete physical shape -- segment
//! count, entries and chunks per segment, hash-lookup slot width, segment
//! header size -- that a runtime should allocate?
//!
//! ```
//! use segmap_layout::ConfigBuilder;
//!
//! let mut cfg = ConfigBuilder::new();
//! cfg.entries(1_000_000).unwrap();
//! cfg.average_key_size(8.0).unwrap();
//! cfg.average_value_size(8.0).unwrap();
//! let layout = cfg.emit().unwrap();
//! assert!(layout.segments.is_power_of_two());
//! ```

pub mod chunk;
pub mod config;
pub mod entry;
pub mod error;
pub mod hashlookup;
pub mod layout;
pub mod numberkit;
pub mod oracle;
pub mod poisson;
pub mod segment;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::ConfigBuilder;
pub use error::{LayoutError, Result};
pub use layout::{ChecksumPolicy, Layout};
pub use oracle::{ConstantSize, SizeMarshaller};
