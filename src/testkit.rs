/*
 * Created on Thu Feb 15 2024
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

//! Seeded random-config generation for the property tests in `tests/`.
//! Nothing here is reachable outside `#[cfg(test)]` builds.

use crate::config::ConfigBuilder;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A valid, randomly-shaped configuration. Deliberately stays away from the
/// low-level override knobs (`actualSegments`, `actualChunkSize`, ...) so
/// the generated configs always exercise the full heuristic search; override
/// combinations get their own targeted unit tests instead.
pub fn arbitrary_config(seed: u64) -> ConfigBuilder {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cfg = ConfigBuilder::new();

    let entries = rng.gen_range(1u64..=5_000_000);
    cfg.entries(entries).unwrap();

    let avg_key = rng.gen_range(1.0..256.0);
    let avg_value = rng.gen_range(1.0..4096.0);
    cfg.average_key_size(avg_key).unwrap();
    cfg.average_value_size(avg_value).unwrap();

    if rng.gen_bool(0.3) {
        let alignment = 1u32 << rng.gen_range(0u32..5);
        cfg.value_alignment(alignment).unwrap();
    }

    if rng.gen_bool(0.2) {
        cfg.replicated(true).unwrap();
    }

    if rng.gen_bool(0.2) {
        let percentile = rng.gen_range(0.9f64..0.999999);
        cfg.non_tiered_segments_percentile(percentile).unwrap();
    }

    if rng.gen_bool(0.2) {
        let floor = 1u64 << rng.gen_range(0u32..8);
        cfg.min_segments(floor).unwrap();
    }

    if rng.gen_bool(0.15) {
        let factor = rng.gen_range(1.0f64..8.0);
        cfg.max_bloat_factor(factor).unwrap();
    }

    cfg
}

/// A random configuration with both key and value constant-sized, for
/// property checks specific to the constant-size fast path (P3).
pub fn arbitrary_constant_config(seed: u64) -> ConfigBuilder {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cfg = ConfigBuilder::new();

    let entries = rng.gen_range(1u64..=2_000_000);
    cfg.entries(entries).unwrap();

    let key_size = rng.gen_range(1u32..64);
    let value_size = rng.gen_range(1u32..64);
    cfg.constant_key_size(key_size).unwrap();
    cfg.constant_value_size(value_size).unwrap();

    let alignment = 1u32 << rng.gen_range(0u32..4);
    cfg.value_alignment(alignment).unwrap();

    cfg
}
