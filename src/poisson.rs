/*
 * Created on Thu Feb 08 2024
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

//! Entries land in segments by hash, so the load of the fullest segment is,
//! to a very good approximation, the upper tail of a Poisson distribution
//! with mean equal to the average per-segment load. Planning every segment
//! to comfortably hold its 99.999th-percentile share -- rather than its
//! average share -- is what makes tiering (overflowing into a second
//! segment) a rare escape hatch instead of routine behaviour.
//!
//! Below a mean of about 745 the Poisson PMF can be summed directly in
//! `f64` without underflowing; above that we fall back to a normal
//! approximation with a continuity correction, refined by a short local
//! search. 745 is where `exp(-mean)` starts running into the edge of
//! `f64`'s subnormal range, which is the practical limit of direct
//! summation, not a property of the distribution itself.

/// Means at or below this threshold are summed directly; above it, the
/// normal approximation takes over.
const DIRECT_SUMMATION_MEAN_LIMIT: f64 = 745.0;

/// No mean below this cumulative-probability-vs-value gap is considered
/// solvable; beyond it we report the distribution as infeasible rather than
/// spin forever chasing precision noise.
const INFEASIBLE_THRESHOLD: f64 = 1e-18;

/// A hard cap on how far direct summation will walk before giving up --
/// this only matters for degenerate inputs (an absurdly high percentile on
/// an absurdly small mean); real callers never get close to it.
const MAX_DIRECT_SUMMATION_STEPS: u64 = 1 << 32;

pub struct PoissonSolver;

impl PoissonSolver {
    /// Smallest integer `k` with `P[X <= k] >= p` for `X ~ Poisson(mean)`.
    /// Returns `None` if no such `k` can be found below [`INFEASIBLE_THRESHOLD`]
    /// of the tail -- callers should treat that as "choose more segments".
    pub fn inverse_cdf(mean: f64, p: f64) -> Option<u64> {
        debug_assert!(mean >= 0.0);
        debug_assert!((0.0..=1.0).contains(&p));
        if mean <= DIRECT_SUMMATION_MEAN_LIMIT {
            direct_inverse_cdf(mean, p)
        } else {
            normal_inverse_cdf_with_correction(mean, p)
        }
    }

    /// Largest mean `mu` such that `P[X <= k] >= p` for `X ~ Poisson(mu)`,
    /// accurate to within `precision`. The CDF at a fixed `k` is monotonic
    /// non-increasing in `mu`, so this is a straightforward bisection.
    pub fn mean_by_cumulative_probability_and_value(
        p: f64,
        k: u64,
        precision: f64,
    ) -> Option<f64> {
        debug_assert!((0.0..=1.0).contains(&p));
        if k == 0 {
            // P[X <= 0] = exp(-mu) >= p  <=>  mu <= -ln(p)
            if p <= 0.0 {
                return None;
            }
            return Some(-p.ln());
        }

        let mut lo = 0.0f64;
        let mut hi = (k as f64 + 1.0).max(1.0);
        let mut doublings = 0;
        while cdf_at(hi, k) >= p {
            hi *= 2.0;
            doublings += 1;
            if doublings > 2048 || !hi.is_finite() {
                return None;
            }
        }

        while hi - lo > precision.max(f64::EPSILON) {
            let mid = lo + (hi - lo) / 2.0;
            if cdf_at(mid, k) >= p {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Some(lo)
    }
}

/// `P[X <= k]` for `X ~ Poisson(mean)`, dispatching on the same threshold as
/// [`PoissonSolver::inverse_cdf`].
fn cdf_at(mean: f64, k: u64) -> f64 {
    if mean <= DIRECT_SUMMATION_MEAN_LIMIT {
        direct_cdf(mean, k)
    } else {
        normal_cdf_continuity_corrected(mean, k)
    }
}

fn direct_cdf(mean: f64, k: u64) -> f64 {
    let mut cumulative = (-mean).exp();
    let mut term = cumulative;
    let mut i = 0u64;
    while i < k {
        i += 1;
        term *= mean / i as f64;
        cumulative += term;
        if term == 0.0 {
            break;
        }
    }
    cumulative.min(1.0)
}

fn direct_inverse_cdf(mean: f64, p: f64) -> Option<u64> {
    let mut cumulative = (-mean).exp();
    let mut term = cumulative;
    let mut k = 0u64;
    loop {
        if cumulative >= p {
            return Some(k);
        }
        if k >= MAX_DIRECT_SUMMATION_STEPS {
            return None;
        }
        k += 1;
        term *= mean / k as f64;
        cumulative += term;
        if term < f64::MIN_POSITIVE {
            // Remaining mass is negligible. If we still haven't reached p,
            // the gap is either rounding noise (finish by reporting k) or a
            // genuinely infeasible target.
            let remaining = 1.0 - cumulative;
            if remaining.abs() < INFEASIBLE_THRESHOLD {
                return Some(k);
            }
            return None;
        }
    }
}

fn normal_cdf_continuity_corrected(mean: f64, k: u64) -> f64 {
    let z = (k as f64 + 0.5 - mean) / mean.sqrt();
    standard_normal_cdf(z)
}

fn normal_inverse_cdf_with_correction(mean: f64, p: f64) -> Option<u64> {
    let z = inverse_standard_normal_cdf(p);
    let approx = mean + z * mean.sqrt();
    let mut k = approx.max(0.0).round() as u64;

    // Walk down while the *previous* integer already clears p...
    while k > 0 && normal_cdf_continuity_corrected(mean, k - 1) >= p {
        k -= 1;
    }
    // ...then up while the current one doesn't.
    let mut steps = 0;
    while normal_cdf_continuity_corrected(mean, k) < p {
        k += 1;
        steps += 1;
        if steps > 1_000_000 {
            return None;
        }
    }
    Some(k)
}

/// Standard normal CDF via the complementary error function (Abramowitz &
/// Stegun 7.1.26 approximation of `erf`), accurate to about `1.5e-7`.
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

fn erfc(x: f64) -> f64 {
    // Abramowitz & Stegun 7.1.26, applied to |x| then reflected.
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    1.0 - sign * y
}

/// Inverse standard normal CDF via Acklam's rational approximation, good to
/// about `1.15e-9` relative error across `(0, 1)`.
fn inverse_standard_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW: f64 = 0.02425;
    let p_high = 1.0 - P_LOW;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_normal_cdf_matches_known_quantiles() {
        assert!((inverse_standard_normal_cdf(0.5) - 0.0).abs() < 1e-9);
        assert!((inverse_standard_normal_cdf(0.975) - 1.959964).abs() < 1e-4);
        assert!((inverse_standard_normal_cdf(0.99999) - 4.264891).abs() < 1e-3);
    }

    #[test]
    fn direct_cdf_sums_to_one_eventually() {
        assert!(direct_cdf(5.0, 10_000) > 0.999_999);
    }

    #[test]
    fn inverse_cdf_is_monotonic_in_p() {
        let mean = 1000.0;
        let k_low = PoissonSolver::inverse_cdf(mean, 0.9).unwrap();
        let k_high = PoissonSolver::inverse_cdf(mean, 0.99999).unwrap();
        assert!(k_high >= k_low);
    }

    #[test]
    fn inverse_cdf_covers_percentile() {
        let mean = 128.0;
        let p = 0.99999;
        let k = PoissonSolver::inverse_cdf(mean, p).unwrap();
        assert!(direct_cdf(mean, k) >= p - 1e-9);
        if k > 0 {
            assert!(direct_cdf(mean, k - 1) < p);
        }
    }

    #[test]
    fn inverse_cdf_handles_large_mean_via_normal_approx() {
        let mean = 50_000.0;
        let k = PoissonSolver::inverse_cdf(mean, 0.99999).unwrap();
        assert!(k > mean as u64);
    }

    #[test]
    fn mean_solver_roundtrips_against_inverse_cdf() {
        let p = 0.99999;
        let k = 200u64;
        let mu = PoissonSolver::mean_by_cumulative_probability_and_value(p, k, 1e-6).unwrap();
        // The found mean should make k (just barely) the percentile point.
        assert!(direct_cdf(mu, k) >= p - 1e-6);
        assert!(direct_cdf(mu, k + 1) >= p - 1e-6);
    }

    #[test]
    fn mean_solver_zero_k_is_closed_form() {
        let mu = PoissonSolver::mean_by_cumulative_probability_and_value(0.5, 0, 1e-9).unwrap();
        assert!((mu - std::f64::consts::LN_2).abs() < 1e-9);
    }
}
