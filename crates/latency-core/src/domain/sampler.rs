//! Delay sampling.
//!
//! [`sample`] draws one delay from the configured distribution and always
//! returns a value inside the requested range.  The random source is passed
//! in explicitly so tests can use a seeded generator.
//!
//! # Truncated normal
//!
//! For [`Distribution::Normal`] values outside `[min, max]` are rejected and
//! redrawn.  When `mu`/`sigma` put almost no probability mass inside the
//! range, unbounded rejection would spin forever, so the number of redraws is
//! capped at [`MAX_NORMAL_RETRIES`] and the final draw is clamped instead.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution as _, Normal};

use super::config::{DelayConfig, DelayRange, Distribution};
use super::event::EventKind;

/// Redraws allowed before a normal sample is clamped into range.
pub const MAX_NORMAL_RETRIES: u32 = 64;

/// Draws a delay in `[range.min_ms, range.max_ms]`.
///
/// A constant range (`min == max`) returns `min` for every distribution.
pub fn sample<R: Rng + ?Sized>(
    distribution: Distribution,
    range: DelayRange,
    mu: f64,
    sigma: f64,
    rng: &mut R,
) -> Duration {
    let (range, _) = range.normalized();
    if range.is_constant() {
        return Duration::from_millis(range.min_ms);
    }

    let ms = match distribution {
        Distribution::Uniform => rng.gen_range(range.min_ms..=range.max_ms),
        Distribution::Normal => sample_truncated_normal(range, mu, sigma, rng),
    };
    Duration::from_millis(ms)
}

/// Draws the delay for an event of `kind` under `config`.
///
/// Normal parameters come from [`DelayConfig::normal_params_for`], so motion
/// is drawn around its own range rather than the click mean.
pub fn sample_for<R: Rng + ?Sized>(config: &DelayConfig, kind: EventKind, rng: &mut R) -> Duration {
    let (mu, sigma) = config.normal_params_for(kind);
    sample(config.distribution, config.range_for(kind), mu, sigma, rng)
}

fn sample_truncated_normal<R: Rng + ?Sized>(range: DelayRange, mu: f64, sigma: f64, rng: &mut R) -> u64 {
    let lo = range.min_ms as f64;
    let hi = range.max_ms as f64;
    let mu = if mu.is_finite() { mu } else { range.midpoint() };

    let normal = match Normal::new(mu, sigma) {
        Ok(normal) if sigma > 0.0 && sigma.is_finite() => normal,
        // Zero, negative or non-finite sigma: the distribution collapses onto mu.
        _ => return mu.round().clamp(lo, hi) as u64,
    };

    let mut draw = mu;
    for _ in 0..MAX_NORMAL_RETRIES {
        draw = normal.sample(rng).round();
        if draw >= lo && draw <= hi {
            return draw as u64;
        }
    }
    draw.clamp(lo, hi) as u64
}

// ── Tests ─────────────────────────────────────────────────────────────────────
