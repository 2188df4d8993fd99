//! Delay configuration and its lock-free, atomically replaceable snapshot.
//!
//! A [`DelayConfig`] is always replaced wholesale, never edited field by
//! field.  [`ConfigStore`] wraps the current snapshot in an
//! [`arc_swap::ArcSwap`] so that:
//!
//! - the submission path reads the latest snapshot without taking a lock, and
//! - a reader can never observe a `min` from one snapshot paired with a `max`
//!   from another.
//!
//! # Normalization
//!
//! Out-of-range configurations are tolerated rather than rejected:
//!
//! | Problem                         | Fix                              |
//! |---------------------------------|----------------------------------|
//! | `max < min`                     | `max` is raised to `min`         |
//! | `mu` outside the click range    | `mu` is clamped into it          |
//! | `mu` not finite                 | `mu` = click-range midpoint      |
//! | `sigma` negative or not finite  | `sigma` = `mu / 20`              |
//!
//! `mu` and `sigma` are expressed against the click range.  Motion reuses them
//! when `mu` falls inside the movement range; otherwise
//! [`DelayConfig::normal_params_for`] recentres on the movement midpoint and
//! scales `sigma` by the ratio of the two range widths.

use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::event::EventKind;

/// An inclusive range of delays in whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// A range that always yields `ms`.
    pub fn constant(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    pub fn is_constant(&self) -> bool {
        self.min_ms == self.max_ms
    }

    pub fn contains(&self, ms: u64) -> bool {
        (self.min_ms..=self.max_ms).contains(&ms)
    }

    pub fn midpoint(&self) -> f64 {
        (self.min_ms as f64 + self.max_ms as f64) / 2.0
    }

    /// Returns the range with `max` raised to `min` if needed, and whether it changed.
    pub fn normalized(self) -> (Self, bool) {
        if self.max_ms < self.min_ms {
            (Self::constant(self.min_ms), true)
        } else {
            (self, false)
        }
    }
}

impl std::fmt::Display for DelayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}ms", self.min_ms, self.max_ms)
    }
}

/// Shape of the delay distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Every whole millisecond in the range is equally likely.
    #[default]
    Uniform,
    /// Normal around `mu` with standard deviation `sigma`, truncated to the range.
    Normal,
}

/// Error returned when a distribution name is not recognized.
#[derive(Debug, Error, PartialEq)]
#[error("unknown distribution {0:?}; expected uniform (l) or normal (n)")]
pub struct UnknownDistribution(pub String);

impl FromStr for Distribution {
    type Err = UnknownDistribution;

    /// Accepts the long names as well as the single-letter `l`/`n` forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "linear" | "u" | "uniform" => Ok(Distribution::Uniform),
            "n" | "normal" | "gaussian" => Ok(Distribution::Normal),
            _ => Err(UnknownDistribution(s.to_string())),
        }
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Distribution::Uniform => f.write_str("uniform"),
            Distribution::Normal => f.write_str("normal"),
        }
    }
}

/// One complete, self-consistent delay configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DelayConfig {
    /// Delay range for buttons and keys.
    pub click: DelayRange,
    /// Delay range for pointer motion.
    pub movement: DelayRange,
    pub distribution: Distribution,
    /// Mean of the normal distribution (ms).  Ignored for `Uniform`.
    pub mu: f64,
    /// Standard deviation of the normal distribution (ms).  Ignored for `Uniform`.
    pub sigma: f64,
}

impl DelayConfig {
    /// Builds a configuration with `mu` at the click midpoint and `sigma = mu / 20`.
    pub fn with_defaults(click: DelayRange, movement: DelayRange, distribution: Distribution) -> Self {
        let (click, _) = click.normalized();
        let mu = click.midpoint();
        Self {
            click,
            movement,
            distribution,
            mu,
            sigma: mu / 20.0,
        }
    }

    /// Returns the delay range that applies to `kind`.
    pub fn range_for(&self, kind: EventKind) -> DelayRange {
        if kind.uses_click_delay() {
            self.click
        } else {
            self.movement
        }
    }

    /// The `(mu, sigma)` pair used for normal sampling of `kind`.
    pub fn normal_params_for(&self, kind: EventKind) -> (f64, f64) {
        if kind.uses_click_delay() {
            return (self.mu, self.sigma);
        }
        let movement = self.movement;
        if self.mu >= movement.min_ms as f64 && self.mu <= movement.max_ms as f64 {
            return (self.mu, self.sigma);
        }

        let mu = movement.midpoint();
        let click_width = self.click.max_ms.saturating_sub(self.click.min_ms) as f64;
        let move_width = movement.max_ms.saturating_sub(movement.min_ms) as f64;
        let sigma = if click_width > 0.0 {
            self.sigma * move_width / click_width
        } else {
            mu / 20.0
        };
        (mu, sigma)
    }

    /// Returns a copy satisfying every invariant, plus whether anything changed.
    pub fn normalized(&self) -> (Self, bool) {
        let (click, click_fixed) = self.click.normalized();
        let (movement, movement_fixed) = self.movement.normalized();

        let mut mu = self.mu;
        let mut mu_fixed = false;
        if !mu.is_finite() {
            mu = click.midpoint();
            mu_fixed = true;
        } else if mu < click.min_ms as f64 || mu > click.max_ms as f64 {
            mu = mu.clamp(click.min_ms as f64, click.max_ms as f64);
            mu_fixed = true;
        }

        let mut sigma = self.sigma;
        let mut sigma_fixed = false;
        if !sigma.is_finite() || sigma < 0.0 {
            sigma = mu / 20.0;
            sigma_fixed = true;
        }

        let normalized = Self {
            click,
            movement,
            distribution: self.distribution,
            mu,
            sigma,
        };
        (
            normalized,
            click_fixed || movement_fixed || mu_fixed || sigma_fixed,
        )
    }
}

impl std::fmt::Display for DelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "click {} move {} {}",
            self.click, self.movement, self.distribution
        )?;
        if self.distribution == Distribution::Normal {
            write!(f, " (mu {:.1}, sigma {:.1})", self.mu, self.sigma)?;
        }
        Ok(())
    }
}

/// Shared holder of the active [`DelayConfig`] snapshot.
///
/// `current()` never blocks and `publish()` swaps the whole snapshot in one
/// atomic pointer store.
#[derive(Debug)]
pub struct ConfigStore {
    active: ArcSwap<DelayConfig>,
}

impl ConfigStore {
    /// Creates a store holding the normalized form of `initial`.
    pub fn new(initial: DelayConfig) -> Self {
        let (config, adjusted) = initial.normalized();
        if adjusted {
            warn!("initial delay configuration out of range, normalized to {config}");
        }
        Self {
            active: ArcSwap::from_pointee(config),
        }
    }

    /// Returns the latest published snapshot.
    pub fn current(&self) -> Arc<DelayConfig> {
        self.active.load_full()
    }

    /// Normalizes `config`, makes it the active snapshot and returns what was stored.
    pub fn publish(&self, config: DelayConfig) -> DelayConfig {
        let (config, adjusted) = config.normalized();
        if adjusted {
            warn!("delay configuration out of range, normalized to {config}");
        }
        self.active.store(Arc::new(config));
        config
    }

    /// Derives the next snapshot from the current one and publishes it atomically.
    ///
    /// `f` may run more than once if another writer publishes concurrently; the
    /// stored result is always derived from the snapshot it replaced.
    pub fn update<F>(&self, mut f: F) -> DelayConfig
    where
        F: FnMut(&DelayConfig) -> DelayConfig,
    {
        let mut stored = DelayConfig::default();
        let mut adjusted = false;
        self.active.rcu(|current| {
            let (next, fixed) = f(current).normalized();
            stored = next;
            adjusted = fixed;
            Arc::new(next)
        });
        if adjusted {
            warn!("delay configuration out of range, normalized to {stored}");
        }
        stored
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DelayConfig::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
