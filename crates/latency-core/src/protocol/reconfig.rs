//! Runtime reconfiguration messages.
//!
//! Wire format: one line of whitespace-separated numbers.
//!
//! ```text
//! click_min click_max move_min move_max [mu sigma]
//! ```
//!
//! The four delays are non-negative whole milliseconds; `mu` and `sigma` are
//! floats.  Exactly four or six values are accepted.  Anything else is
//! malformed and must leave the active configuration untouched.
//!
//! ```rust
//! use latency_core::protocol::reconfig::ReconfigMessage;
//!
//! let msg: ReconfigMessage = "100 200 5 10".parse().unwrap();
//! assert_eq!(msg.click.max_ms, 200);
//! assert!(msg.normal.is_none());
//! ```

use std::str::FromStr;

use thiserror::Error;

use crate::domain::config::{DelayConfig, DelayRange};

/// Why a reconfiguration line was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ReconfigError {
    /// The line did not contain four or six values.
    #[error("expected 4 or 6 values, got {0}")]
    WrongArity(usize),

    /// A delay token is not a non-negative integer.
    #[error("invalid delay value {0:?}: expected a non-negative integer")]
    InvalidDelay(String),

    /// A `mu`/`sigma` token is not a finite number.
    #[error("invalid distribution parameter {0:?}: expected a finite number")]
    InvalidParameter(String),
}

/// Normal distribution parameters carried by a six-value message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalParams {
    pub mu: f64,
    pub sigma: f64,
}

/// A parsed reconfiguration request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconfigMessage {
    pub click: DelayRange,
    pub movement: DelayRange,
    pub normal: Option<NormalParams>,
}

impl ReconfigMessage {
    /// Produces the configuration that results from applying this message to `current`.
    ///
    /// The distribution kind is kept.  `mu`/`sigma` are kept unless the message
    /// carries new ones.  The result is not normalized; publishing does that.
    pub fn apply_to(&self, current: &DelayConfig) -> DelayConfig {
        let (mu, sigma) = match self.normal {
            Some(p) => (p.mu, p.sigma),
            None => (current.mu, current.sigma),
        };
        DelayConfig {
            click: self.click,
            movement: self.movement,
            distribution: current.distribution,
            mu,
            sigma,
        }
    }
}

impl FromStr for ReconfigMessage {
    type Err = ReconfigError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 4 && tokens.len() != 6 {
            return Err(ReconfigError::WrongArity(tokens.len()));
        }

        let delay = |token: &str| {
            token
                .parse::<u64>()
                .map_err(|_| ReconfigError::InvalidDelay(token.to_string()))
        };
        let param = |token: &str| match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ReconfigError::InvalidParameter(token.to_string())),
        };

        let click = DelayRange::new(delay(tokens[0])?, delay(tokens[1])?);
        let movement = DelayRange::new(delay(tokens[2])?, delay(tokens[3])?);
        let normal = if tokens.len() == 6 {
            Some(NormalParams {
                mu: param(tokens[4])?,
                sigma: param(tokens[5])?,
            })
        } else {
            None
        };

        Ok(Self {
            click,
            movement,
            normal,
        })
    }
}

/// Parses one reconfiguration line.
///
/// # Errors
///
/// Returns [`ReconfigError`] for any malformed line.
pub fn parse_message(line: &str) -> Result<ReconfigMessage, ReconfigError> {
    line.parse()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
