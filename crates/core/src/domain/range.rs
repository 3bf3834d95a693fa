//! Integer range mapping
//!
//! Every affine conversion between volume scales (native hardware units and
//! the 0-100 percentage scale, raw steps and decibel steps) goes through
//! [`map_range`]. Results are truncated toward zero, the same way a float is
//! cast to an integer.

use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Errors raised by range arithmetic
///
/// These indicate a misconfigured element or a caller bug, never a user
/// typing a bad number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Source range has no width, so nothing can be scaled out of it
    #[error("degenerate source range [{min}, {max}]")]
    DegenerateRange { min: i64, max: i64 },

    /// Range endpoints are swapped
    #[error("inverted range [{min}, {max}]")]
    InvertedRange { min: i64, max: i64 },

    /// Absolute value lies outside the source range
    #[error("value {value} is outside [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },

    /// Mapped value escaped the target range
    #[error("mapped value {value} escaped target range [{min}, {max}]")]
    PostCondition { value: i64, min: i64, max: i64 },
}

pub type Result<T> = std::result::Result<T, RangeError>;

/// Inclusive integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub min: i64,
    pub max: i64,
}

impl Range {
    /// The 0-100 percentage scale
    pub const PERCENT: Range = Range { min: 0, max: 100 };

    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn span(&self) -> i64 {
        self.max - self.min
    }

    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max.max(self.min))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Map `value` from the `from` range onto the `to` range.
///
/// With `relative == false`, `value` is an absolute position inside `from`
/// and the result is the corresponding position inside `to`.
///
/// With `relative == true`, `value` is a signed delta measured from
/// `from.min`. Its magnitude is mapped and the result is returned as a signed
/// delta measured from `to.min`. A non-zero delta never maps to zero: the
/// smallest result is one unit in the direction of `value`.
pub fn map_range(value: i64, from: Range, to: Range, relative: bool) -> Result<i64> {
    if from.max == from.min {
        return Err(RangeError::DegenerateRange {
            min: from.min,
            max: from.max,
        });
    }
    for range in [from, to] {
        if range.max < range.min {
            return Err(RangeError::InvertedRange {
                min: range.min,
                max: range.max,
            });
        }
    }

    let negative = relative && value < 0;
    let magnitude = if negative {
        value.saturating_abs()
    } else {
        value
    };

    if !relative && !from.contains(magnitude) {
        return Err(RangeError::OutOfRange {
            value,
            min: from.min,
            max: from.max,
        });
    }

    let offset = magnitude as f64 - from.min as f64;
    let scaled = (offset * to.span() as f64 / from.span() as f64).trunc() as i64;
    trace!(value, %from, %to, relative, scaled, "Mapped range");

    if relative {
        let delta = if value != 0 { scaled.max(1) } else { 0 };
        return Ok(if negative { -delta } else { delta });
    }

    let mapped = scaled + to.min;
    if !to.contains(mapped) {
        return Err(RangeError::PostCondition {
            value: mapped,
            min: to.min,
            max: to.max,
        });
    }
    Ok(mapped)
}
