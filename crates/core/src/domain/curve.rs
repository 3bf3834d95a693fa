//! Perceptual volume curve
//!
//! Same mapping alsamixer uses for its bar graphs: small decibel spans are
//! treated linearly, larger ones follow `10^((dB - max) / 60 dB)` so that the
//! middle of the scale sounds like half the loudness. Decibel values are in
//! hundredths of a decibel.

use crate::domain::mixer::RoundDirection;
use crate::domain::range::Range;

/// Decibel spans up to this width (24 dB) are mapped linearly
pub const MAX_LINEAR_DB_SPAN: i64 = 24 * 100;

/// ALSA's "minimum means mute" sentinel for decibel ranges
pub const DB_GAIN_MUTE: i64 = -9_999_999;

pub fn uses_linear_scale(db: Range) -> bool {
    db.span() <= MAX_LINEAR_DB_SPAN
}

pub fn normalize_linear(value: i64, range: Range) -> f64 {
    (value - range.min) as f64 / range.span() as f64
}

pub fn denormalize_linear(volume: f64, range: Range, direction: RoundDirection) -> i64 {
    direction.apply(volume * range.span() as f64) + range.min
}

fn exp10(value: f64) -> f64 {
    10f64.powf(value)
}

fn min_norm(db: Range) -> f64 {
    exp10((db.min - db.max) as f64 / 6000.0)
}

pub fn normalize_decibels(value: i64, db: Range) -> f64 {
    if uses_linear_scale(db) {
        return normalize_linear(value, db);
    }

    let normalized = exp10((value - db.max) as f64 / 6000.0);
    if db.min == DB_GAIN_MUTE {
        return normalized;
    }
    let floor = min_norm(db);
    (normalized - floor) / (1.0 - floor)
}

/// Inverse of [`normalize_decibels`], clamped to the decibel range
pub fn denormalize_decibels(volume: f64, db: Range, direction: RoundDirection) -> i64 {
    if uses_linear_scale(db) {
        return denormalize_linear(volume, db, direction);
    }

    let volume = if db.min == DB_GAIN_MUTE {
        volume
    } else {
        let floor = min_norm(db);
        volume * (1.0 - floor) + floor
    };
    let value = direction
        .apply(6000.0 * volume.log10())
        .saturating_add(db.max);
    db.clamp(value)
}
