//! Tunables for the size-targeting loop and caller-side target parsing.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::ConfigError;

pub const KILOBYTE: u64 = 1024;
pub const MEGABYTE: u64 = 1024 * KILOBYTE;

/// Control parameters for [`crate::reduce`].
///
/// Passed by value into every run so that concurrent runs never share state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceConfig {
    /// JPEG quality used on the first attempt.
    pub initial_quality: u8,
    /// Amount the quality drops after each attempt that misses the target.
    pub step: u8,
    /// Quality floor; attempts never go below it.
    pub min_quality: u8,
    /// Upper bound on parse/recompress/serialize cycles.
    pub max_iterations: u32,
    /// End the run once an attempt at `min_quality` has been measured
    /// instead of repeating identical attempts at the floor.
    pub stop_at_floor: bool,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            initial_quality: 50,
            step: 5,
            min_quality: 10,
            max_iterations: 10,
            stop_at_floor: false,
        }
    }
}

impl ReduceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_quality == 0 {
            return Err(ConfigError::InvalidQuality(
                "minimum quality must be at least 1".to_string(),
            ));
        }
        if self.initial_quality > 100 {
            return Err(ConfigError::InvalidQuality(format!(
                "initial quality {} exceeds 100",
                self.initial_quality
            )));
        }
        if self.min_quality > self.initial_quality {
            return Err(ConfigError::InvalidQuality(format!(
                "minimum quality {} is above initial quality {}",
                self.min_quality, self.initial_quality
            )));
        }
        if self.step == 0 {
            return Err(ConfigError::InvalidStep);
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        Ok(())
    }

    /// Quality for the attempt after one at `quality`, clamped to the floor.
    pub fn next_quality(&self, quality: u8) -> u8 {
        quality.saturating_sub(self.step).max(self.min_quality)
    }
}

/// A positive target size in bytes, parsed from user input such as
/// `500`, `500kb` or `2M`. A bare number means kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TargetSize(u64);

impl TargetSize {
    pub fn from_bytes(bytes: u64) -> Result<Self, ConfigError> {
        if bytes == 0 {
            return Err(ConfigError::InvalidTarget(
                "target must be greater than zero".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn from_kilobytes(kb: u64) -> Result<Self, ConfigError> {
        let bytes = kb
            .checked_mul(KILOBYTE)
            .ok_or_else(|| ConfigError::InvalidTarget(format!("{kb} KB is too large")))?;
        Self::from_bytes(bytes)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for TargetSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"(?i)^\s*(\d+)\s*(b|k|kb|kib|m|mb|mib)?\s*$")
            .map_err(|e| ConfigError::InvalidTarget(e.to_string()))?;
        let caps = re
            .captures(s)
            .ok_or_else(|| ConfigError::InvalidTarget(format!("'{s}' is not a size")))?;

        let value: u64 = caps[1]
            .parse()
            .map_err(|_| ConfigError::InvalidTarget(format!("'{s}' is out of range")))?;
        let unit = caps
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let multiplier = match unit.as_str() {
            "b" => 1,
            "m" | "mb" | "mib" => MEGABYTE,
            _ => KILOBYTE,
        };

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| ConfigError::InvalidTarget(format!("'{s}' is out of range")))?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} KB", self.0 as f64 / KILOBYTE as f64)
    }
}
