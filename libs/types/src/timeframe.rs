//! Candle timeframes and window alignment
//!
//! Every timeframe has a fixed length in milliseconds. Window starts are
//! computed as `floor(ts / len) * len`, so windows are aligned to the Unix
//! epoch for all supported timeframes.

use crate::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Supported candle timeframes, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
}

impl Timeframe {
    /// All supported timeframes ordered finest to coarsest
    pub const ALL: [Timeframe; 12] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H8,
        Timeframe::H12,
        Timeframe::D1,
    ];

    /// The granularity of the live venue stream
    pub const FINEST: Timeframe = Timeframe::M1;

    /// Window length in milliseconds
    pub const fn as_millis(self) -> i64 {
        match self {
            Timeframe::M1 => MINUTE_MS,
            Timeframe::M3 => 3 * MINUTE_MS,
            Timeframe::M5 => 5 * MINUTE_MS,
            Timeframe::M15 => 15 * MINUTE_MS,
            Timeframe::M30 => 30 * MINUTE_MS,
            Timeframe::H1 => HOUR_MS,
            Timeframe::H2 => 2 * HOUR_MS,
            Timeframe::H4 => 4 * HOUR_MS,
            Timeframe::H6 => 6 * HOUR_MS,
            Timeframe::H8 => 8 * HOUR_MS,
            Timeframe::H12 => 12 * HOUR_MS,
            Timeframe::D1 => 24 * HOUR_MS,
        }
    }

    /// Canonical label used in config files and venue requests
    pub const fn label(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
        }
    }

    /// Start of the window containing `timestamp_ms`
    pub fn bucket_start(self, timestamp_ms: i64) -> i64 {
        let len = self.as_millis();
        timestamp_ms.div_euclid(len) * len
    }

    pub fn is_finest(self) -> bool {
        self == Self::FINEST
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| TypeError::UnknownTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label().to_string()
    }
}
