// =============================================================================
// Shared types used across the signal pipeline
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// An exchange symbol, e.g. `BTCUSDT`. Always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Construct a `Symbol`, upper-casing the input. An empty or blank input
    /// simply yields an empty symbol -- callers that care (the universe
    /// loader) reject it explicitly rather than this type enforcing it.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Directional bias of a candidate signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Long,
    Short,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// The rule family that produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Reversal,
    Trend,
    Divergence,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reversal => write!(f, "REVERSAL"),
            Self::Trend => write!(f, "TREND"),
            Self::Divergence => write!(f, "DIVERGENCE"),
        }
    }
}

/// Qualitative momentum classification used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomentumClass {
    Exhaustion,
    Expansion,
}

impl fmt::Display for MomentumClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhaustion => write!(f, "Exhaustion"),
            Self::Expansion => write!(f, "Expansion"),
        }
    }
}

/// Which side the market is labelled as crowded on, derived from funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingBiasLabel {
    LongOvercrowded,
    ShortOvercrowded,
}

impl fmt::Display for FundingBiasLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LongOvercrowded => write!(f, "LONG Overcrowded"),
            Self::ShortOvercrowded => write!(f, "SHORT Overcrowded"),
        }
    }
}

/// Display-only up/down movement percentages derived from momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub up_pct: f64,
    pub down_pct: f64,
}
