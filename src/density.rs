use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Crowd density tier, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DensityStatus {
    Safe,
    Moderate,
    Overcrowded,
}

impl DensityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DensityStatus::Safe => "Safe",
            DensityStatus::Moderate => "Moderate",
            DensityStatus::Overcrowded => "Overcrowded",
        }
    }

    /// Dashboard card color
    pub fn color(&self) -> &'static str {
        match self {
            DensityStatus::Safe => "#4CAF50",
            DensityStatus::Moderate => "#FF9800",
            DensityStatus::Overcrowded => "#F44336",
        }
    }
}

impl fmt::Display for DensityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("moderate threshold ({moderate}) must be below overcrowded threshold ({overcrowded})")]
pub struct ThresholdError {
    pub moderate: usize,
    pub overcrowded: usize,
}

/// Two-tier count thresholds.
///
/// * `count < moderate` is [`DensityStatus::Safe`]
/// * `moderate <= count < overcrowded` is [`DensityStatus::Moderate`]
/// * `count >= overcrowded` is [`DensityStatus::Overcrowded`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct DensityThresholds {
    moderate: usize,
    overcrowded: usize,
}

#[derive(Deserialize)]
struct RawThresholds {
    moderate: usize,
    overcrowded: usize,
}

impl TryFrom<RawThresholds> for DensityThresholds {
    type Error = ThresholdError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        DensityThresholds::new(raw.moderate, raw.overcrowded)
    }
}

impl DensityThresholds {
    /// Default live overlay tiers
    pub const DISPLAY_DEFAULT: DensityThresholds = DensityThresholds {
        moderate: 8,
        overcrowded: 11,
    };

    /// Default dashboard tiers
    pub const DASHBOARD_DEFAULT: DensityThresholds = DensityThresholds {
        moderate: 8,
        overcrowded: 10,
    };

    pub fn new(moderate: usize, overcrowded: usize) -> Result<Self, ThresholdError> {
        if moderate >= overcrowded {
            return Err(ThresholdError {
                moderate,
                overcrowded,
            });
        }
        Ok(Self {
            moderate,
            overcrowded,
        })
    }

    pub fn moderate(&self) -> usize {
        self.moderate
    }

    pub fn overcrowded(&self) -> usize {
        self.overcrowded
    }

    pub fn classify(&self, count: usize) -> DensityStatus {
        if count < self.moderate {
            DensityStatus::Safe
        } else if count < self.overcrowded {
            DensityStatus::Moderate
        } else {
            DensityStatus::Overcrowded
        }
    }
}
