//! Risk classification and time primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Four-tier risk classification for tool invocations.
///
/// Ordered from least to most dangerous. Use [`RiskLevel::rank`] for the
/// numeric rank; `Ord` is implemented over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only or trivially reversible operations.
    Low,
    /// Meaningful side effects, generally recoverable.
    Medium,
    /// Significant side effects, hard to reverse.
    High,
    /// Destructive or irreversible operations.
    Critical,
}

impl RiskLevel {
    /// Numeric rank for ordering comparisons.
    ///
    /// `Low = 0`, `Medium = 1`, `High = 2`, `Critical = 3`.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Base risk score contributed by this level.
    #[must_use]
    pub fn base_score(self) -> u8 {
        match self {
            Self::Low => 25,
            Self::Medium => 50,
            Self::High => 75,
            Self::Critical => 100,
        }
    }

    /// Re-derive a level from a summed risk score.
    ///
    /// Thresholds are inclusive lower bounds: `>= 80` Critical, `>= 60`
    /// High, `>= 40` Medium, otherwise Low.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Critical,
            60..=79 => Self::High,
            40..=59 => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Whether an action at this level requires explicit human approval
    /// in interactive contexts.
    #[must_use]
    pub fn requires_approval(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl PartialOrd for RiskLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// A UTC timestamp.
///
/// Thin wrapper around [`chrono::DateTime<Utc>`] so the rest of the
/// workspace doesn't repeat chrono plumbing for "now", expiry arithmetic,
/// and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Add a duration, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        let delta = chrono::Duration::from_std(duration).ok()?;
        self.0.checked_add_signed(delta).map(Self)
    }

    /// Whether this timestamp lies in the future.
    #[must_use]
    pub fn is_future(self) -> bool {
        self.0 > Utc::now()
    }

    /// Whether this timestamp has already passed.
    #[must_use]
    pub fn has_elapsed(self) -> bool {
        self.0 <= Utc::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
