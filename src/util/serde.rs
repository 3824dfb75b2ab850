//! Serializable identifiers and enumerations shared across the crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a queued generation job.
pub type JobId = uuid::Uuid;

/// Identifier of a ledger entry.
pub type EntryId = uuid::Uuid;

/// Identifier of an end user account.
pub type UserId = String;

/// Credit amounts. Signed so that ledger entries can carry debits as negatives.
pub type Credits = i64;

/// User classification controlling queue priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free accounts.
    Free,
    /// Lowest paid plan.
    PaidLow,
    /// Middle paid plan.
    PaidMid,
    /// Highest paid plan.
    PaidHigh,
}

impl Tier {
    /// All tiers, highest plan first.
    pub const ALL: [Self; 4] = [Self::PaidHigh, Self::PaidMid, Self::PaidLow, Self::Free];

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::PaidLow => "paid_low",
            Self::PaidMid => "paid_mid",
            Self::PaidHigh => "paid_high",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of content a job asks the generation backend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    /// Text completion.
    Text,
    /// Still image.
    Image,
    /// Video clip.
    Video,
}

impl GenerationType {
    /// All generation types.
    pub const ALL: [Self; 3] = [Self::Text, Self::Image, Self::Video];

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for GenerationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a generation type tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown generation type `{0}`")]
pub struct UnknownGenerationType(pub String);

impl FromStr for GenerationType {
    type Err = UnknownGenerationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            _ => Err(UnknownGenerationType(s.to_string())),
        }
    }
}
