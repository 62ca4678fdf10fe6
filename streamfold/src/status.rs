//! Lifecycle status carried by a projection.
//!
//! A projection starts `Ready` and never changes its own status. Transitions
//! are driver policy: a driver typically moves `Ready -> Ok` after the first
//! applied event, `Ok -> Stalled` when nothing matches for a while, and
//! `* -> Broken` on a handler failure it cannot recover from.

use crate::errors::{ProjectionError, ProjectionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four legal projection statuses.
///
/// The numeric codes are stable and safe to persist alongside a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionStatus {
    /// Events are being applied normally.
    Ok,
    /// A failure stopped the projection; it needs intervention.
    Broken,
    /// Events keep arriving but none of them match a handler.
    Stalled,
    /// Freshly created, nothing applied yet.
    #[default]
    Ready,
}

impl ProjectionStatus {
    /// Stable numeric code for persistence.
    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Broken => 1,
            Self::Stalled => 2,
            Self::Ready => 3,
        }
    }

    /// Lowercase name, as used by `Display` and `FromStr`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Broken => "broken",
            Self::Stalled => "stalled",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for ProjectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for ProjectionStatus {
    type Error = ProjectionError;

    fn try_from(code: u8) -> ProjectionResult<Self> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Broken),
            2 => Ok(Self::Stalled),
            3 => Ok(Self::Ready),
            other => Err(ProjectionError::InvalidStatus(other.to_string())),
        }
    }
}

impl FromStr for ProjectionStatus {
    type Err = ProjectionError;

    fn from_str(s: &str) -> ProjectionResult<Self> {
        match s {
            "ok" => Ok(Self::Ok),
            "broken" => Ok(Self::Broken),
            "stalled" => Ok(Self::Stalled),
            "ready" => Ok(Self::Ready),
            other => Err(ProjectionError::InvalidStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [ProjectionStatus; 4] = [
        ProjectionStatus::Ok,
        ProjectionStatus::Broken,
        ProjectionStatus::Stalled,
        ProjectionStatus::Ready,
    ];

    #[test]
    fn codes_match_the_persisted_values() {
        let codes: Vec<u8> = ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3]);
        for status in ALL {
            assert_eq!(ProjectionStatus::try_from(status.code()).unwrap(), status);
            assert_eq!(status.to_string().parse::<ProjectionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn ready_is_the_default() {
        assert_eq!(ProjectionStatus::default(), ProjectionStatus::Ready);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            "Running".parse::<ProjectionStatus>(),
            Err(ProjectionError::InvalidStatus(name)) if name == "Running"
        ));
    }

    proptest! {
        #[test]
        fn codes_above_three_are_rejected(code in 4u8..) {
            prop_assert!(ProjectionStatus::try_from(code).is_err());
        }
    }
}
