//! Diagnostic options and the policy for events nobody handles.

use crate::errors::{ProjectionError, ProjectionResult};
use serde::{Deserialize, Serialize};

/// Bitmask of diagnostic options.
///
/// Options only ever change what a projection reports, never what it computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ProjectionOptions(u32);

impl ProjectionOptions {
    /// Emit one trace line per applied event.
    pub const VERBOSE: u32 = 1;

    const KNOWN: u32 = Self::VERBOSE;

    /// No options set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Only [`ProjectionOptions::VERBOSE`] set.
    pub const fn verbose() -> Self {
        Self(Self::VERBOSE)
    }

    /// Parses a raw bitmask, rejecting bits that name no option.
    pub const fn from_bits(bits: u32) -> ProjectionResult<Self> {
        let unknown = bits & !Self::KNOWN;
        if unknown != 0 {
            return Err(ProjectionError::InvalidOptions(unknown));
        }
        Ok(Self(bits))
    }

    /// Returns the raw bitmask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether verbose tracing is enabled.
    pub const fn is_verbose(self) -> bool {
        self.0 & Self::VERBOSE != 0
    }
}

impl TryFrom<u32> for ProjectionOptions {
    type Error = ProjectionError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<ProjectionOptions> for u32 {
    fn from(options: ProjectionOptions) -> Self {
        options.bits()
    }
}

/// What [`Projection::apply`](crate::projection::Projection::apply) does with
/// an event whose type has no handler.
///
/// In both modes state and position are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledPolicy {
    /// Report `ApplyOutcome::Skipped` and carry on.
    #[default]
    Skip,
    /// Fail with `ProjectionError::UnhandledEventType`.
    Strict,
}
