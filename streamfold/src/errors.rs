//! Error types for streamfold.
//!
//! Every failure surfaces to whoever called [`Projection::apply`] or
//! [`Projection::run`]; the projection itself never logs or swallows them.
//!
//! # Error Categories
//!
//! - **UnhandledEventType**: an event arrived with no registered handler while
//!   the projection runs under [`UnhandledPolicy::Strict`]
//! - **HandlerFailed**: a handler returned an error; state and position are
//!   left exactly as they were before the call
//! - **PositionOverflow**: the position is already `u64::MAX`; nothing changes
//! - **InvalidStatus / InvalidOptions**: rejected values at a construction or
//!   assignment boundary
//! - **NotFanOut / Broken**: driver-side misuse of a projection
//!
//! # Example Usage
//!
//! ```rust,ignore
//! match projection.apply(&event) {
//!     Ok(ApplyOutcome::Applied { position }) => checkpoint(position),
//!     Ok(ApplyOutcome::Skipped { event_type }) => debug!(%event_type, "skipped"),
//!     Err(ProjectionError::HandlerFailed { .. }) => {
//!         projection.set_status(ProjectionStatus::Broken);
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```
//!
//! [`Projection::apply`]: crate::projection::Projection::apply
//! [`Projection::run`]: crate::projection::Projection::run
//! [`UnhandledPolicy::Strict`]: crate::options::UnhandledPolicy::Strict

use crate::handler::HandlerError;
use crate::types::{Position, ProjectionId};
use thiserror::Error;

/// Errors that can occur while building or driving a projection.
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// No handler is registered for the event type and the projection is strict.
    #[error("Projection {projection_id} has no handler for event type '{event_type}'")]
    UnhandledEventType {
        /// The projection that received the event
        projection_id: ProjectionId,
        /// The unhandled event type
        event_type: String,
    },

    /// A handler returned an error while folding an event.
    #[error(
        "Handler for '{event_type}' failed in projection {projection_id} at position {position}: {source}"
    )]
    HandlerFailed {
        /// The projection whose handler failed
        projection_id: ProjectionId,
        /// The event type being applied
        event_type: String,
        /// The position before the failed event; unchanged by the failure
        position: Position,
        /// The error returned by the handler
        #[source]
        source: HandlerError,
    },

    /// The projection is already at the highest representable position.
    #[error("Projection {projection_id} cannot advance past position {}", u64::MAX)]
    PositionOverflow {
        /// The projection that could not advance
        projection_id: ProjectionId,
    },

    /// A status code or name outside the four legal values.
    #[error("Invalid projection status: {0}")]
    InvalidStatus(String),

    /// Options bits outside the known flag set.
    #[error("Invalid projection options: unknown bits {0:#x}")]
    InvalidOptions(u32),

    /// Partitioning was requested for a projection that does not fan out.
    #[error("Projection {0} is not a fan-out projection")]
    NotFanOut(ProjectionId),

    /// The driver refused to run a projection marked broken.
    #[error("Projection {0} is broken")]
    Broken(ProjectionId),

    /// An unexpected internal error occurred in a driver.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Type alias for projection results.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use uuid::Uuid;

    fn projection_id() -> ProjectionId {
        ProjectionId::new(Uuid::from_u128(7))
    }

    #[test]
    fn unhandled_event_type_names_the_event_type() {
        let err = ProjectionError::UnhandledEventType {
            projection_id: projection_id(),
            event_type: "Renamed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Projection 00000000-0000-0000-0000-000000000007 has no handler for event type 'Renamed'"
        );
    }

    #[test]
    fn handler_failure_keeps_the_handler_error_as_source() {
        let err = ProjectionError::HandlerFailed {
            projection_id: projection_id(),
            event_type: "Withdrawn".to_string(),
            position: Position::new(4),
            source: HandlerError::new("insufficient funds"),
        };
        assert!(err.to_string().contains("at position 4: insufficient funds"));
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("insufficient funds".to_string())
        );
    }

    #[test]
    fn position_overflow_names_the_limit() {
        let err = ProjectionError::PositionOverflow {
            projection_id: projection_id(),
        };
        assert!(err.to_string().ends_with("past position 18446744073709551615"));
    }

    #[test]
    fn invalid_options_are_shown_in_hex() {
        let err = ProjectionError::InvalidOptions(0x6);
        assert_eq!(err.to_string(), "Invalid projection options: unknown bits 0x6");
    }

    #[test]
    fn result_type_alias_works() {
        fn broken() -> ProjectionResult<()> {
            Err(ProjectionError::Broken(projection_id()))
        }

        assert!(matches!(broken(), Err(ProjectionError::Broken(_))));
    }
}
