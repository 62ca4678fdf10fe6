//! Core types for the `streamfold` projection library.
//!
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle.

use nutype::nutype;
use uuid::Uuid;

/// The name of a stream category, e.g. `"account"` or `"order"`.
///
/// `StreamType` values are trimmed, non-empty and at most 255 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamType(String);

/// The discriminator that selects a handler, e.g. `"Incremented"`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventType(String);

/// Opaque handle naming the event stream a projection was created for.
///
/// The projection stores the handle and hands it back verbatim; it never
/// inspects it.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventStreamHandle(String);

/// Identifier of a single stream instance.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Deref,
    Display,
    Serialize,
    Deserialize
))]
pub struct StreamId(Uuid);

impl StreamId {
    /// Creates a random (v4) stream identifier.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Globally unique identity of a projection.
///
/// Drivers use the identity to correlate a projection instance with its
/// persisted checkpoint. The `Display` form is the hyphenated UUID string.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Deref,
    Display,
    Serialize,
    Deserialize
))]
pub struct ProjectionId(Uuid);

/// Count of events successfully folded into a projection's state.
///
/// Positions start at 0 (or a supplied resume offset) and only move forward,
/// one step per applied event.
#[nutype(
    default = 0,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Default,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Position(u64);

impl Position {
    /// The position of a projection that has applied nothing yet.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Returns the position after one more applied event, or `None` at
    /// `u64::MAX`.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.into_inner().checked_add(1).map(Self::new)
    }

    /// Returns the raw event count.
    pub fn value(self) -> u64 {
        self.into_inner()
    }
}
