//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every identifier in the companion engine is a distinct newtype so an
//! entity id can never be passed where a generation job id is expected.
//! All IDs use UUID v7 (time-ordered) so award logs and jobs sort by
//! creation time when stored.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of the owning relationship entity (a contact).
    ///
    /// A pet has no identity of its own; it is addressed by its owner.
    EntityId
}

define_id! {
    /// Identifier of one media generation job.
    ///
    /// Completion and failure writes are fenced on this id so that a
    /// superseded job can never write into a newer job's state.
    GenerationJobId
}

define_id! {
    /// Identifier of a single evolution-token award in the audit log.
    AwardId
}
