//! Evolution-token award log for the companion lifecycle engine.
//!
//! Every change to a pet's token balance is recorded here as a
//! [`TokenAward`](companion_types::TokenAward) carrying a mandatory reason.
//! Nothing is ever edited or removed except when the owning entity itself
//! is removed.
//!
//! # Architecture
//!
//! - [`transaction`] -- The [`AwardBuilder`] for validated entry construction.
//! - [`ledger`] -- The [`TokenLedger`]: in-memory append-only award log.
//! - [`reconcile`] -- Balance reconciliation against a stored balance.
//!
//! # Reconciliation
//!
//! For every entity E:
//!
//! ```text
//! sum(applied_delta for E) == stored evolution_tokens for E
//! ```
//!
//! A mismatch produces a [`BalanceDrift`]. Drift is reported, never
//! repaired automatically.
//!
//! # Usage
//!
//! ```
//! use companion_ledger::{AwardBuilder, TokenLedger};
//! use companion_ledger::reconcile::BalanceCheck;
//! use companion_types::EntityId;
//!
//! let mut ledger = TokenLedger::new();
//! let entity = EntityId::new();
//!
//! let award = AwardBuilder::new(entity)
//!     .requested(25)
//!     .applied(25)
//!     .balance_after(25)
//!     .reason("daily_check_in")
//!     .build()?;
//! ledger.append(award);
//!
//! assert_eq!(ledger.verify_balance(entity, 25), BalanceCheck::Balanced);
//! # Ok::<(), companion_ledger::LedgerError>(())
//! ```

pub mod ledger;
pub mod reconcile;
pub mod transaction;

// Re-export primary types at crate root.
pub use ledger::TokenLedger;
pub use reconcile::{BalanceCheck, verify_balance};
pub use transaction::AwardBuilder;

use companion_types::EntityId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when building award entries.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Awards must be attributable; an empty or blank reason is rejected.
    #[error("token award reason must not be empty")]
    MissingReason,

    /// The applied delta moved the balance further than requested or in
    /// the opposite direction.
    #[error("applied delta {applied} is inconsistent with requested delta {requested}")]
    InconsistentDelta {
        /// Delta the caller asked for.
        requested: i64,
        /// Delta recorded as applied.
        applied: i64,
    },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

// ---------------------------------------------------------------------------
// Drift type
// ---------------------------------------------------------------------------

/// A mismatch between the award log and a stored balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDrift {
    /// The entity whose balance drifted.
    pub entity_id: EntityId,
    /// Balance implied by the award log.
    pub ledger_balance: i128,
    /// Balance held on the pet record.
    pub stored_balance: u64,
    /// Human-readable description.
    pub message: String,
}

impl core::fmt::Display for BalanceDrift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
