//! Tracegate admission core.
//!
//! Pure, I/O-free logic shared by the in-process simulation and the
//! networked services:
//!
//! - [`constraints`]: the `C_excl`, `C_auth` and `C_global` predicates and
//!   their conjunction
//! - [`view`]: the [`StateView`] abstraction the predicates evaluate against,
//!   with [`LocalView`] and [`AggregateView`] projections
//! - [`state`]: the in-process [`SystemState`] and the lock transition
//! - [`mechanism`]: the three admission policies behind one [`Mechanism`]
//!   trait, plus the admission rules the resource nodes reuse
//! - [`metrics`]: invariant violation rate and enforcement gap
//!
//! Time is abstracted behind [`Environment`] so latency measurement works the
//! same under a real clock and a test clock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod constraints;
pub mod env;
pub mod mechanism;
pub mod metrics;
pub mod state;
pub mod view;

pub use constraints::{Constraint, ConstraintError, ConstraintSet, DEFAULT_K_MAX, default_subset};
pub use env::Environment;
pub use mechanism::{
    Descriptive, Directed, LocallyValidated, Mechanism, MechanismStats, Recorded, policy,
};
pub use state::{SystemState, apply_transition};
pub use view::{AggregateView, LocalView, StateView};
