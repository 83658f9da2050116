//! Invariant checking for experiment runs.
//!
//! Invariants are properties that must hold after every directed run,
//! whatever the workload. They are checked against a [`SystemSnapshot`]
//! built from node states and traces (or from an in-process
//! [`SystemState`](tracegate_core::SystemState)).
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::for_constraints(&constraints);
//! let snapshot = SystemSnapshot::from_states(states).with_trace(trace);
//! if let Err(failures) = registry.check_all(&snapshot) { /* report */ }
//! ```

mod checks;
mod snapshot;

pub use checks::{GlobalBound, MutualExclusion, TraceCompliance};
pub use snapshot::SystemSnapshot;
use thiserror::Error;
use tracegate_core::{Constraint, ConstraintSet};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A failed check and what it found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{invariant}: {message}")]
pub struct Violation {
    /// Failing check
    pub invariant: &'static str,
    /// What was observed
    pub message: String,
}

/// A property checked against a snapshot.
pub trait Invariant: Send + Sync {
    /// Stable name, used in [`Violation::invariant`].
    fn name(&self) -> &'static str;

    /// Check `snapshot`.
    fn check(&self, snapshot: &SystemSnapshot) -> InvariantResult;
}

/// Ordered set of checks run together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// No checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks implied by [`ConstraintSet::standard`].
    pub fn standard() -> Self {
        Self::for_constraints(&ConstraintSet::standard())
    }

    /// Invariants a directed run enforcing `constraints` must satisfy.
    ///
    /// - [`MutualExclusion`] when `C_excl` is enforced
    /// - one [`GlobalBound`] per configured `C_global`
    /// - [`TraceCompliance`] against `constraints`
    pub fn for_constraints(constraints: &ConstraintSet) -> Self {
        let mut registry = Self::new();
        for constraint in constraints.iter() {
            match constraint {
                Constraint::Exclusive => registry.add(MutualExclusion),
                Constraint::GlobalBound { subset, k_max } => {
                    registry.add(GlobalBound::new(subset.clone(), *k_max));
                },
                Constraint::Authorized => {},
            }
        }
        registry.add(TraceCompliance::new(constraints.clone()));
        registry
    }

    /// Register `check` after the existing ones.
    pub fn add(&mut self, check: impl Invariant + 'static) {
        self.checks.push(Box::new(check));
    }

    /// Run every check; `Err` carries each failure in registration order.
    pub fn check_all(&self, snapshot: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let failures: Vec<Violation> =
            self.checks.iter().filter_map(|check| check.check(snapshot).err()).collect();
        if !failures.is_empty() {
            return Err(failures);
        }
        Ok(())
    }

    /// Run every check and panic listing all failures.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, snapshot: &SystemSnapshot, context: &str) {
        let Err(failures) = self.check_all(snapshot) else { return };
        let lines: Vec<String> = failures.iter().map(|v| format!("  {v}")).collect();
        panic!("invariants broken {context}:\n{}", lines.join("\n"));
    }

    /// Registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
