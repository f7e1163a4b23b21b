// crates/grade-gate-core/src/runtime/policy.rs
// ============================================================================
// Module: Grade Gate Policy Engine
// Description: Checks one submission attempt against an ordered policy.
// Purpose: Decide admissibility independent of code correctness.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`check_policy`] evaluates every constraint of a policy against one
//! [`Access`] and reports all violations together, in constraint order.
//! Deadline checks are pure comparisons; attempt quotas ask an
//! [`AttemptCounter`] for the number of strictly earlier submissions. The
//! engine holds no state, so concurrent evaluations may call it freely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::Access;
use crate::core::Constraint;
use crate::core::Policy;
use crate::core::VIOLATION_SEPARATOR;
use crate::core::Validity;
use crate::interfaces::AttemptCounter;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Policy Check
// ============================================================================

/// Checks an attempt against every constraint of a policy.
///
/// Returns [`Validity::Valid`] when no constraint is violated, otherwise
/// [`Validity::Invalid`] with every violation message joined by `;`.
///
/// # Errors
///
/// Returns [`StoreError`] when an attempt quota cannot be counted.
pub fn check_policy<C>(access: &Access, policy: &Policy, counter: &C) -> Result<Validity, StoreError>
where
    C: AttemptCounter + ?Sized,
{
    let mut violations = Vec::new();
    for constraint in &policy.constraints {
        if is_violated(access, constraint, counter)? {
            violations.push(constraint.violation_message());
        }
    }
    if violations.is_empty() {
        Ok(Validity::Valid)
    } else {
        Ok(Validity::invalid(violations.join(VIOLATION_SEPARATOR)))
    }
}

/// Returns true when a single constraint rejects the attempt.
fn is_violated<C>(access: &Access, constraint: &Constraint, counter: &C) -> Result<bool, StoreError>
where
    C: AttemptCounter + ?Sized,
{
    match *constraint {
        Constraint::Before(deadline) => Ok(access.time > deadline),
        Constraint::After(start) => Ok(access.time < start),
        Constraint::MaxAttempts(limit) => {
            let earlier =
                counter.count_earlier_submissions(&access.user, &access.path, access.time)?;
            Ok(earlier >= limit)
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
