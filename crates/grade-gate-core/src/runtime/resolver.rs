// crates/grade-gate-core/src/runtime/resolver.rs
// ============================================================================
// Module: Grade Gate Page Policy Resolver
// Description: Turns page-level policy declarations into resolved policies.
// Purpose: Parse deadlines and quotas, failing closed on malformed input.
// Dependencies: crate::core, crate::interfaces, time
// ============================================================================

//! ## Overview
//! [`PagePolicyResolver`] reads the [`PolicySpec`] declared on a page (or a
//! configured fallback when the page declares none) and resolves it into a
//! [`Policy`]. Timestamps are accepted as RFC3339 or as
//! `YYYY-MM-DD HH:MM[:SS]`, the latter interpreted in the offset of the
//! supplied [`TimeContext`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::UtcOffset;
use time::format_description;
use time::format_description::well_known::Rfc3339;

use crate::core::Constraint;
use crate::core::ConstraintSpec;
use crate::core::ExercisePage;
use crate::core::MAX_UTC_OFFSET_MINUTES;
use crate::core::Policy;
use crate::core::PolicySpec;
use crate::core::TimeContext;
use crate::core::Timestamp;
use crate::interfaces::PolicyError;
use crate::interfaces::PolicyResolver;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Offset-less formats accepted for deadlines, tried in order.
const LOCAL_FORMATS: [&str; 2] =
    ["[year]-[month]-[day] [hour]:[minute]:[second]", "[year]-[month]-[day] [hour]:[minute]"];

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves policies declared on exercise pages.
///
/// # Invariants
/// - Pages without a declaration fall back to `fallback`, or to no constraints.
#[derive(Debug, Clone, Default)]
pub struct PagePolicyResolver {
    /// Policy applied to pages that declare none.
    fallback: Option<PolicySpec>,
}

impl PagePolicyResolver {
    /// Creates a resolver without a fallback policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fallback: None,
        }
    }

    /// Creates a resolver that applies `fallback` to pages declaring no policy.
    #[must_use]
    pub const fn with_fallback(fallback: PolicySpec) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }
}

impl PolicyResolver for PagePolicyResolver {
    fn resolve(&self, page: &ExercisePage, context: &TimeContext) -> Result<Policy, PolicyError> {
        let Some(spec) = page.policy.as_ref().or(self.fallback.as_ref()) else {
            return Ok(Policy::unrestricted());
        };
        resolve_spec(spec, context)
    }
}

/// Resolves every declaration of a policy spec, in order.
///
/// # Errors
///
/// Returns [`PolicyError`] on the first malformed declaration.
pub fn resolve_spec(spec: &PolicySpec, context: &TimeContext) -> Result<Policy, PolicyError> {
    let constraints = spec
        .0
        .iter()
        .map(|declaration| resolve_constraint(declaration, context))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Policy::new(constraints))
}

/// Resolves one constraint declaration.
fn resolve_constraint(
    declaration: &ConstraintSpec,
    context: &TimeContext,
) -> Result<Constraint, PolicyError> {
    match declaration {
        ConstraintSpec::Before {
            deadline,
        } => parse_instant("deadline", deadline, context).map(Constraint::Before),
        ConstraintSpec::After {
            start,
        } => parse_instant("start", start, context).map(Constraint::After),
        ConstraintSpec::MaxAttempts {
            limit,
        } => match u64::try_from(*limit) {
            Ok(limit) if limit > 0 => Ok(Constraint::MaxAttempts(limit)),
            _ => Err(PolicyError::Invalid(format!("max_attempts must be positive, got {limit}"))),
        },
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a declared instant as RFC3339, then as a local time in the context offset.
fn parse_instant(field: &str, value: &str, context: &TimeContext) -> Result<Timestamp, PolicyError> {
    let value = value.trim();
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return to_timestamp(parsed);
    }
    let offset = context_offset(context)?;
    for format in LOCAL_FORMATS {
        let description = format_description::parse(format)
            .map_err(|err| PolicyError::Invalid(format!("bad time format: {err}")))?;
        if let Ok(parsed) = PrimitiveDateTime::parse(value, &description) {
            return to_timestamp(parsed.assume_offset(offset));
        }
    }
    Err(PolicyError::Invalid(format!("{field} is not a valid timestamp: {value}")))
}

/// Converts the context offset into a `time` offset.
fn context_offset(context: &TimeContext) -> Result<UtcOffset, PolicyError> {
    if context.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(PolicyError::Invalid(format!(
            "utc offset out of range: {} minutes",
            context.utc_offset_minutes
        )));
    }
    UtcOffset::from_whole_seconds(context.utc_offset_minutes * 60)
        .map_err(|err| PolicyError::Invalid(format!("utc offset out of range: {err}")))
}

/// Converts a parsed instant into unix milliseconds.
fn to_timestamp(instant: OffsetDateTime) -> Result<Timestamp, PolicyError> {
    let millis = instant.unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis)
        .map(Timestamp::from_unix_millis)
        .map_err(|_| PolicyError::Invalid("timestamp exceeds i64 range".to_string()))
}
