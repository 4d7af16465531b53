//! Error types for spec registration and spec execution.
//!
//! Two families live here:
//!
//! - [`SpecError`]: build-time failures surfaced synchronously to whoever calls the registration API. A failed
//!   registration leaves the registry exactly as it was before the call.
//! - [`UnrecoverableError`]: a run-time abort raised by a body or hook. It ends that unit of work only; the engine
//!   still runs the remaining teardown hooks and records the case as failed.
//!
//! Assertion failures are *not* errors: they are recorded on the case and never propagate.

use miette::Diagnostic;
use thiserror::Error;

use crate::registry::Filter;

/// Errors raised while building or registering spec trees.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SpecError {
    #[error("duplicate name '{name}' in {scope}")]
    #[diagnostic(
        code(autospec::duplicate_name),
        help("sibling suites and cases must have distinct names; rename one of them")
    )]
    DuplicateName { name: String, scope: String },

    #[error("empty name in {scope}")]
    #[diagnostic(code(autospec::empty_name))]
    EmptyName { scope: String },

    #[error("'{path}' is nested {depth} levels deep (limit {limit})")]
    #[diagnostic(
        code(autospec::depth_exceeded),
        help("raise `max_depth` in the harness configuration or flatten the suite")
    )]
    DepthExceeded { path: String, depth: usize, limit: usize },

    #[error("cannot register '{name}': the registry is sealed once a run has started")]
    #[diagnostic(
        code(autospec::registry_sealed),
        help("register every definition before the first call to `run`")
    )]
    RegistrySealed { name: String },

    #[error("'{name}' is a {kind} and cannot use the {filter} filter")]
    #[diagnostic(code(autospec::invalid_filter), help("only single cases may be smoke tests"))]
    InvalidFilter {
        name: String,
        kind: &'static str,
        filter: Filter,
    },
}

/// Result type for registration operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// Abort raised by a body or hook that cannot meaningfully continue.
///
/// Returned with `?` from a step closure, typically via [`crate::spec::Scope::require`] or
/// [`crate::spec::Scope::require_some`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UnrecoverableError {
    pub message: String,
}

impl UnrecoverableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of running one body or hook.
pub type StepResult = Result<(), UnrecoverableError>;

/// Conversion for the values step closures may return.
///
/// Lets simple bodies return `()` while bodies that need early aborts return `StepResult` and use `?`.
pub trait IntoStepResult {
    fn into_step_result(self) -> StepResult;
}

impl IntoStepResult for () {
    fn into_step_result(self) -> StepResult {
        Ok(())
    }
}

impl IntoStepResult for StepResult {
    fn into_step_result(self) -> StepResult {
        self
    }
}
