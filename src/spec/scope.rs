//! The handle bodies and hooks run against.
//!
//! [`Scope`] bundles the per-case [`ExecutionContext`], the case's [`AssertionLog`] and the scheduler port. Soft
//! assertions (`test_*`) record a message and return whether they held, so a body can bail out early; hard
//! requirements (`require*`) return an [`UnrecoverableError`] to be propagated with `?`.

use std::any::Any;
use std::fmt::Debug;
use std::time::Duration;

use crate::errors::{StepResult, UnrecoverableError};
use crate::latent::{Scheduler, Wake};

use super::ExecutionContext;

/// Ordered messages recorded while running one case, plus its failure flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionLog {
    messages: Vec<String>,
    failed: bool,
}

impl AssertionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a passing assertion.
    pub fn pass(&mut self, what: &str) {
        self.messages.push(format!("[pass] {what}"));
    }

    /// Record a failing assertion. Marks the case failed.
    pub fn fail(&mut self, text: impl AsRef<str>) {
        self.failed = true;
        self.messages.push(format!("[fail] {}", text.as_ref()));
    }

    /// Record an error that is not an assertion (abort, panic, failed completion). Marks the case failed.
    pub fn error(&mut self, text: impl AsRef<str>) {
        self.failed = true;
        self.messages.push(format!("[error] {}", text.as_ref()));
    }

    pub fn info(&mut self, text: impl AsRef<str>) {
        self.messages.push(format!("[info] {}", text.as_ref()));
    }

    pub fn warning(&mut self, text: impl AsRef<str>) {
        self.messages.push(format!("[warn] {}", text.as_ref()));
    }

    pub fn has_failures(&self) -> bool {
        self.failed
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// Everything a body or hook can reach while it runs.
pub struct Scope<'a> {
    path: &'a str,
    context: &'a mut ExecutionContext,
    log: &'a mut AssertionLog,
    scheduler: &'a mut dyn Scheduler,
}

impl<'a> Scope<'a> {
    pub fn new(
        path: &'a str,
        context: &'a mut ExecutionContext,
        log: &'a mut AssertionLog,
        scheduler: &'a mut dyn Scheduler,
    ) -> Self {
        Self {
            path,
            context,
            log,
            scheduler,
        }
    }

    /// Full path of the case being run.
    pub fn path(&self) -> &str {
        self.path
    }

    pub fn context(&self) -> &ExecutionContext {
        &*self.context
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut *self.context
    }

    pub fn set<T: Any>(&mut self, name: impl Into<String>, value: T) {
        self.context.set(name, value);
    }

    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.context.get(name)
    }

    pub fn get_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.context.get_mut(name)
    }

    pub fn take<T: Any>(&mut self, name: &str) -> Option<T> {
        self.context.take(name)
    }

    pub fn log(&self) -> &AssertionLog {
        &*self.log
    }

    // ------------------------------------------------------------------
    // Soft assertions
    // ------------------------------------------------------------------

    /// Check that `actual == expected`.
    pub fn test_equal<T: PartialEq + Debug>(&mut self, what: &str, actual: T, expected: T) -> bool {
        if actual == expected {
            self.log.pass(what);
            true
        } else {
            self.log.fail(format!("{what}: expected {expected:?}, got {actual:?}"));
            false
        }
    }

    /// Check that `actual != unexpected`.
    pub fn test_not_equal<T: PartialEq + Debug>(&mut self, what: &str, actual: T, unexpected: T) -> bool {
        if actual != unexpected {
            self.log.pass(what);
            true
        } else {
            self.log.fail(format!("{what}: expected a value other than {unexpected:?}"));
            false
        }
    }

    pub fn test_true(&mut self, what: &str, condition: bool) -> bool {
        if condition {
            self.log.pass(what);
        } else {
            self.log.fail(format!("{what}: expected true"));
        }
        condition
    }

    pub fn test_false(&mut self, what: &str, condition: bool) -> bool {
        if condition {
            self.log.fail(format!("{what}: expected false"));
        } else {
            self.log.pass(what);
        }
        !condition
    }

    /// Check that a value is present.
    pub fn test_some<T>(&mut self, what: &str, value: Option<&T>) -> bool {
        if value.is_some() {
            self.log.pass(what);
            true
        } else {
            self.log.fail(format!("{what}: expected a value, got none"));
            false
        }
    }

    /// Check that a value is absent.
    pub fn test_none<T: Debug>(&mut self, what: &str, value: Option<&T>) -> bool {
        match value {
            None => {
                self.log.pass(what);
                true
            }
            Some(value) => {
                self.log.fail(format!("{what}: expected none, got {value:?}"));
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Hard requirements
    // ------------------------------------------------------------------

    /// Abort the current body or hook unless `condition` holds.
    pub fn require(&mut self, what: &str, condition: bool) -> StepResult {
        if condition {
            self.log.pass(what);
            Ok(())
        } else {
            Err(UnrecoverableError::new(format!("requirement failed: {what}")))
        }
    }

    /// Unwrap `value` or abort the current body or hook.
    pub fn require_some<T>(&mut self, what: &str, value: Option<T>) -> Result<T, UnrecoverableError> {
        match value {
            Some(value) => {
                self.log.pass(what);
                Ok(value)
            }
            None => Err(UnrecoverableError::new(format!("requirement failed: {what}"))),
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub fn add_info(&mut self, text: impl AsRef<str>) {
        self.log.info(text);
    }

    pub fn add_warning(&mut self, text: impl AsRef<str>) {
        self.log.warning(text);
    }

    /// Record an error and fail the case without aborting.
    pub fn add_error(&mut self, text: impl AsRef<str>) {
        self.log.error(text);
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Hand `callback` to the scheduler port.
    pub fn schedule(&mut self, wake: Wake, callback: impl FnOnce() + 'static) {
        self.scheduler.schedule_resume(wake, Box::new(callback));
    }

    /// Run `callback` once `delay` has elapsed on the scheduler's clock.
    pub fn after(&mut self, delay: Duration, callback: impl FnOnce() + 'static) {
        self.schedule(Wake::After(delay), callback);
    }
}
