//! Execution engine.
//!
//! [`Runner`] turns a selection of names into result records. Every selected case runs through the same state
//! machine:
//!
//! ```text
//! Pending ── disabled ──────────────────────────────────────────────▶ Disabled
//!    │
//!    ▼
//! Setup(0) ▶ … ▶ Setup(n-1) ▶ Body ▶ Teardown(n-1) ▶ … ▶ Teardown(0) ▶ Passed | Failed
//! ```
//!
//! Any running phase may nest a `Suspended` state while a latent step waits for its [`Done`] signal; the engine
//! pumps the scheduler until the signal fires and then resumes with the next step.
//!
//! ## Notes
//!
//! - Each case gets a fresh [`ExecutionContext`]. Sibling cases never observe each other's writes.
//! - An [`crate::errors::UnrecoverableError`] or panic in a setup hook skips the remaining setup hooks and the
//!   body; teardown still runs for every suite level whose setup was entered.
//! - Teardown hooks always run to the end: a failing hook is recorded and the next one runs.
//! - Work left by [`Done::execute_with`] runs with a live [`Scope`] right after the signal, before the next step.
//! - Once a case finishes, the scheduler drops whatever that case left queued.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use crate::errors::StepResult;
use crate::latent::{Done, Pump, Scheduler, Signal};
use crate::registry::{Registry, SelectedCase};
use crate::report::{CollectingSink, ResultRecord, ResultSink, RunSummary, Status};
use crate::spec::{AssertionLog, ExecutionContext, Scope, Step};

/// Phase of one case run, logged at `trace` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePhase {
    Pending,
    /// Running the setup hooks of the suite at this depth (0 = outermost).
    Setup(usize),
    Body,
    /// Running the teardown hooks of the suite at this depth.
    Teardown(usize),
    /// Waiting for a latent step's completion signal.
    Suspended,
    Finished(Status),
}

impl fmt::Display for CasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CasePhase::Pending => write!(f, "pending"),
            CasePhase::Setup(level) => write!(f, "setup({level})"),
            CasePhase::Body => write!(f, "body"),
            CasePhase::Teardown(level) => write!(f, "teardown({level})"),
            CasePhase::Suspended => write!(f, "suspended"),
            CasePhase::Finished(status) => write!(f, "finished({status})"),
        }
    }
}

fn enter(path: &str, phase: CasePhase) {
    tracing::trace!(path, %phase, "case phase");
}

/// What the selection resolved to.
enum Planned<'r> {
    Case(SelectedCase<'r>),
    Unknown(String),
}

impl Planned<'_> {
    fn path(&self) -> &str {
        match self {
            Planned::Case(case) => case.path,
            Planned::Unknown(name) => name,
        }
    }
}

/// Runs selected cases from a [`Registry`] against a [`Scheduler`].
pub struct Runner<'r, S: Scheduler> {
    registry: &'r Registry,
    scheduler: S,
}

impl<'r, S: Scheduler> Runner<'r, S> {
    pub fn new(registry: &'r Registry, scheduler: S) -> Self {
        Self { registry, scheduler }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> S {
        self.scheduler
    }

    /// Run `selection` and return one record per selected case, in selection order.
    ///
    /// A suite or parametrized case name expands to every case beneath it. A name that matches nothing yields a
    /// single `Skipped` record.
    pub fn run<N: AsRef<str>>(&mut self, selection: &[N]) -> Vec<ResultRecord> {
        let mut sink = CollectingSink::new();
        self.run_into(selection, &mut sink);
        sink.into_records()
    }

    /// Run `selection`, streaming records into `sink`.
    ///
    /// ## Parameters
    /// - `selection`: case, suite, parametrized case or instance paths.
    /// - `sink`: receives every record as soon as its case finishes, then the summary.
    ///
    /// ## Returns
    /// - The summary handed to `sink`.
    ///
    /// ## Notes
    /// - Seals the registry.
    /// - Never fails as a whole: every problem ends up in a record.
    #[tracing::instrument(skip_all, fields(selected = selection.len()))]
    pub fn run_into<N: AsRef<str>>(&mut self, selection: &[N], sink: &mut dyn ResultSink) -> RunSummary {
        let registry = self.registry;
        registry.seal();
        let started = Instant::now();

        let mut plan = Vec::new();
        for name in selection {
            let name = name.as_ref();
            match registry.resolve(name) {
                Some(cases) => plan.extend(cases.into_iter().map(Planned::Case)),
                None => plan.push(Planned::Unknown(name.to_string())),
            }
        }
        tracing::debug!(cases = plan.len(), "selection resolved");
        sink.on_run_start(plan.len());

        let stop_on_fail = registry.config().stop_on_fail;
        let mut stopped = false;
        let mut summary = RunSummary::default();

        for planned in &plan {
            sink.on_case_start(planned.path());
            let record = match planned {
                _ if stopped => ResultRecord::skipped(planned.path(), "not run: stopped after first failure"),
                Planned::Unknown(name) => {
                    tracing::warn!(name = name.as_str(), "selection matches no registered spec");
                    ResultRecord::skipped(name.as_str(), format_args!("no spec matches '{name}'"))
                }
                Planned::Case(case) => self.run_case(case),
            };
            if stop_on_fail && record.is_failure() {
                stopped = true;
            }
            summary.add(record.status);
            sink.on_record(&record);
        }

        let summary = summary.with_duration(started.elapsed());
        tracing::debug!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            disabled = summary.disabled,
            "run complete"
        );
        sink.on_run_complete(&summary);
        summary
    }

    fn run_case(&mut self, case: &SelectedCase<'_>) -> ResultRecord {
        let path = case.path;
        enter(path, CasePhase::Pending);
        if case.disabled {
            enter(path, CasePhase::Finished(Status::Disabled));
            return ResultRecord::disabled(path);
        }

        let started = Instant::now();
        let mut context = ExecutionContext::new();
        let mut log = AssertionLog::new();

        let mut entered = 0;
        let mut aborted = false;
        'setup: for (level, suite) in case.ancestors.iter().enumerate() {
            entered = level + 1;
            enter(path, CasePhase::Setup(level));
            for hook in suite.before_each() {
                if !self.run_step(path, hook, &mut context, &mut log) {
                    aborted = true;
                    break 'setup;
                }
            }
        }

        if !aborted {
            enter(path, CasePhase::Body);
            self.run_step(path, case.body, &mut context, &mut log);
        }

        for level in (0..entered).rev() {
            enter(path, CasePhase::Teardown(level));
            for hook in case.ancestors[level].after_each() {
                self.run_step(path, hook, &mut context, &mut log);
            }
        }
        self.scheduler.on_case_end();

        let status = if log.has_failures() {
            Status::Failed
        } else {
            Status::Passed
        };
        enter(path, CasePhase::Finished(status));
        let record = ResultRecord::new(path, status, log.into_messages(), started.elapsed());
        tracing::debug!(path, %status, duration_ms = record.duration_millis, "case finished");
        record
    }

    /// Run one body or hook to completion. Returns `false` if it aborted.
    fn run_step(&mut self, path: &str, step: &Step, context: &mut ExecutionContext, log: &mut AssertionLog) -> bool {
        match step {
            Step::Sync(body) => {
                let outcome = {
                    let mut scope = Scope::new(path, context, log, &mut self.scheduler);
                    catch_unwind(AssertUnwindSafe(|| body(&mut scope)))
                };
                settle(outcome, log)
            }
            Step::Latent(body) => {
                let done = Done::new();
                let outcome = {
                    let mut scope = Scope::new(path, context, log, &mut self.scheduler);
                    catch_unwind(AssertUnwindSafe(|| body(&mut scope, done.clone())))
                };
                if !settle(outcome, log) {
                    return false;
                }
                self.await_done(path, &done, context, log)
            }
        }
    }

    /// Pump the scheduler until `done` fires, or until nothing is left that could fire it, then run any work the
    /// step left for its resumption. Returns `false` if that work aborted.
    fn await_done(&mut self, path: &str, done: &Done, context: &mut ExecutionContext, log: &mut AssertionLog) -> bool {
        if !done.is_complete() {
            enter(path, CasePhase::Suspended);
            self.scheduler.on_suspend(done);
            while !done.is_complete() {
                if self.scheduler.pump() == Pump::Idle {
                    tracing::warn!(path, "latent step stalled with nothing scheduled to resume it");
                    log.error("latent step stalled: completion was never signalled and nothing is scheduled");
                    self.scheduler.on_resume(done);
                    return true;
                }
            }
            self.scheduler.on_resume(done);
        }

        if let Signal::Failed(message) = done.signal() {
            log.error(message);
            return true;
        }
        match done.take_continuation() {
            Some(then) => {
                let outcome = {
                    let mut scope = Scope::new(path, context, log, &mut self.scheduler);
                    catch_unwind(AssertUnwindSafe(move || then(&mut scope)))
                };
                settle(outcome, log)
            }
            None => true,
        }
    }
}

fn settle(outcome: std::thread::Result<StepResult>, log: &mut AssertionLog) -> bool {
    match outcome {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            log.error(format!("aborted: {err}"));
            false
        }
        Err(payload) => {
            log.error(format!("panicked: {}", panic_message(payload.as_ref())));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UnrecoverableError;
    use crate::latent::CooperativeScheduler;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn run(registry: &Registry, selection: &[&str]) -> Vec<ResultRecord> {
        Runner::new(registry, CooperativeScheduler::virtual_time()).run(selection)
    }

    #[test]
    fn test_nested_hooks_accumulate() {
        let mut registry = Registry::default();
        registry
            .describe("Sum", |s| {
                s.before_each(|scope| scope.set("c", 13_i32));
                s.describe("Nested", |s| {
                    s.before_each(|scope| {
                        if let Some(c) = scope.get_mut::<i32>("c") {
                            *c += 10;
                        }
                    });
                    s.it("check", |scope| {
                        let c = scope.get::<i32>("c").copied();
                        scope.test_equal("c", c, Some(23));
                    });
                });
            })
            .unwrap();

        let records = run(&registry, &["Sum.Nested.check"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Status::Passed);
        assert_eq!(records[0].messages, ["[pass] c"]);
    }

    #[test]
    fn test_hook_order() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::default();
        let t = trace.clone();
        registry
            .describe("Outer", move |s| {
                let (a, b, c, d) = (t.clone(), t.clone(), t.clone(), t.clone());
                s.before_each(move |_| a.borrow_mut().push("outer setup"));
                s.after_each(move |_| b.borrow_mut().push("outer teardown"));
                s.describe("Inner", move |s| {
                    let e = c.clone();
                    s.before_each(move |_| c.borrow_mut().push("inner setup"));
                    s.after_each(move |_| d.borrow_mut().push("inner teardown"));
                    s.it("case", move |_| e.borrow_mut().push("body"));
                });
            })
            .unwrap();

        run(&registry, &["Outer.Inner.case"]);
        assert_eq!(
            *trace.borrow(),
            ["outer setup", "inner setup", "body", "inner teardown", "outer teardown"]
        );
    }

    #[test]
    fn test_setup_abort_skips_body_but_runs_teardown() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::default();
        let t = trace.clone();
        registry
            .describe("Outer", move |s| {
                let (a, b, c) = (t.clone(), t.clone(), t.clone());
                s.after_each(move |_| a.borrow_mut().push("outer teardown"));
                s.describe("Inner", move |s| {
                    s.before_each(|_| -> StepResult { Err(UnrecoverableError::new("no fixture")) });
                    s.after_each(move |_| b.borrow_mut().push("inner teardown"));
                    s.it("case", move |_| c.borrow_mut().push("body"));
                });
            })
            .unwrap();

        let records = run(&registry, &["Outer.Inner.case"]);
        assert_eq!(records[0].status, Status::Failed);
        assert_eq!(records[0].messages, ["[error] aborted: no fixture"]);
        assert_eq!(*trace.borrow(), ["inner teardown", "outer teardown"]);
    }

    #[test]
    fn test_body_abort_stops_body_only() {
        let mut registry = Registry::default();
        registry
            .it("Abort", |scope| -> StepResult {
                scope.test_true("first", true);
                scope.require("precondition", false)?;
                scope.test_true("unreachable", true);
                Ok(())
            })
            .unwrap();

        let records = run(&registry, &["Abort"]);
        assert_eq!(records[0].status, Status::Failed);
        assert_eq!(
            records[0].messages,
            ["[pass] first", "[error] aborted: requirement failed: precondition"]
        );
    }

    #[test]
    fn test_panic_is_recorded() {
        let mut registry = Registry::default();
        registry
            .describe("Panics", |s| {
                s.it("boom", |_| -> StepResult { panic!("kaboom") });
                s.it("fine", |scope| {
                    scope.test_true("still runs", true);
                });
            })
            .unwrap();

        let records = run(&registry, &["Panics"]);
        assert_eq!(records[0].status, Status::Failed);
        assert_eq!(records[0].messages, ["[error] panicked: kaboom"]);
        assert_eq!(records[1].status, Status::Passed);
    }

    #[test]
    fn test_teardown_failure_does_not_skip_other_teardowns() {
        let mut registry = Registry::default();
        registry
            .describe("Suite", |s| {
                s.after_each(|_| -> StepResult { Err(UnrecoverableError::new("first")) });
                s.after_each(|scope| scope.add_info("second"));
                s.it("case", |_| {});
            })
            .unwrap();

        let records = run(&registry, &["Suite.case"]);
        assert_eq!(records[0].messages, ["[error] aborted: first", "[info] second"]);
        assert_eq!(records[0].status, Status::Failed);
    }

    #[test]
    fn test_latent_body_waits_for_signal() {
        let mut registry = Registry::default();
        registry
            .latent_it("Latent", |scope, done| {
                scope.after(Duration::from_secs(2), move || done.execute());
            })
            .unwrap();

        let mut runner = Runner::new(&registry, CooperativeScheduler::virtual_time());
        let records = runner.run(&["Latent"]);
        assert_eq!(records[0].status, Status::Passed);
        assert_eq!(runner.scheduler().now(), Duration::from_secs(2));
    }

    #[test]
    fn test_latent_stall_fails_case() {
        let mut registry = Registry::default();
        registry.latent_it("Forgotten", |_, _done| {}).unwrap();

        let records = run(&registry, &["Forgotten"]);
        assert_eq!(records[0].status, Status::Failed);
        assert_eq!(records[0].messages.len(), 1);
        assert!(records[0].messages[0].starts_with("[error] latent step stalled"));
    }

    #[test]
    fn test_latent_timeout_fails_case() {
        let mut registry = Registry::default();
        registry
            .latent_it("Slow", |scope, done| {
                scope.after(Duration::from_secs(10), move || done.execute());
            })
            .unwrap();

        let scheduler = CooperativeScheduler::virtual_time().with_timeout(Duration::from_secs(1));
        let records = Runner::new(&registry, scheduler).run(&["Slow"]);
        assert_eq!(records[0].status, Status::Failed);
        assert_eq!(records[0].messages, ["[error] latent step timed out after 1000ms"]);
    }

    #[test]
    fn test_resumed_work_records_into_case() {
        let mut registry = Registry::default();
        registry
            .latent_it("Arrives", |scope, done| {
                scope.add_info("waiting");
                let value = Rc::new(RefCell::new(0));
                let slot = value.clone();
                scope.after(Duration::from_secs(1), move || {
                    *slot.borrow_mut() = 41;
                    done.execute_with(move |scope| {
                        scope.test_equal("value that arrived", *value.borrow(), 42);
                    });
                });
            })
            .unwrap();

        let records = run(&registry, &["Arrives"]);
        assert_eq!(records[0].status, Status::Failed);
        assert_eq!(
            records[0].messages,
            ["[info] waiting", "[fail] value that arrived: expected 42, got 41"]
        );
    }

    #[test]
    fn test_resumed_abort_in_setup_skips_body() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::default();
        let t = trace.clone();
        registry
            .describe("Suite", move |s| {
                let (a, b) = (t.clone(), t.clone());
                s.latent_before_each(|scope, done| {
                    scope.after(Duration::from_millis(5), move || {
                        done.execute_with(|scope| scope.require("fixture loaded", false));
                    });
                });
                s.after_each(move |_| a.borrow_mut().push("teardown"));
                s.it("case", move |_| b.borrow_mut().push("body"));
            })
            .unwrap();

        let records = run(&registry, &["Suite.case"]);
        assert_eq!(records[0].status, Status::Failed);
        assert_eq!(records[0].messages, ["[error] aborted: requirement failed: fixture loaded"]);
        assert_eq!(*trace.borrow(), ["teardown"]);
    }

    #[test]
    fn test_scheduled_work_does_not_outlive_its_case() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::default();
        let e = events.clone();
        registry
            .describe("Iso", move |s| {
                let (first, second) = (e.clone(), e.clone());
                s.latent_it("first", move |scope, done| {
                    let events = first.clone();
                    scope.after(Duration::from_secs(1), move || done.execute());
                    scope.after(Duration::from_secs(3), move || events.borrow_mut().push("first's callback"));
                });
                s.latent_it("second", move |scope, done| {
                    second.borrow_mut().push("second starts");
                    scope.after(Duration::from_secs(10), move || done.execute());
                });
            })
            .unwrap();

        let mut runner = Runner::new(&registry, CooperativeScheduler::virtual_time());
        let records = runner.run(&["Iso"]);
        assert!(records.iter().all(|record| record.status == Status::Passed));
        assert_eq!(*events.borrow(), ["second starts"]);
        assert_eq!(runner.scheduler().pending(), 0);
        assert_eq!(runner.scheduler().now(), Duration::from_secs(11));
    }

    #[test]
    fn test_timeout_is_disarmed_after_completion() {
        let mut registry = Registry::default();
        registry
            .latent_it("Quick", |scope, done| {
                scope.after(Duration::from_millis(1), move || done.execute());
            })
            .unwrap();

        let scheduler = CooperativeScheduler::virtual_time().with_timeout(Duration::from_secs(60));
        let mut runner = Runner::new(&registry, scheduler);
        let records = runner.run(&["Quick"]);
        assert_eq!(records[0].status, Status::Passed);
        assert_eq!(runner.scheduler().pending(), 0);
        assert_eq!(runner.scheduler().now(), Duration::from_millis(1));
    }

    #[test]
    fn test_disabled_case_invokes_nothing() {
        let calls = Rc::new(RefCell::new(0));
        let mut registry = Registry::default();
        let c = calls.clone();
        registry
            .describe("Suite", move |s| {
                let (a, b) = (c.clone(), c.clone());
                s.before_each(move |_| *a.borrow_mut() += 1);
                s.x_it("off", move |_| *b.borrow_mut() += 1);
            })
            .unwrap();

        let records = run(&registry, &["Suite.off"]);
        assert_eq!(records[0].status, Status::Disabled);
        assert!(records[0].messages.is_empty());
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_unknown_name_is_skipped() {
        let registry = Registry::default();
        let records = run(&registry, &["Nope"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Status::Skipped);
        assert_eq!(records[0].messages, ["[skip] no spec matches 'Nope'"]);
    }

    #[test]
    fn test_run_seals_registry() {
        let mut registry = Registry::default();
        registry.it("Only", |_| {}).unwrap();
        run(&registry, &["Only"]);
        assert!(registry.is_sealed());
        assert!(registry.it("Late", |_| {}).is_err());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(CasePhase::Setup(2).to_string(), "setup(2)");
        assert_eq!(CasePhase::Finished(Status::Passed).to_string(), "finished(PASSED)");
    }
}
