//! Latent completion and the scheduler port.
//!
//! A latent step (hook or body) receives a [`Done`] handle and returns immediately. The engine then suspends the
//! whole case run and pumps the [`Scheduler`] until the handle has been signalled. The scheduler is the only thing
//! that can resume a suspended step: it owns every callback handed to [`Scheduler::schedule_resume`] and invokes
//! each one at most once.
//!
//! ## Notes
//!
//! - The harness defines no timeout. A scheduler may impose one by failing the handle it is told about in
//!   [`Scheduler::on_suspend`] (see [`CooperativeScheduler::with_timeout`]).
//! - Everything here is single-threaded: handles are `Rc`-based and callbacks are not `Send`.
//! - Work a case schedules belongs to that case. [`Scheduler::on_case_end`] drops whatever is still queued
//!   once the case's last teardown has run.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::errors::{IntoStepResult, StepResult};
use crate::spec::Scope;

/// Callback invoked by the scheduler when its wake condition is met.
pub type Resume = Box<dyn FnOnce()>;

/// Predicate polled by the scheduler for [`Wake::When`].
pub type WakePredicate = Box<dyn FnMut() -> bool>;

/// Work the engine runs with a live [`Scope`] once a latent step resumes.
pub type Continuation = Box<dyn FnOnce(&mut Scope<'_>) -> StepResult>;

/// Condition under which a scheduled callback runs.
pub enum Wake {
    /// On the next cooperative step.
    NextStep,
    /// Once the given delay has elapsed on the scheduler's clock.
    After(Duration),
    /// As soon as the predicate returns `true`.
    When(WakePredicate),
}

impl fmt::Debug for Wake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wake::NextStep => write!(f, "NextStep"),
            Wake::After(delay) => write!(f, "After({delay:?})"),
            Wake::When(_) => write!(f, "When(..)"),
        }
    }
}

/// Completion state of a latent step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Pending,
    Completed,
    /// Completed with a failure payload (e.g. a scheduler-imposed timeout).
    Failed(String),
}

struct DoneState {
    signal: Signal,
    then: Option<Continuation>,
}

/// Single-shot completion handle given to latent steps.
///
/// Cloning shares the handle. The first call to [`Done::execute`], [`Done::execute_with`] or [`Done::fail`] wins;
/// later calls are ignored.
#[derive(Clone)]
pub struct Done {
    state: Rc<RefCell<DoneState>>,
}

impl Done {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(DoneState {
                signal: Signal::Pending,
                then: None,
            })),
        }
    }

    /// Signal that the latent step has finished.
    pub fn execute(&self) {
        self.settle(Signal::Completed, None);
    }

    /// Signal that the latent step has finished, leaving `then` to run against the case's scope.
    ///
    /// Assertions made in `then` land in the case's record, after everything the step recorded before it
    /// suspended. An abort or panic in `then` counts as an abort of the step.
    ///
    /// ## Examples
    ///
    /// ```
    /// # use autospec::{CooperativeScheduler, Registry, Runner, Status};
    /// # use std::cell::Cell;
    /// # use std::rc::Rc;
    /// # use std::time::Duration;
    /// let mut registry = Registry::default();
    /// registry
    ///     .latent_it("Arrives later", |scope, done| {
    ///         let arrived = Rc::new(Cell::new(0));
    ///         let slot = arrived.clone();
    ///         scope.after(Duration::from_secs(1), move || {
    ///             slot.set(42);
    ///             done.execute_with(move |scope| {
    ///                 scope.test_equal("value that arrived", arrived.get(), 42);
    ///             });
    ///         });
    ///     })
    ///     .unwrap();
    ///
    /// let records = Runner::new(&registry, CooperativeScheduler::virtual_time()).run(&["Arrives later"]);
    /// assert_eq!(records[0].status, Status::Passed);
    /// assert_eq!(records[0].messages, ["[pass] value that arrived"]);
    /// ```
    pub fn execute_with<F, R>(&self, then: F)
    where
        F: FnOnce(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        let then: Continuation = Box::new(move |scope: &mut Scope<'_>| then(scope).into_step_result());
        self.settle(Signal::Completed, Some(then));
    }

    /// Signal that the latent step has finished unsuccessfully.
    pub fn fail(&self, message: impl Into<String>) {
        self.settle(Signal::Failed(message.into()), None);
    }

    /// Whether a completion signal has fired.
    pub fn is_complete(&self) -> bool {
        !matches!(self.state.borrow().signal, Signal::Pending)
    }

    /// Current signal state.
    pub fn signal(&self) -> Signal {
        self.state.borrow().signal.clone()
    }

    /// Take the work left by [`Done::execute_with`], if any.
    pub(crate) fn take_continuation(&self) -> Option<Continuation> {
        self.state.borrow_mut().then.take()
    }

    fn settle(&self, outcome: Signal, then: Option<Continuation>) {
        let mut state = self.state.borrow_mut();
        if matches!(state.signal, Signal::Pending) {
            state.signal = outcome;
            state.then = then;
        } else {
            tracing::trace!("ignoring repeated completion signal");
        }
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Done")
            .field("signal", &state.signal)
            .field("then", &state.then.is_some())
            .finish()
    }
}

/// Result of one cooperative scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// Callbacks ran or time advanced; a suspended step may have been resumed.
    Progressed,
    /// Nothing is scheduled that could ever run; a suspended step cannot be resumed.
    Idle,
}

/// The clock/scheduler capability the engine consumes.
pub trait Scheduler {
    /// Register `callback` to run exactly once when `wake` is satisfied.
    fn schedule_resume(&mut self, wake: Wake, callback: Resume);

    /// Called when a case run suspends on `done`, before the first [`Scheduler::pump`].
    fn on_suspend(&mut self, _done: &Done) {}

    /// Called when the run stops waiting on `done`, whether it completed or stalled.
    fn on_resume(&mut self, _done: &Done) {}

    /// Called after a case's last teardown. Nothing that case scheduled may run afterwards.
    fn on_case_end(&mut self) {}

    /// Run one cooperative step.
    fn pump(&mut self) -> Pump;
}

/// How a [`CooperativeScheduler`] measures time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Time only moves when the scheduler jumps to the next due timer. Deterministic, never sleeps.
    Virtual,
    /// Real elapsed time. Pending predicates are re-polled every `poll_interval`.
    Wall { poll_interval: Duration },
}

struct Watcher {
    predicate: WakePredicate,
    callback: Resume,
}

/// Reference scheduler: a timer queue, a next-step queue and polled predicates.
///
/// Timers due at the same instant run in the order they were scheduled.
pub struct CooperativeScheduler {
    mode: ClockMode,
    origin: Instant,
    virtual_now: Duration,
    timeout: Option<Duration>,
    /// Key of the timeout timer armed for the current suspension.
    timeout_timer: Option<(Duration, u64)>,
    next_seq: u64,
    timers: BTreeMap<(Duration, u64), Resume>,
    ready: VecDeque<Resume>,
    watchers: Vec<Watcher>,
}

impl CooperativeScheduler {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            origin: Instant::now(),
            virtual_now: Duration::ZERO,
            timeout: None,
            timeout_timer: None,
            next_seq: 0,
            timers: BTreeMap::new(),
            ready: VecDeque::new(),
            watchers: Vec::new(),
        }
    }

    /// A deterministic scheduler driven by virtual time.
    pub fn virtual_time() -> Self {
        Self::new(ClockMode::Virtual)
    }

    /// A scheduler driven by the wall clock.
    pub fn wall_clock() -> Self {
        Self::new(ClockMode::Wall {
            poll_interval: Duration::from_millis(10),
        })
    }

    /// Fail any suspended step that has not completed `timeout` after suspending.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Time elapsed on this scheduler's clock.
    pub fn now(&self) -> Duration {
        match self.mode {
            ClockMode::Virtual => self.virtual_now,
            ClockMode::Wall { .. } => self.origin.elapsed(),
        }
    }

    /// Number of callbacks still waiting to run.
    pub fn pending(&self) -> usize {
        self.timers.len() + self.ready.len() + self.watchers.len()
    }

    fn push_timer(&mut self, due: Duration, callback: Resume) -> (Duration, u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert((due, seq), callback);
        (due, seq)
    }

    fn run_ready(&mut self) -> bool {
        // Callbacks scheduled while draining wait for the next step.
        let batch = std::mem::take(&mut self.ready);
        let ran = !batch.is_empty();
        for callback in batch {
            callback();
        }
        ran
    }

    fn run_watchers(&mut self) -> bool {
        let mut fired = Vec::new();
        let mut waiting = Vec::with_capacity(self.watchers.len());
        for mut watcher in std::mem::take(&mut self.watchers) {
            if (watcher.predicate)() {
                fired.push(watcher.callback);
            } else {
                waiting.push(watcher);
            }
        }
        // Keep anything registered by a predicate while polling.
        waiting.append(&mut self.watchers);
        self.watchers = waiting;

        let ran = !fired.is_empty();
        for callback in fired {
            callback();
        }
        ran
    }

    fn run_due_timers(&mut self) {
        let now = self.now();
        while let Some(entry) = self.timers.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let callback = entry.remove();
            callback();
        }
    }
}

impl Default for CooperativeScheduler {
    fn default() -> Self {
        Self::virtual_time()
    }
}

impl fmt::Debug for CooperativeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooperativeScheduler")
            .field("mode", &self.mode)
            .field("now", &self.now())
            .field("timeout", &self.timeout)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Scheduler for CooperativeScheduler {
    fn schedule_resume(&mut self, wake: Wake, callback: Resume) {
        match wake {
            Wake::NextStep => self.ready.push_back(callback),
            Wake::After(delay) => {
                let due = self.now() + delay;
                self.push_timer(due, callback);
            }
            Wake::When(predicate) => self.watchers.push(Watcher { predicate, callback }),
        }
    }

    fn on_suspend(&mut self, done: &Done) {
        if let Some(timeout) = self.timeout {
            let done = done.clone();
            let due = self.now() + timeout;
            let key = self.push_timer(
                due,
                Box::new(move || done.fail(format!("latent step timed out after {}ms", timeout.as_millis()))),
            );
            self.timeout_timer = Some(key);
        }
    }

    fn on_resume(&mut self, _done: &Done) {
        if let Some(key) = self.timeout_timer.take() {
            self.timers.remove(&key);
        }
    }

    fn on_case_end(&mut self) {
        let dropped = self.pending();
        if dropped > 0 {
            tracing::debug!(dropped, "dropping callbacks left by finished case");
        }
        self.timers.clear();
        self.ready.clear();
        self.watchers.clear();
        self.timeout_timer = None;
    }

    fn pump(&mut self) -> Pump {
        let ran_ready = self.run_ready();
        let ran_watchers = self.run_watchers();
        if ran_ready || ran_watchers {
            return Pump::Progressed;
        }

        let next_due = self.timers.keys().next().map(|(due, _)| *due);
        match (self.mode, next_due) {
            (ClockMode::Virtual, Some(due)) => {
                self.virtual_now = self.virtual_now.max(due);
                self.run_due_timers();
                Pump::Progressed
            }
            (ClockMode::Virtual, None) => Pump::Idle,
            (ClockMode::Wall { poll_interval }, due) => {
                if due.is_none() && self.watchers.is_empty() {
                    return Pump::Idle;
                }
                let now = self.now();
                let mut wait = due.map_or(poll_interval, |due| due.saturating_sub(now));
                if !self.watchers.is_empty() {
                    wait = wait.min(poll_interval);
                }
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
                self.run_due_timers();
                Pump::Progressed
            }
        }
    }
}
