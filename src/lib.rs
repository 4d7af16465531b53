#![forbid(unsafe_code)]
//! autospec: a BDD-style automation spec harness.
//!
//! Specs are trees of `describe` suites holding `it` cases, `before_each`/`after_each` hooks, latent steps that
//! finish on a completion signal, and parametrized cases expanded from a generator. This crate provides the tree
//! builder and registry, the execution engine, the scheduler port latent steps resume through, result records and
//! reporters, and a CLI over the bundled demo specs.
//!
//! ```rust
//! use autospec::{CooperativeScheduler, Registry, Runner, Status};
//!
//! let mut registry = Registry::default();
//! registry
//!     .describe("Sum", |s| {
//!         s.before_each(|scope| scope.set("c", 13_i32));
//!         s.it("keeps c", |scope| {
//!             let c = scope.get::<i32>("c").copied();
//!             scope.test_equal("c", c, Some(13));
//!         });
//!     })
//!     .unwrap();
//!
//! let records = Runner::new(&registry, CooperativeScheduler::virtual_time()).run(&["Sum.keeps c"]);
//! assert_eq!(records[0].status, Status::Passed);
//! ```
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Spec bodies**: a panic inside a body or hook is caught by the engine and recorded as an error on that case;
//!   it never escapes `run`.

pub mod cli;
pub mod config;
pub mod demo;
pub mod engine;
pub mod errors;
pub mod latent;
pub mod registry;
pub mod report;
pub mod spec;
pub mod version;

pub use config::HarnessConfig;
pub use engine::{CasePhase, Runner};
pub use errors::{IntoStepResult, SpecError, SpecResult, StepResult, UnrecoverableError};
pub use latent::{ClockMode, Continuation, CooperativeScheduler, Done, Pump, Scheduler, Signal, Wake};
pub use registry::{CasePaths, Definition, Filter, Registry, SelectedCase};
pub use report::{CollectingSink, ConsoleReporter, JsonReporter, ResultRecord, ResultSink, RunSummary, Status};
pub use spec::{Scope, SuiteBuilder};
