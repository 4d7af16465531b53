//! Spec tree model.
//!
//! A registered definition becomes an immutable tree of [`Node`]s:
//!
//! - [`SuiteNode`]: one `describe` scope with its `before_each`/`after_each` hooks and ordered children.
//! - [`CaseNode`]: one `it` case.
//! - [`CaseTemplate`]: one parametrized case, already expanded into its [`CaseInstance`]s.
//!
//! Every node carries its full path (ancestor names joined with the configured separator). Hook and case bodies are
//! stored as deferred [`Step`]s and only invoked by the engine.

mod builder;
mod context;
mod expansion;
mod scope;

pub use builder::SuiteBuilder;
pub use context::ExecutionContext;
pub use expansion::expand_instances;
pub use scope::{AssertionLog, Scope};

use std::fmt;
use std::rc::Rc;

use crate::errors::StepResult;
use crate::latent::Done;

/// A synchronous body or hook.
pub type SyncFn = dyn Fn(&mut Scope<'_>) -> StepResult;

/// A latent body or hook: it must eventually signal the [`Done`] it receives.
pub type LatentFn = dyn Fn(&mut Scope<'_>, Done) -> StepResult;

/// A deferred unit of work.
#[derive(Clone)]
pub enum Step {
    Sync(Rc<SyncFn>),
    Latent(Rc<LatentFn>),
}

impl Step {
    pub fn is_latent(&self) -> bool {
        matches!(self, Step::Latent(_))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Sync(_) => write!(f, "Step::Sync"),
            Step::Latent(_) => write!(f, "Step::Latent"),
        }
    }
}

/// One `describe` scope.
#[derive(Debug, Clone)]
pub struct SuiteNode {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) disabled: bool,
    pub(crate) before_each: Vec<Step>,
    pub(crate) after_each: Vec<Step>,
    pub(crate) children: Vec<Node>,
}

impl SuiteNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Setup hooks in declaration order.
    pub fn before_each(&self) -> &[Step] {
        &self.before_each
    }

    /// Teardown hooks in declaration order.
    pub fn after_each(&self) -> &[Step] {
        &self.after_each
    }
}

/// One `it` case.
#[derive(Debug, Clone)]
pub struct CaseNode {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) disabled: bool,
    pub(crate) body: Step,
}

impl CaseNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn body(&self) -> &Step {
        &self.body
    }
}

/// A parametrized case and its expansion.
#[derive(Debug, Clone)]
pub struct CaseTemplate {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) disabled: bool,
    pub(crate) instances: Vec<CaseInstance>,
}

impl CaseTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Instances in generation order.
    pub fn instances(&self) -> &[CaseInstance] {
        &self.instances
    }
}

/// One expansion of a [`CaseTemplate`]. Its body already has its parameter bound.
#[derive(Debug, Clone)]
pub struct CaseInstance {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) body: Step,
}

impl CaseInstance {
    /// Human-readable display name produced by the generator.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &Step {
        &self.body
    }
}

/// A node of the spec tree.
#[derive(Debug, Clone)]
pub enum Node {
    Suite(SuiteNode),
    Case(CaseNode),
    Template(CaseTemplate),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Suite(suite) => suite.name(),
            Node::Case(case) => case.name(),
            Node::Template(template) => template.name(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Node::Suite(suite) => suite.path(),
            Node::Case(case) => case.path(),
            Node::Template(template) => template.path(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        match self {
            Node::Suite(suite) => suite.disabled,
            Node::Case(case) => case.disabled,
            Node::Template(template) => template.disabled,
        }
    }

    /// Short noun used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Suite(_) => "suite",
            Node::Case(_) => "case",
            Node::Template(_) => "parametrized case",
        }
    }

    pub(crate) fn set_disabled(&mut self, disabled: bool) {
        match self {
            Node::Suite(suite) => suite.disabled = disabled,
            Node::Case(case) => case.disabled = disabled,
            Node::Template(template) => template.disabled = disabled,
        }
    }

    /// Number of runnable leaves (cases and instances) beneath this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            Node::Suite(suite) => suite.children.iter().map(Node::leaf_count).sum(),
            Node::Case(_) => 1,
            Node::Template(template) => template.instances.len(),
        }
    }
}
