//! Suite tree builder.
//!
//! Declarative calls made inside a `describe` closure are evaluated once, in the order written, and only capture
//! structure. Bodies are stored as deferred [`Step`]s.
//!
//! The first error (empty name, duplicate sibling, depth limit) is remembered and every later call becomes a no-op,
//! so the error surfaces from the registration that started the build and nothing half-built is kept.

use std::rc::Rc;

use crate::config::HarnessConfig;
use crate::errors::{IntoStepResult, SpecError, SpecResult};
use crate::latent::Done;

use super::{CaseNode, CaseTemplate, Node, Scope, Step, SuiteNode, expand_instances};

/// Collects the contents of one suite while its definition closure runs.
pub struct SuiteBuilder<'c> {
    config: &'c HarnessConfig,
    path: String,
    depth: usize,
    before_each: Vec<Step>,
    after_each: Vec<Step>,
    children: Vec<Node>,
    error: Option<SpecError>,
}

fn sync_step<F, R>(body: F) -> Step
where
    F: Fn(&mut Scope<'_>) -> R + 'static,
    R: IntoStepResult,
{
    Step::Sync(Rc::new(move |scope: &mut Scope<'_>| body(scope).into_step_result()))
}

fn latent_step<F, R>(body: F) -> Step
where
    F: Fn(&mut Scope<'_>, Done) -> R + 'static,
    R: IntoStepResult,
{
    Step::Latent(Rc::new(move |scope: &mut Scope<'_>, done: Done| {
        body(scope, done).into_step_result()
    }))
}

impl<'c> SuiteBuilder<'c> {
    /// A builder for the top level of the registry: no path, depth zero.
    pub(crate) fn root(config: &'c HarnessConfig) -> Self {
        Self::nested(config, String::new(), 0)
    }

    fn nested(config: &'c HarnessConfig, path: String, depth: usize) -> Self {
        Self {
            config,
            path,
            depth,
            before_each: Vec::new(),
            after_each: Vec::new(),
            children: Vec::new(),
            error: None,
        }
    }

    /// Full path of the suite being built.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn scope_label(&self) -> String {
        if self.path.is_empty() {
            "the registry".to_string()
        } else {
            format!("suite '{}'", self.path)
        }
    }

    fn record_error(&mut self, error: SpecError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Validate a child name and return the child's full path.
    fn claim(&mut self, name: &str) -> Option<String> {
        if self.error.is_some() {
            return None;
        }
        if name.is_empty() {
            let scope = self.scope_label();
            self.record_error(SpecError::EmptyName { scope });
            return None;
        }
        if self.children.iter().any(|child| child.name() == name) {
            let scope = self.scope_label();
            self.record_error(SpecError::DuplicateName {
                name: name.to_string(),
                scope,
            });
            return None;
        }
        Some(self.config.join(&self.path, name))
    }

    fn push_suite(&mut self, name: &str, disabled: bool, build: impl FnOnce(&mut SuiteBuilder<'c>)) {
        let Some(path) = self.claim(name) else {
            return;
        };
        let depth = self.depth + 1;
        if let Some(limit) = self.config.max_depth {
            if depth > limit {
                self.record_error(SpecError::DepthExceeded { path, depth, limit });
                return;
            }
        }
        if depth > self.config.depth_warning {
            tracing::warn!(path = %path, depth, "suite nesting is unusually deep");
        }

        let mut child = SuiteBuilder::nested(self.config, path, depth);
        build(&mut child);
        match child.into_suite(name, disabled) {
            Ok(suite) => self.children.push(Node::Suite(suite)),
            Err(error) => self.record_error(error),
        }
    }

    fn push_case(&mut self, name: &str, disabled: bool, body: Step) {
        let Some(path) = self.claim(name) else {
            return;
        };
        self.children.push(Node::Case(CaseNode {
            name: name.to_string(),
            path,
            disabled,
            body,
        }));
    }

    fn push_hook(&mut self, teardown: bool, hook: Step) {
        if self.error.is_some() {
            return;
        }
        if teardown {
            self.after_each.push(hook);
        } else {
            self.before_each.push(hook);
        }
    }

    // ------------------------------------------------------------------
    // Suites
    // ------------------------------------------------------------------

    /// Declare a nested suite.
    pub fn describe(&mut self, name: &str, build: impl FnOnce(&mut SuiteBuilder<'c>)) -> &mut Self {
        self.push_suite(name, false, build);
        self
    }

    /// Declare a nested suite whose whole subtree is disabled.
    pub fn x_describe(&mut self, name: &str, build: impl FnOnce(&mut SuiteBuilder<'c>)) -> &mut Self {
        self.push_suite(name, true, build);
        self
    }

    // ------------------------------------------------------------------
    // Cases
    // ------------------------------------------------------------------

    pub fn it<F, R>(&mut self, name: &str, body: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_case(name, false, sync_step(body));
        self
    }

    pub fn x_it<F, R>(&mut self, name: &str, body: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_case(name, true, sync_step(body));
        self
    }

    /// Declare a case that completes only once it signals its [`Done`].
    pub fn latent_it<F, R>(&mut self, name: &str, body: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>, Done) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_case(name, false, latent_step(body));
        self
    }

    pub fn x_latent_it<F, R>(&mut self, name: &str, body: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>, Done) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_case(name, true, latent_step(body));
        self
    }

    /// Declare a parametrized case expanded from `generator`.
    pub fn complex<P, G, I, N, F, R>(&mut self, name: &str, generator: G, body: F) -> &mut Self
    where
        P: 'static,
        G: FnOnce() -> I,
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        F: Fn(&mut Scope<'_>, &P) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_template(name, false, generator, body);
        self
    }

    pub fn x_complex<P, G, I, N, F, R>(&mut self, name: &str, generator: G, body: F) -> &mut Self
    where
        P: 'static,
        G: FnOnce() -> I,
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        F: Fn(&mut Scope<'_>, &P) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_template(name, true, generator, body);
        self
    }

    fn push_template<P, G, I, N, F, R>(&mut self, name: &str, disabled: bool, generator: G, body: F)
    where
        P: 'static,
        G: FnOnce() -> I,
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        F: Fn(&mut Scope<'_>, &P) -> R + 'static,
        R: IntoStepResult,
    {
        let Some(path) = self.claim(name) else {
            return;
        };
        match expand_instances(self.config, &path, generator, body) {
            Ok(instances) => self.children.push(Node::Template(CaseTemplate {
                name: name.to_string(),
                path,
                disabled,
                instances,
            })),
            Err(error) => self.record_error(error),
        }
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    /// Run before every case in this suite and its nested suites.
    pub fn before_each<F, R>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_hook(false, sync_step(hook));
        self
    }

    /// Run after every case in this suite and its nested suites, even when the case failed.
    pub fn after_each<F, R>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_hook(true, sync_step(hook));
        self
    }

    pub fn latent_before_each<F, R>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>, Done) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_hook(false, latent_step(hook));
        self
    }

    pub fn latent_after_each<F, R>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>, Done) -> R + 'static,
        R: IntoStepResult,
    {
        self.push_hook(true, latent_step(hook));
        self
    }

    // ------------------------------------------------------------------
    // Finishing
    // ------------------------------------------------------------------

    pub(crate) fn into_suite(self, name: &str, disabled: bool) -> SpecResult<SuiteNode> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(SuiteNode {
            name: name.to_string(),
            path: self.path,
            disabled,
            before_each: self.before_each,
            after_each: self.after_each,
            children: self.children,
        })
    }

    pub(crate) fn into_children(self) -> SpecResult<Vec<Node>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.children),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(config: &HarnessConfig, define: impl FnOnce(&mut SuiteBuilder<'_>)) -> SpecResult<Vec<Node>> {
        let mut root = SuiteBuilder::root(config);
        define(&mut root);
        root.into_children()
    }

    fn suite(node: &Node) -> &SuiteNode {
        match node {
            Node::Suite(suite) => suite,
            other => panic!("expected suite, got {}", other.kind()),
        }
    }

    #[test]
    fn test_structure_and_paths() {
        let config = HarnessConfig::default();
        let nodes = build(&config, |root| {
            root.describe("Sum", |s| {
                s.before_each(|scope: &mut Scope<'_>| scope.set("c", 13));
                s.it("first", |_: &mut Scope<'_>| {});
                s.describe("Nested", |s| {
                    s.it("check", |_: &mut Scope<'_>| {});
                });
                s.after_each(|_: &mut Scope<'_>| {});
            });
        })
        .unwrap();

        assert_eq!(nodes.len(), 1);
        let sum = suite(&nodes[0]);
        assert_eq!(sum.path(), "Sum");
        assert_eq!(sum.before_each().len(), 1);
        assert_eq!(sum.after_each().len(), 1);
        assert_eq!(sum.children()[0].path(), "Sum.first");
        let nested = suite(&sum.children()[1]);
        assert_eq!(nested.children()[0].path(), "Sum.Nested.check");
        assert!(nested.before_each().is_empty());
    }

    #[test]
    fn test_duplicate_sibling_fails() {
        let config = HarnessConfig::default();
        let err = build(&config, |root| {
            root.describe("Sum", |s| {
                s.it("same", |_: &mut Scope<'_>| {});
                s.it("same", |_: &mut Scope<'_>| {});
            });
        })
        .unwrap_err();
        assert_eq!(
            err,
            SpecError::DuplicateName {
                name: "same".to_string(),
                scope: "suite 'Sum'".to_string(),
            }
        );
    }

    #[test]
    fn test_same_name_in_different_suites_is_fine() {
        let config = HarnessConfig::default();
        let nodes = build(&config, |root| {
            root.describe("A", |s| {
                s.it("case", |_: &mut Scope<'_>| {});
            });
            root.describe("B", |s| {
                s.it("case", |_: &mut Scope<'_>| {});
            });
        })
        .unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_first_error_wins() {
        let config = HarnessConfig::default();
        let err = build(&config, |root| {
            root.describe("Suite", |s| {
                s.it("", |_: &mut Scope<'_>| {});
                s.it("dup", |_: &mut Scope<'_>| {});
                s.it("dup", |_: &mut Scope<'_>| {});
            });
        })
        .unwrap_err();
        assert_eq!(
            err,
            SpecError::EmptyName {
                scope: "suite 'Suite'".to_string()
            }
        );
    }

    #[test]
    fn test_depth_limit() {
        let config = HarnessConfig::default().with_max_depth(Some(2));
        let err = build(&config, |root| {
            root.describe("one", |s| {
                s.describe("two", |s| {
                    s.describe("three", |_| {});
                });
            });
        })
        .unwrap_err();
        assert_eq!(
            err,
            SpecError::DepthExceeded {
                path: "one.two.three".to_string(),
                depth: 3,
                limit: 2,
            }
        );
    }

    #[test]
    fn test_disabled_flags_are_kept() {
        let config = HarnessConfig::default();
        let nodes = build(&config, |root| {
            root.x_describe("Off", |s| {
                s.it("inner", |_: &mut Scope<'_>| {});
            });
            root.describe("On", |s| {
                s.x_it("skipped", |_: &mut Scope<'_>| {});
                s.x_latent_it("later", |_: &mut Scope<'_>, done: Done| done.execute());
            });
        })
        .unwrap();
        assert!(nodes[0].is_disabled());
        assert!(!nodes[1].is_disabled());
        let on = suite(&nodes[1]);
        assert!(on.children().iter().all(Node::is_disabled));
        assert!(matches!(&on.children()[1], Node::Case(case) if case.body().is_latent()));
    }

    #[test]
    fn test_complex_registers_template() {
        let config = HarnessConfig::default();
        let nodes = build(&config, |root| {
            root.describe("Grid", |s| {
                s.complex(
                    "pairs",
                    || (0..2).map(|i| (format!("row {i}"), i)),
                    |scope: &mut Scope<'_>, i: &i32| {
                        scope.test_true("non-negative", *i >= 0);
                    },
                );
            });
        })
        .unwrap();
        let grid = suite(&nodes[0]);
        let Node::Template(template) = &grid.children()[0] else {
            panic!("expected template");
        };
        assert_eq!(template.instances().len(), 2);
        assert_eq!(template.instances()[1].path(), "Grid.pairs.row 1");
        assert_eq!(grid.children()[0].leaf_count(), 2);
    }
}
