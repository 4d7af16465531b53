//! Test registry and selection.
//!
//! The registry owns every root definition, keyed by its globally unique name, plus an index from every full path
//! (suites, cases, parametrized cases and their instances) to its place in the tree. It is filled once by a
//! `register_all`-style entry point and sealed as soon as a run starts.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::slice;

use serde::Serialize;

use crate::config::HarnessConfig;
use crate::errors::{IntoStepResult, SpecError, SpecResult};
use crate::latent::Done;
use crate::spec::{CaseInstance, Node, Scope, Step, SuiteBuilder, SuiteNode};

/// Category a root definition belongs to, used to narrow discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// Fast checks suitable for every run. Only single cases may be smoke tests.
    Smoke,
    Engine,
    #[default]
    Product,
    Perf,
    Stress,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Filter::Smoke => "smoke",
            Filter::Engine => "engine",
            Filter::Product => "product",
            Filter::Perf => "perf",
            Filter::Stress => "stress",
        };
        f.write_str(name)
    }
}

type BuildFn = Box<dyn FnOnce(&mut SuiteBuilder<'_>)>;

/// A root-level definition waiting to be registered.
pub struct Definition {
    name: String,
    filter: Filter,
    disabled: bool,
    build: BuildFn,
}

impl Definition {
    /// A suite (spec) definition.
    pub fn suite(name: impl Into<String>, build: impl FnOnce(&mut SuiteBuilder<'_>) + 'static) -> Self {
        let name = name.into();
        let key = name.clone();
        Self::from_build(name, move |root| {
            root.describe(&key, build);
        })
    }

    /// A single root-level case.
    pub fn case<F, R>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        let name = name.into();
        let key = name.clone();
        Self::from_build(name, move |root| {
            root.it(&key, body);
        })
    }

    /// A single root-level latent case.
    pub fn latent_case<F, R>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Scope<'_>, Done) -> R + 'static,
        R: IntoStepResult,
    {
        let name = name.into();
        let key = name.clone();
        Self::from_build(name, move |root| {
            root.latent_it(&key, body);
        })
    }

    /// A root-level parametrized case.
    pub fn complex<P, G, I, N, F, R>(name: impl Into<String>, generator: G, body: F) -> Self
    where
        P: 'static,
        G: FnOnce() -> I + 'static,
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        F: Fn(&mut Scope<'_>, &P) -> R + 'static,
        R: IntoStepResult,
    {
        let name = name.into();
        let key = name.clone();
        Self::from_build(name, move |root| {
            root.complex(&key, generator, body);
        })
    }

    fn from_build(name: String, build: impl FnOnce(&mut SuiteBuilder<'_>) + 'static) -> Self {
        Self {
            name,
            filter: Filter::default(),
            disabled: false,
            build: Box::new(build),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Keep the definition in the tree but report everything in it as disabled.
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Root {
    filter: Filter,
    node: Node,
}

/// Where a path lives: root index, then child indices (the last one is an instance index under a template).
#[derive(Debug, Clone)]
struct Location {
    root: usize,
    route: Vec<usize>,
}

/// One runnable case picked out of the tree, with everything the engine needs to run it.
#[derive(Debug, Clone)]
pub struct SelectedCase<'r> {
    pub path: &'r str,
    /// Enclosing suites, outermost first.
    pub ancestors: Vec<&'r SuiteNode>,
    pub body: &'r Step,
    /// The case or one of its ancestors is disabled.
    pub disabled: bool,
}

/// All registered spec trees.
pub struct Registry {
    config: HarnessConfig,
    roots: Vec<Root>,
    index: HashMap<String, Location>,
    sealed: Cell<bool>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(HarnessConfig::default())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("roots", &self.roots.len())
            .field("paths", &self.index.len())
            .field("sealed", &self.sealed.get())
            .finish()
    }
}

impl Registry {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            roots: Vec::new(),
            index: HashMap::new(),
            sealed: Cell::new(false),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Number of root definitions.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether `path` names any suite, case, parametrized case or instance.
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Refuse further registrations. Called by the runner when a run starts.
    pub fn seal(&self) {
        if !self.sealed.replace(true) {
            tracing::debug!(roots = self.roots.len(), "registry sealed");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    /// Build and add a root definition.
    ///
    /// On error the registry is left unchanged.
    #[tracing::instrument(skip_all, fields(name = %definition.name))]
    pub fn register(&mut self, definition: Definition) -> SpecResult<()> {
        let Definition {
            name,
            filter,
            disabled,
            build,
        } = definition;

        if self.is_sealed() {
            return Err(SpecError::RegistrySealed { name });
        }

        let mut builder = SuiteBuilder::root(&self.config);
        build(&mut builder);
        let mut node = builder
            .into_children()?
            .pop()
            .ok_or_else(|| SpecError::EmptyName {
                scope: "the registry".to_string(),
            })?;
        if disabled {
            node.set_disabled(true);
        }

        if filter == Filter::Smoke && !matches!(node, Node::Case(_)) {
            return Err(SpecError::InvalidFilter {
                name,
                kind: node.kind(),
                filter,
            });
        }

        let root = self.roots.len();
        let mut entries = Vec::new();
        collect_locations(&node, root, &mut Vec::new(), &mut entries);

        let mut fresh = HashSet::with_capacity(entries.len());
        for (path, _) in &entries {
            if self.index.contains_key(path) || !fresh.insert(path.as_str()) {
                return Err(SpecError::DuplicateName {
                    name: path.clone(),
                    scope: "the registry".to_string(),
                });
            }
        }

        tracing::debug!(cases = node.leaf_count(), %filter, "registered spec");
        self.index.extend(entries);
        self.roots.push(Root { filter, node });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Registration shorthands
    // ------------------------------------------------------------------

    pub fn describe(&mut self, name: &str, build: impl FnOnce(&mut SuiteBuilder<'_>) + 'static) -> SpecResult<()> {
        self.register(Definition::suite(name, build))
    }

    pub fn x_describe(&mut self, name: &str, build: impl FnOnce(&mut SuiteBuilder<'_>) + 'static) -> SpecResult<()> {
        self.register(Definition::suite(name, build).disabled())
    }

    pub fn it<F, R>(&mut self, name: &str, body: F) -> SpecResult<()>
    where
        F: Fn(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        self.register(Definition::case(name, body))
    }

    pub fn x_it<F, R>(&mut self, name: &str, body: F) -> SpecResult<()>
    where
        F: Fn(&mut Scope<'_>) -> R + 'static,
        R: IntoStepResult,
    {
        self.register(Definition::case(name, body).disabled())
    }

    pub fn latent_it<F, R>(&mut self, name: &str, body: F) -> SpecResult<()>
    where
        F: Fn(&mut Scope<'_>, Done) -> R + 'static,
        R: IntoStepResult,
    {
        self.register(Definition::latent_case(name, body))
    }

    pub fn complex<P, G, I, N, F, R>(&mut self, name: &str, generator: G, body: F) -> SpecResult<()>
    where
        P: 'static,
        G: FnOnce() -> I + 'static,
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        F: Fn(&mut Scope<'_>, &P) -> R + 'static,
        R: IntoStepResult,
    {
        self.register(Definition::complex(name, generator, body))
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Full paths of every case and parametrized instance, in registration and declaration order.
    ///
    /// The iterator is lazy; call again (or clone it) to restart.
    pub fn list_all(&self) -> CasePaths<'_> {
        CasePaths::new(&self.roots, None)
    }

    /// Like [`Registry::list_all`], restricted to roots registered with `filter`.
    pub fn list_filtered(&self, filter: Filter) -> CasePaths<'_> {
        CasePaths::new(&self.roots, Some(filter))
    }

    /// Expand a selection name into the cases it covers.
    ///
    /// A case or instance path yields itself; a suite or parametrized case yields every case beneath it in tree
    /// order. Returns `None` when nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<Vec<SelectedCase<'_>>> {
        let location = self.index.get(name)?;
        let mut node = &self.roots.get(location.root)?.node;
        let mut ancestors = Vec::new();
        let mut disabled = false;

        for &step in &location.route {
            match node {
                Node::Suite(suite) => {
                    ancestors.push(suite);
                    disabled |= suite.disabled;
                    node = suite.children.get(step)?;
                }
                Node::Template(template) => {
                    let instance = template.instances.get(step)?;
                    return Some(vec![SelectedCase {
                        path: instance.path(),
                        ancestors,
                        body: instance.body(),
                        disabled: disabled || template.disabled,
                    }]);
                }
                Node::Case(_) => return None,
            }
        }

        let mut selected = Vec::new();
        collect_cases(node, &mut ancestors, disabled, &mut selected);
        Some(selected)
    }
}

fn collect_locations(node: &Node, root: usize, route: &mut Vec<usize>, out: &mut Vec<(String, Location)>) {
    out.push((
        node.path().to_string(),
        Location {
            root,
            route: route.clone(),
        },
    ));
    match node {
        Node::Suite(suite) => {
            for (i, child) in suite.children.iter().enumerate() {
                route.push(i);
                collect_locations(child, root, route, out);
                route.pop();
            }
        }
        Node::Case(_) => {}
        Node::Template(template) => {
            for (i, instance) in template.instances.iter().enumerate() {
                route.push(i);
                out.push((
                    instance.path().to_string(),
                    Location {
                        root,
                        route: route.clone(),
                    },
                ));
                route.pop();
            }
        }
    }
}

fn collect_cases<'r>(
    node: &'r Node,
    ancestors: &mut Vec<&'r SuiteNode>,
    disabled: bool,
    out: &mut Vec<SelectedCase<'r>>,
) {
    match node {
        Node::Suite(suite) => {
            ancestors.push(suite);
            for child in &suite.children {
                collect_cases(child, ancestors, disabled || suite.disabled, out);
            }
            ancestors.pop();
        }
        Node::Case(case) => out.push(SelectedCase {
            path: case.path(),
            ancestors: ancestors.clone(),
            body: case.body(),
            disabled: disabled || case.disabled,
        }),
        Node::Template(template) => {
            for instance in &template.instances {
                out.push(SelectedCase {
                    path: instance.path(),
                    ancestors: ancestors.clone(),
                    body: instance.body(),
                    disabled: disabled || template.disabled,
                });
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Frame<'r> {
    Nodes(slice::Iter<'r, Node>),
    Instances(slice::Iter<'r, CaseInstance>),
}

enum Item<'r> {
    Node(&'r Node),
    Instance(&'r CaseInstance),
}

/// Lazy depth-first walk over case and instance paths.
#[derive(Debug, Clone)]
pub struct CasePaths<'r> {
    roots: slice::Iter<'r, Root>,
    filter: Option<Filter>,
    stack: Vec<Frame<'r>>,
}

impl<'r> CasePaths<'r> {
    fn new(roots: &'r [Root], filter: Option<Filter>) -> Self {
        Self {
            roots: roots.iter(),
            filter,
            stack: Vec::new(),
        }
    }
}

impl<'r> Iterator for CasePaths<'r> {
    type Item = &'r str;

    fn next(&mut self) -> Option<&'r str> {
        loop {
            let item = match self.stack.last_mut() {
                Some(Frame::Nodes(nodes)) => nodes.next().map(Item::Node),
                Some(Frame::Instances(instances)) => instances.next().map(Item::Instance),
                None => {
                    let filter = self.filter;
                    let root = self.roots.find(|root| filter.is_none_or(|f| f == root.filter))?;
                    Some(Item::Node(&root.node))
                }
            };
            match item {
                None => {
                    self.stack.pop();
                }
                Some(Item::Node(Node::Suite(suite))) => self.stack.push(Frame::Nodes(suite.children.iter())),
                Some(Item::Node(Node::Case(case))) => return Some(case.path()),
                Some(Item::Node(Node::Template(template))) => {
                    self.stack.push(Frame::Instances(template.instances.iter()))
                }
                Some(Item::Instance(instance)) => return Some(instance.path()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Registry {
        let mut registry = Registry::default();
        registry
            .describe("Sum", |s| {
                s.it("zero", |_| {});
                s.describe("Nested", |s| {
                    s.it("check", |_| {});
                });
                s.complex("grid", || vec![("a", 1), ("b", 2)], |_, _: &i32| {});
            })
            .unwrap();
        registry.it("Simple", |_| {}).unwrap();
        registry
    }

    #[test]
    fn test_list_all_walks_in_declaration_order() {
        let registry = sample();
        let paths: Vec<&str> = registry.list_all().collect();
        assert_eq!(
            paths,
            ["Sum.zero", "Sum.Nested.check", "Sum.grid.a", "Sum.grid.b", "Simple"]
        );
        // Restartable.
        assert_eq!(registry.list_all().count(), 5);
    }

    #[test]
    fn test_duplicate_root_rejected_and_registry_unchanged() {
        let mut registry = sample();
        let err = registry.it("Simple", |_| {}).unwrap_err();
        assert_eq!(
            err,
            SpecError::DuplicateName {
                name: "Simple".to_string(),
                scope: "the registry".to_string(),
            }
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_colliding_full_path_rejected() {
        let mut registry = sample();
        let err = registry.it("Sum.zero", |_| {}).unwrap_err();
        assert!(matches!(err, SpecError::DuplicateName { ref name, .. } if name == "Sum.zero"));
    }

    #[test]
    fn test_nested_duplicate_does_not_register_root() {
        let mut registry = Registry::default();
        let err = registry
            .describe("Broken", |s| {
                s.it("x", |_| {});
                s.it("x", |_| {});
            })
            .unwrap_err();
        assert!(matches!(err, SpecError::DuplicateName { .. }));
        assert!(registry.is_empty());
        assert!(!registry.contains("Broken"));
    }

    #[test]
    fn test_resolve_case_suite_and_template() {
        let registry = sample();

        let one = registry.resolve("Sum.Nested.check").unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].ancestors.len(), 2);
        assert_eq!(one[0].ancestors[1].path(), "Sum.Nested");

        let suite: Vec<&str> = registry.resolve("Sum").unwrap().iter().map(|c| c.path).collect();
        assert_eq!(suite, ["Sum.zero", "Sum.Nested.check", "Sum.grid.a", "Sum.grid.b"]);

        let template = registry.resolve("Sum.grid").unwrap();
        assert_eq!(template.len(), 2);

        let instance = registry.resolve("Sum.grid.b").unwrap();
        assert_eq!(instance[0].path, "Sum.grid.b");
        assert_eq!(instance[0].ancestors.len(), 1);

        assert!(registry.resolve("Sum.missing").is_none());
    }

    #[test]
    fn test_disabled_is_inherited() {
        let mut registry = Registry::default();
        registry
            .x_describe("Off", |s| {
                s.describe("Inner", |s| {
                    s.it("case", |_| {});
                });
            })
            .unwrap();
        registry
            .describe("On", |s| {
                s.x_complex("grid", || vec![("a", ())], |_, _: &()| {});
            })
            .unwrap();

        assert!(registry.resolve("Off.Inner.case").unwrap()[0].disabled);
        assert!(registry.resolve("On.grid.a").unwrap()[0].disabled);
    }

    #[test]
    fn test_smoke_filter_only_for_cases() {
        let mut registry = Registry::default();
        let err = registry
            .register(Definition::suite("Spec", |_| {}).filter(Filter::Smoke))
            .unwrap_err();
        assert_eq!(
            err,
            SpecError::InvalidFilter {
                name: "Spec".to_string(),
                kind: "suite",
                filter: Filter::Smoke,
            }
        );
        registry
            .register(Definition::case("Quick", |_| {}).filter(Filter::Smoke))
            .unwrap();
        let smoke: Vec<&str> = registry.list_filtered(Filter::Smoke).collect();
        assert_eq!(smoke, ["Quick"]);
        assert_eq!(registry.list_filtered(Filter::Product).count(), 0);
    }

    #[test]
    fn test_sealed_registry_rejects_registration() {
        let mut registry = sample();
        registry.seal();
        let err = registry.it("Late", |_| {}).unwrap_err();
        assert_eq!(
            err,
            SpecError::RegistrySealed {
                name: "Late".to_string()
            }
        );
    }

    #[test]
    fn test_empty_suite_lists_nothing() {
        let mut registry = Registry::default();
        registry.describe("Empty", |_| {}).unwrap();
        assert_eq!(registry.list_all().count(), 0);
        assert_eq!(registry.resolve("Empty").unwrap().len(), 0);
    }
}
