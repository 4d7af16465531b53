//! Parametrized case expansion.
//!
//! A parametrized case is declared with a generator of `(display name, parameter)` pairs and one body. Expansion
//! runs the generator exactly once, before anything executes, and binds each parameter into its own
//! [`CaseInstance`]. The parameter type is opaque to the harness: the body alone decides how to interpret it, and a
//! malformed parameter is the body's assertion failure, not an engine fault.

use std::collections::HashSet;
use std::rc::Rc;

use crate::config::HarnessConfig;
use crate::errors::{IntoStepResult, SpecError, SpecResult};

use super::{CaseInstance, Scope, Step};

/// Expand a parametrized case at `template_path` into its ordered instances.
///
/// ## Parameters
/// - `config`: supplies the path separator.
/// - `template_path`: full path of the parametrized case.
/// - `generator`: produces every `(display name, parameter)` pair, in order.
/// - `body`: shared body; each instance calls it with its own parameter.
///
/// ## Returns
/// - The instances in generation order, or [`SpecError`] if a display name is empty or repeated.
pub fn expand_instances<P, G, I, N, F, R>(
    config: &HarnessConfig,
    template_path: &str,
    generator: G,
    body: F,
) -> SpecResult<Vec<CaseInstance>>
where
    P: 'static,
    G: FnOnce() -> I,
    I: IntoIterator<Item = (N, P)>,
    N: Into<String>,
    F: Fn(&mut Scope<'_>, &P) -> R + 'static,
    R: IntoStepResult,
{
    let body = Rc::new(body);
    let mut seen = HashSet::new();
    let mut instances = Vec::new();

    for (name, payload) in generator() {
        let name = name.into();
        if name.is_empty() {
            return Err(SpecError::EmptyName {
                scope: format!("parametrized case '{template_path}'"),
            });
        }
        if !seen.insert(name.clone()) {
            return Err(SpecError::DuplicateName {
                name,
                scope: format!("parametrized case '{template_path}'"),
            });
        }

        let shared = Rc::clone(&body);
        let step = Step::Sync(Rc::new(move |scope: &mut Scope<'_>| {
            shared(scope, &payload).into_step_result()
        }));
        instances.push(CaseInstance {
            path: config.join(template_path, &name),
            name,
            body: step,
        });
    }

    tracing::debug!(template = template_path, instances = instances.len(), "expanded parametrized case");
    Ok(instances)
}
