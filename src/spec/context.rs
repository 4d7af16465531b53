//! Per-case member table shared between a case and the hooks wrapping it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Named, typed scratch values for one `before_each` → case → `after_each` cycle.
///
/// The engine allocates a fresh context for every case run, so nothing written here can leak into a sibling case.
#[derive(Default)]
pub struct ExecutionContext {
    members: HashMap<String, Box<dyn Any>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`, replacing any previous value of any type.
    pub fn set<T: Any>(&mut self, name: impl Into<String>, value: T) {
        self.members.insert(name.into(), Box::new(value));
    }

    /// Borrow the value under `name` if it exists and has type `T`.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.members.get(name).and_then(|value| value.downcast_ref::<T>())
    }

    /// Mutably borrow the value under `name` if it exists and has type `T`.
    pub fn get_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.members.get_mut(name).and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove and return the value under `name` if it has type `T`. A value of another type is left in place.
    pub fn take<T: Any>(&mut self, name: &str) -> Option<T> {
        if !self.members.get(name).is_some_and(|value| value.is::<T>()) {
            return None;
        }
        self.members
            .remove(name)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Remove the value under `name`, whatever its type.
    pub fn remove(&mut self, name: &str) -> bool {
        self.members.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.members.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ExecutionContext").field("members", &names).finish()
    }
}
