//! Harness configuration.

/// Default path separator between suite and case names.
pub const DEFAULT_SEPARATOR: &str = ".";

/// Nesting depth past which registration logs a warning.
pub const DEFAULT_DEPTH_WARNING: usize = 32;

/// Harness configuration shared by the registry and the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Separator joining ancestor names into a full path
    pub separator: String,
    /// Hard nesting limit; `None` means unbounded
    pub max_depth: Option<usize>,
    /// Nesting depth above which a pathological tree is flagged in the log
    pub depth_warning: usize,
    /// Report every case after the first failure as skipped
    pub stop_on_fail: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            max_depth: None,
            depth_warning: DEFAULT_DEPTH_WARNING,
            stop_on_fail: false,
        }
    }
}

impl HarnessConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path separator
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Set the hard nesting limit
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the depth warning threshold
    pub fn with_depth_warning(mut self, depth: usize) -> Self {
        self.depth_warning = depth;
        self
    }

    /// Stop running cases after the first failure
    pub fn with_stop_on_fail(mut self, stop: bool) -> Self {
        self.stop_on_fail = stop;
        self
    }

    /// Join a parent path and a child name.
    pub fn join(&self, parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}{}{name}", self.separator)
        }
    }
}
