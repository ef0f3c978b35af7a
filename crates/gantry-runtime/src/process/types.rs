//! Spawn specification for the backend process.

use std::path::PathBuf;

/// Description of how to launch the backend service.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    /// Directory the backend runs in (and where a bundled runtime lives).
    pub working_dir: PathBuf,
    /// Arguments of the main entry point (e.g. `["main.py"]`).
    pub entry: Vec<String>,
    /// Arguments of the one-shot diagnostic entry point, if any.
    pub diagnostic_entry: Option<Vec<String>>,
    /// Extra environment overrides for the child.
    pub env: Vec<(String, String)>,
    /// Explicit executable, bypassing resolution.
    pub executable: Option<PathBuf>,
}

impl BackendSpec {
    /// Create a spec for the given working directory and entry arguments.
    pub fn new(working_dir: impl Into<PathBuf>, entry: Vec<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            entry,
            diagnostic_entry: None,
            env: Vec::new(),
            executable: None,
        }
    }

    /// Enable the diagnostic variant with its own entry arguments.
    #[must_use]
    pub fn with_diagnostic_entry(mut self, args: Vec<String>) -> Self {
        self.diagnostic_entry = Some(args);
        self
    }

    /// Add an environment override for the child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Use an explicit executable instead of resolving one.
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }
}
