// SPDX-License-Identifier: MIT

//! Locations of the external programs the spawner relies on.

use std::path::PathBuf;

pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_SANDBOX: &str = "/usr/bin/sandbox";
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const DEFAULT_LOG_UTILITY: &str = "tee";

/// Fixed paths consulted when building commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    /// Interpreter used by `spawn_via_shell`.
    pub shell: PathBuf,
    /// Sandbox wrapper used by `spawn_sandboxed`, when it is present.
    pub sandbox: PathBuf,
    /// Colon separated directories searched for bare program names.
    pub search_path: String,
    /// Line copier that appends to the log file and mirrors to the terminal.
    /// It must accept `-i -a <file>`.
    pub log_utility: String,
}

impl Default for SystemPaths {
    fn default() -> Self {
        SystemPaths {
            shell: PathBuf::from(DEFAULT_SHELL),
            sandbox: PathBuf::from(DEFAULT_SANDBOX),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            log_utility: DEFAULT_LOG_UTILITY.to_string(),
        }
    }
}

impl SystemPaths {
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_sandbox(mut self, sandbox: impl Into<PathBuf>) -> Self {
        self.sandbox = sandbox.into();
        self
    }

    pub fn with_search_path(mut self, search_path: impl Into<String>) -> Self {
        self.search_path = search_path.into();
        self
    }

    pub fn with_log_utility(mut self, log_utility: impl Into<String>) -> Self {
        self.log_utility = log_utility.into();
        self
    }

    /// The search path split into its directories, skipping empty entries.
    pub fn search_dirs(&self) -> impl Iterator<Item = &str> {
        self.search_path.split(':').filter(|d| !d.is_empty())
    }
}
