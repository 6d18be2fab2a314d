// SPDX-License-Identifier: MIT

//! General model for spawning child processes and reporting their outcome.

use std::{collections::HashMap, ffi::OsString, fmt, path::PathBuf};

/// Raw descriptor number, as seen in either the parent or the child.
pub type RawFd = i32;

/// The command to run.  The first argument is the program name or path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<OsString>,
}

impl Command {
    /// Start a command with just the program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Command {
            args: vec![program.into()],
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build a command from an argument list.  Returns None for an empty list.
    pub fn from_args<I, S>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if args.is_empty() {
            None
        } else {
            Some(Command { args })
        }
    }

    /// Split a command line on whitespace.  No quoting rules apply.
    pub fn parse(line: &str) -> Option<Self> {
        Self::from_args(line.split_whitespace())
    }

    pub fn program(&self) -> &OsString {
        &self.args[0]
    }

    /// Everything after the program.
    pub fn arguments(&self) -> &[OsString] {
        &self.args[1..]
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Describes which parent descriptor the child sees at each slot.
///
/// The entries are an ordered list of `(target, source)` pairs: the child
/// observes the parent's `source` descriptor at position `target`.  Each
/// target appears at most once.  By default, STDIN, STDOUT, and STDERR are
/// inherited as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorMap {
    entries: Vec<(RawFd, RawFd)>,
}

impl DescriptorMap {
    /// A map with no entries; the child starts with every descriptor closed.
    pub fn empty() -> Self {
        DescriptorMap {
            entries: Vec::new(),
        }
    }

    /// Inherit stdin, stdout and stderr unchanged.
    pub fn std() -> Self {
        DescriptorMap {
            entries: vec![(0, 0), (1, 1), (2, 2)],
        }
    }

    /// Construct from `(target, source)` pairs.  A later pair for the same
    /// target replaces the earlier one.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (RawFd, RawFd)>) -> Self {
        let mut map = Self::empty();
        for (target, source) in pairs {
            map.set(target, source);
        }
        map
    }

    /// Construct from a target -> source map.
    pub fn from_map(map: HashMap<RawFd, RawFd>) -> Self {
        let mut pairs: Vec<(RawFd, RawFd)> = map.into_iter().collect();
        pairs.sort_unstable();
        DescriptorMap { entries: pairs }
    }

    /// Make the child see `source` at `target`, replacing any earlier entry.
    pub fn set(&mut self, target: RawFd, source: RawFd) -> &mut Self {
        match self.entries.iter_mut().find(|(t, _)| *t == target) {
            Some(entry) => entry.1 = source,
            None => self.entries.push((target, source)),
        }
        self
    }

    pub fn get(&self, target: RawFd) -> Option<RawFd> {
        self.entries
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, s)| *s)
    }

    pub fn contains(&self, target: RawFd) -> bool {
        self.get(target).is_some()
    }

    pub fn entries(&self) -> &[(RawFd, RawFd)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DescriptorMap {
    fn default() -> Self {
        Self::std()
    }
}

/// Describes how to launch the command.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// The complete environment of the child.  Nothing is inherited.
    pub env: HashMap<OsString, OsString>,
    /// Descriptor mapping; `None` inherits stdin, stdout and stderr.
    pub fds: Option<DescriptorMap>,
    /// Hand the process handles to the caller instead of waiting.
    pub return_handles: bool,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Supplementary groups.
    pub groups: Option<Vec<u32>>,
    pub umask: Option<u32>,
    /// Copy the command's stdout and stderr into this file as well.
    pub log_file: Option<PathBuf>,
    /// Search the configured path when the program is not an absolute path
    /// to an executable.
    pub path_lookup: bool,
    /// The program name the child reports as its first argument.
    pub name: Option<OsString>,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        SpawnConfig {
            env: HashMap::new(),
            fds: None,
            return_handles: false,
            uid: None,
            gid: None,
            groups: None,
            umask: None,
            log_file: None,
            path_lookup: true,
            name: None,
        }
    }
}

impl SpawnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_fds(mut self, fds: DescriptorMap) -> Self {
        self.fds = Some(fds);
        self
    }

    pub fn return_handles(mut self, value: bool) -> Self {
        self.return_handles = value;
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn groups(mut self, groups: Vec<u32>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn umask(mut self, umask: u32) -> Self {
        self.umask = Some(umask);
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn path_lookup(mut self, value: bool) -> Self {
        self.path_lookup = value;
        self
    }

    pub fn name(mut self, name: impl Into<OsString>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// An operating system process identifier for a spawned child.
///
/// Whoever holds the handle of a running process is responsible for
/// collecting its exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    pid: i32,
}

impl ProcessHandle {
    pub(crate) fn from_raw(pid: i32) -> Self {
        ProcessHandle { pid }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pid)
    }
}

/// Normalized outcome of a process or a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitResult {
    Success,
    /// Non-zero exit code of the process.
    Exited(i32),
    /// The process was terminated by this signal number.
    Signaled(i32),
    /// The binary could not be resolved; nothing was started.
    NotFound,
}

impl ExitResult {
    /// The integer encoding: 0 for success, the exit code, the signal number
    /// shifted left by 8, or -1 when the binary was not found.
    pub fn code(&self) -> i32 {
        match self {
            ExitResult::Success => 0,
            ExitResult::Exited(code) => *code,
            ExitResult::Signaled(signal) => signal << 8,
            ExitResult::NotFound => -1,
        }
    }

    /// Decode the integer form.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitResult::Success,
            -1 => ExitResult::NotFound,
            c if c > 0xff && c & 0xff == 0 => ExitResult::Signaled(c >> 8),
            c => ExitResult::Exited(c),
        }
    }

    pub(crate) fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            ExitResult::Success
        } else {
            ExitResult::Exited(code)
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitResult::Success)
    }
}

impl fmt::Display for ExitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitResult::Success => f.write_str("success"),
            ExitResult::Exited(code) => write!(f, "exited with code {code}"),
            ExitResult::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            ExitResult::NotFound => f.write_str("binary not found"),
        }
    }
}

/// What a spawn request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// The command ran to completion, or could not be started at all.
    Finished(ExitResult),
    /// The processes that were created, in creation order.  The log copier
    /// (if any) comes first, the command itself last.
    Running(Vec<ProcessHandle>),
}

impl SpawnOutcome {
    pub fn exit_result(&self) -> Option<ExitResult> {
        match self {
            SpawnOutcome::Finished(r) => Some(*r),
            SpawnOutcome::Running(_) => None,
        }
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        match self {
            SpawnOutcome::Finished(_) => &[],
            SpawnOutcome::Running(h) => h,
        }
    }
}
