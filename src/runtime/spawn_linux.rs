// SPDX-License-Identifier: MIT

//! Forks and execs the child processes.
//! Specific to Linux.

mod fd;
mod launch;
mod pipeline;

pub(crate) use fd::max_fd_limit;
pub(crate) use launch::{Credentials, PreparedChild};
pub use launch::SetupStep;
pub(crate) use pipeline::LogPipeline;
