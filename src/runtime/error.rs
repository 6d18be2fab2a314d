// SPDX-License-Identifier: MIT

//! Common error type.
//!
//! Only failures on the parent's side of the process boundary show up here.
//! A child that fails during setup exits with a reserved status instead, and
//! a binary that cannot be resolved is reported as `ExitResult::NotFound`.

use std::ffi::NulError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpawnError>;

#[derive(Error, Debug)]
pub enum SpawnError {
    /// Logging was requested, but the descriptor map does not carry both
    /// stdout and stderr.
    #[error("logging requires descriptors 1 and 2 in the descriptor map")]
    MissingLogStreams,

    #[error("log utility not found: {0}")]
    LogUtilityNotFound(String),

    #[error("argument contains an interior NUL byte: {0}")]
    InvalidArgument(#[from] NulError),

    /// A system call in the parent failed.
    #[error("{op} failed: {source}")]
    Sys {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl SpawnError {
    #[cfg(target_os = "linux")]
    pub(crate) fn sys(op: &'static str, errno: nix::errno::Errno) -> Self {
        SpawnError::Sys {
            op,
            source: errno.into(),
        }
    }
}
