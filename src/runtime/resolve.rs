// SPDX-License-Identifier: MIT

//! Find the executable to run.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use nix::unistd::{AccessFlags, access};
use tracing::debug;

use crate::runtime::config::SystemPaths;

/// Resolve the program to an absolute path of an executable regular file.
///
/// An absolute path that already names an executable file is returned as-is.
/// Otherwise, if `path_lookup` is set, `dir/program` is tried for each
/// directory of the configured search path in order, even when the program
/// has a directory part of its own.  Returns None when nothing matches.
pub fn resolve_binary(program: &OsStr, paths: &SystemPaths, path_lookup: bool) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.is_absolute() && is_executable_file(candidate) {
        return Some(candidate.to_path_buf());
    }
    if !path_lookup {
        debug!(program = %candidate.display(), "path lookup disabled");
        return None;
    }
    if candidate.components().count() > 1 {
        // `which` resolves these against a working directory instead of the
        // search path.
        let found = paths
            .search_dirs()
            .map(|dir| Path::new(dir).join(candidate))
            .find(|path| is_executable_file(path));
        if found.is_none() {
            debug!(program = %candidate.display(), "binary not found");
        }
        return found;
    }
    match which::which_in(program, Some(&paths.search_path), "/") {
        Ok(found) => Some(found),
        Err(e) => {
            debug!(program = %candidate.display(), error = %e, "binary not found");
            None
        }
    }
}

/// True if the path is a regular file the current credentials may execute.
pub fn is_executable_file(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) if meta.is_file() => access(path, AccessFlags::X_OK).is_ok(),
        _ => false,
    }
}
