// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! The three directories every conclave server reads and writes
//! configuration, logs, and other persisted state from.

use std::io;
use std::path::{Path, PathBuf};

/// System, user, and workspace directories, in ascending order of
/// precedence for anything layered (config overrides, most recently).
///
/// `system` typically ships with an install and is treated as read-mostly;
/// `user` holds a single operator's overrides; `workspace` is specific to
/// one running instance and is where persisted runtime state (config
/// overrides, proxy registrations, event queues) actually gets written.
#[derive(Clone, Debug)]
pub struct Folders {
    system: PathBuf,
    user: PathBuf,
    workspace: PathBuf,
}

impl Folders {
    pub fn new(system: impl Into<PathBuf>, user: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Folders {
            system: system.into(),
            user: user.into(),
            workspace: workspace.into(),
        }
    }

    pub fn system(&self) -> &Path {
        &self.system
    }

    pub fn user(&self) -> &Path {
        &self.user
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Creates the workspace directory if it does not already exist.
    /// System and user directories are never created on a caller's behalf:
    /// a missing one just means that layer contributes nothing.
    pub fn ensure_workspace(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.workspace)
    }

    pub fn system_file(&self, name: &str) -> PathBuf {
        self.system.join(name)
    }

    pub fn user_file(&self, name: &str) -> PathBuf {
        self.user.join(name)
    }

    pub fn workspace_file(&self, name: &str) -> PathBuf {
        self.workspace.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_workspace_creates_missing_dirs() {
        let tmp = tempfile_dir();
        let folders = Folders::new(tmp.join("sys"), tmp.join("usr"), tmp.join("ws/nested"));
        folders.ensure_workspace().unwrap();
        assert!(folders.workspace().is_dir());
        assert!(!folders.system().exists());
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("conclave-ore-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }
}
