// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Build metadata shared by every conclave binary.
//!
//! A [`BuildInfo`] is baked into the binary at compile time (via
//! [`compile_time_run`]) and surfaces through the `srv.info` RPC as each
//! service's `version` field.

use std::fmt;

use semver::Version as SemverVersion;

/// Static build metadata for a conclave binary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildInfo {
    /// The crate version, as set in `Cargo.toml`.
    pub version: &'static str,
    /// The git SHA this binary was built from.
    pub sha: &'static str,
    /// The UTC timestamp this binary was built at.
    pub time: &'static str,
    /// The Rust target triple this binary was built for.
    pub target_triple: &'static str,
}

impl BuildInfo {
    /// Parses [`BuildInfo::version`] as a [`semver::Version`].
    ///
    /// Panics if the crate version is not valid semver, which would indicate
    /// a packaging bug.
    pub fn semver_version(&self) -> SemverVersion {
        self.version
            .parse()
            .expect("build version is always valid semver")
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.version, self.sha, self.time)
    }
}

/// Builds a [`BuildInfo`] constant from the current crate's metadata.
///
/// A binary crate calls this once, near its `main`, and threads the value
/// through to every manager that needs to report a version.
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::BuildInfo {
            version: env!("CARGO_PKG_VERSION"),
            sha: $crate::__private::run_command_str!(
                "sh",
                "-c",
                r#"git rev-parse --verify HEAD 2>/dev/null || echo "unknown""#
            ),
            time: $crate::__private::run_command_str!("date", "-u", "+%Y-%m-%dT%H:%M:%SZ"),
            target_triple: env!("TARGET_TRIPLE"),
        }
    };
}

#[doc(hidden)]
pub mod __private {
    pub use compile_time_run::run_command_str;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_INFO: BuildInfo = BuildInfo {
        version: "1.2.3",
        sha: "deadbeef",
        time: "2024-01-01T00:00:00Z",
        target_triple: "x86_64-unknown-linux-gnu",
    };

    #[test]
    fn semver_version_parses() {
        assert_eq!(TEST_INFO.semver_version(), SemverVersion::new(1, 2, 3));
    }

    #[test]
    fn display_includes_sha() {
        assert_eq!(TEST_INFO.to_string(), "1.2.3 (deadbeef, 2024-01-01T00:00:00Z)");
    }
}
