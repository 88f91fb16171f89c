// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Resolves the `user`/`host`/`ip` fields a [`CallMetadata`] stamps on every
//! outgoing call, the way the original client does at construction time
//! rather than per-call.

use conclave_api::CallMetadata;
use conclave_ore::netio::local_ip;

/// Builds metadata for `caller` talking to a peer at API version
/// `api_version`, resolving the local user, hostname, and outbound IP once.
pub fn resolve(caller: &str, api_version: i32) -> CallMetadata {
    CallMetadata::new(caller, current_user(), current_host(), local_ip().to_string(), api_version)
}

fn current_user() -> String {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_else(|_| "unknown".to_owned())
}

fn current_host() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_never_panics_and_carries_api_version() {
        let meta = resolve("demo", 3);
        assert_eq!(meta.client, "demo");
        assert_eq!(meta.api_version, 3);
        assert!(!meta.host.is_empty());
    }
}
