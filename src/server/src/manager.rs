// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! The lifecycle hooks every hosted service's backing manager participates
//! in: `load`, run once the listener is up and every service is registered,
//! and `shutdown`, run in reverse registration order while the listener is
//! draining.

use conclave_api::RpcResult;
use conclave_client::Client;

/// A manager's lifecycle hooks.
///
/// A [`crate::Server`] invokes `load` for every non-proxy manager right
/// after it builds its auto-client, passing that client so a manager can
/// call its own peers (or itself) uniformly; it invokes `shutdown` for the
/// same set, in reverse order, while draining.
///
/// Both hooks default to a no-op: most managers (the built-in config and
/// logger services, for instance) own no resources that need an explicit
/// teardown and never call out to a peer on startup.
#[async_trait::async_trait]
pub trait Manager: Send + Sync {
    async fn load(&self, _client: &Client) -> RpcResult<()> {
        Ok(())
    }

    async fn shutdown(&self) {}
}
