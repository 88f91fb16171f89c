// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! A retrying client over the stubs a conclave server exposes.
//!
//! Every call is stamped with [`CallMetadata`] and, while the target isn't
//! reachable yet, transparently retried on a fixed 500ms interval until a
//! caller-supplied timeout elapses (`None` means "fail immediately", the
//! original's encoding of "do not retry at all"). A [`Client`] is used both
//! by external callers and, internally, as the server's own auto-client: the
//! object every manager's `load`/`shutdown` hook receives to call its peers
//! uniformly, proxy or not.

mod builtin;
mod identity;
mod listener;
mod retry;

use std::time::Duration;

use conclave_api::CallMetadata;

pub use builtin::{ConfigClient, EventsClient, LoggerClient, ServerClient};
pub use listener::EventListener;
pub use retry::{RetryingClient, WithResult, RETRY_DELAY};

/// A bundle of typed accessors for the four built-in services a conclave
/// server always registers, all sharing one lazily-connecting channel to
/// `host:port`.
#[derive(Clone)]
pub struct Client {
    base: RetryingClient,
}

impl Client {
    /// Connects as `caller`, retrying `UNAVAILABLE` for up to `timeout`
    /// (`None` to fail immediately instead). A non-OK result embedded in a
    /// response is turned into an error unless `raise_on_non_ok` is false,
    /// which the proxy layer sets so it can forward a peer's error
    /// verbatim instead of unwrapping it locally.
    pub fn connect(host: &str, port: u16, caller: &str, timeout: Option<Duration>, raise_on_non_ok: bool) -> Self {
        let metadata = identity::resolve(caller, 0);
        Client {
            base: RetryingClient::connect_lazy(host, port, metadata, timeout, raise_on_non_ok),
        }
    }

    /// Builds a client that inherits an existing call's metadata instead of
    /// resolving a fresh identity, suffixing the caller tag with
    /// `(proxied)`. Used by the proxy layer when forwarding a call to a
    /// peer on the caller's behalf.
    pub fn connect_inherited(host: &str, port: u16, inherited: &CallMetadata, api_version: i32, timeout: Option<Duration>) -> Self {
        let mut metadata = inherited.clone();
        metadata.client = format!("{} (proxied)", metadata.client);
        metadata.api_version = api_version;
        Client {
            base: RetryingClient::connect_lazy(host, port, metadata, timeout, false),
        }
    }

    pub fn metadata(&self) -> &CallMetadata {
        self.base.metadata()
    }

    /// Coerces this client into a one-shot probe: retrying is disabled, so
    /// the next call fails as soon as the transport reports any error
    /// instead of waiting out a timeout. Used by the shutdown coordinator
    /// to confirm the listener has actually closed.
    pub fn into_one_shot(self) -> Self {
        Client { base: self.base.one_shot() }
    }

    pub fn srv(&self) -> ServerClient {
        ServerClient::new(self.base.clone())
    }

    pub fn config(&self) -> ConfigClient {
        ConfigClient::new(self.base.clone())
    }

    pub fn log(&self) -> LoggerClient {
        LoggerClient::new(self.base.clone())
    }

    pub fn events(&self) -> EventsClient {
        EventsClient::new(self.base.clone())
    }

    /// The shared channel/metadata/retry policy underlying every typed
    /// accessor, for a hosted service's own generated stub to reuse with
    /// its own API version (see [`RetryingClient::with_api_version`]).
    pub fn stub(&self, api_version: i32) -> RetryingClient {
        self.base.with_api_version(api_version)
    }
}
