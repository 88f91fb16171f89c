// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Forwarding calls on to a proxied service once it registers, and the
//! `load`/`shutdown` hooks a proxied manager uses to register itself with
//! the main server it forwards through.

use std::future::Future;
use std::time::Duration;

use conclave_api::{CallMetadata, ResultCode, RpcError, RpcResult};
use conclave_client::Client;
use conclave_ore::now::Now;

use crate::registry::ServiceRegistry;

/// Polls [`ServiceRegistry`] until a name is bound to a live `(host, port)`
/// and forwards a call there, or gives up with
/// [`ResultCode::ErrorProxyUnregistered`] once `timeout` elapses.
pub struct ProxyDispatcher {
    registry: std::sync::Arc<ServiceRegistry>,
    now: Now,
    poll_interval: Duration,
    timeout: Option<Duration>,
    main_host: String,
}

impl ProxyDispatcher {
    /// `main_host` is `rpc-main-host`'s resolved value, substituted for a
    /// registered proxy's host whenever that host is empty (a service
    /// registered with only a port, per `server.py`'s
    /// `proxy_host if len(proxy_host) else RpcStaticConfig.MAIN_HOST`).
    pub fn new(registry: std::sync::Arc<ServiceRegistry>, now: Now, timeout: Option<Duration>, main_host: impl Into<String>) -> Self {
        ProxyDispatcher {
            registry,
            now,
            poll_interval: Duration::from_millis(500),
            timeout,
            main_host: main_host.into(),
        }
    }

    /// Waits for `name` to have a live proxy target, then calls `forward`
    /// with a transient client connected to it. The client inherits
    /// `caller`'s metadata, tagging the caller as "(proxied)" and disabling
    /// `raise_on_non_ok` so a peer's own embedded error is returned to
    /// `forward` verbatim rather than raised locally.
    pub async fn dispatch<T, F, Fut>(&self, name: &str, caller: &CallMetadata, forward: F) -> RpcResult<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        let started = self.now.now();
        loop {
            if let Some((host, port)) = self.registry.proxy_target(name) {
                let host = effective_host(&host, &self.main_host);
                let port: u16 = port.try_into().map_err(|_| RpcError::new(ResultCode::ErrorModelInvalid, format!("invalid proxy port for {name}: {port}")))?;
                let client = Client::connect_inherited(host, port, caller, caller.api_version, self.timeout);
                return forward(client).await;
            }

            let elapsed = self.now.now().saturating_sub(started);
            if self.timeout.map(|t| elapsed >= t.as_millis() as u64).unwrap_or(true) {
                return Err(RpcError::new(ResultCode::ErrorProxyUnregistered, format!("no proxy registered for {name}")));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// A registered proxy's host, falling back to the main server's host when
/// the peer registered with a port only (`server.py`'s `proxy_host if
/// len(proxy_host) else RpcStaticConfig.MAIN_HOST`).
pub(crate) fn effective_host<'a>(host: &'a str, main_host: &'a str) -> &'a str {
    if host.is_empty() {
        main_host
    } else {
        host
    }
}

/// The hooks a proxied built-in service's manager runs on `load`/`shutdown`:
/// registering with, and unregistering from, the main server it forwards
/// through.
pub struct RpcProxiedManager {
    names: Vec<String>,
    version: String,
}

impl RpcProxiedManager {
    pub fn new(names: Vec<String>, version: impl Into<String>) -> Self {
        RpcProxiedManager { names, version: version.into() }
    }

    pub async fn register(&self, client: &Client, host: &str, port: u32) -> RpcResult<()> {
        client.srv().proxy_register(self.names.clone(), self.version.clone(), host.to_owned(), port).await?;
        Ok(())
    }

    pub async fn forget(&self, client: &Client) {
        if let Err(e) = client.srv().proxy_forget(self.names.clone()).await {
            tracing::warn!(error = %e, names = ?self.names, "failed to unregister proxy on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ApiVersionBounds;
    use conclave_ore::folders::Folders;
    use std::sync::Arc;

    fn registry(tmp: &std::path::Path) -> Arc<ServiceRegistry> {
        Arc::new(ServiceRegistry::new(Folders::new(tmp.join("s"), tmp.join("u"), tmp.join("w"))).unwrap())
    }

    #[tokio::test]
    async fn dispatch_fails_fast_when_timeout_is_none_and_unregistered() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        reg.register("proxied", "0.0.0", ApiVersionBounds { supported: 0, current: 0 }, true);

        let proxy = ProxyDispatcher::new(reg, Now::system(), None, "localhost");
        let caller = CallMetadata::new("c", "u", "h", "i", 0);
        let result = proxy.dispatch::<(), _, _>("proxied", &caller, |_client| async { Ok(()) }).await;
        assert_eq!(result.unwrap_err().code, i32::from(ResultCode::ErrorProxyUnregistered));
    }

    #[tokio::test]
    async fn dispatch_forwards_once_registered() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        reg.register("proxied", "0.0.0", ApiVersionBounds { supported: 0, current: 0 }, true);
        reg.proxy_register(&["proxied".to_owned()], "1", "localhost", 1234).unwrap();

        let proxy = ProxyDispatcher::new(reg, Now::system(), None, "localhost");
        let caller = CallMetadata::new("c", "u", "h", "i", 0);
        let result = proxy.dispatch::<i32, _, _>("proxied", &caller, |_client| async { Ok(7) }).await.unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn dispatch_succeeds_when_registered_with_a_port_only() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        reg.register("proxied", "0.0.0", ApiVersionBounds { supported: 0, current: 0 }, true);
        // Registered with a port only, the way a peer that never learned
        // its own externally-reachable hostname would register itself.
        reg.proxy_register(&["proxied".to_owned()], "1", "", 1234).unwrap();

        let proxy = ProxyDispatcher::new(reg, Now::system(), None, "main.example");
        let caller = CallMetadata::new("c", "u", "h", "i", 0);
        let result = proxy.dispatch::<i32, _, _>("proxied", &caller, |_client| async { Ok(7) }).await.unwrap();
        assert_eq!(result, 7);
    }

    #[test]
    fn effective_host_falls_back_to_main_host_only_when_empty() {
        assert_eq!(effective_host("", "main.example"), "main.example");
        assert_eq!(effective_host("peer.example", "main.example"), "peer.example");
    }
}
