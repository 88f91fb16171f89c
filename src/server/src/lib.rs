// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Bootstraps the pieces every conclave server needs regardless of what
//! user descriptors it hosts: the config engine, the built-in `srv`,
//! `config`, `log`, and (optionally) `events` services, the in-flight call
//! tracker, the proxy registry, and the shutdown coordinator.
//!
//! tonic's `Router` changes type with every `add_service` call, which makes
//! a single generic "register N heterogeneous descriptors dynamically" API
//! impractical without reflection (precisely what [`dispatch`]'s own design
//! note steers away from). So [`Server::bootstrap`] builds everything up to
//! the point of having typed service adapters ready to hand to
//! `tonic::transport::Server::builder()`; the hosting binary does the final
//! `.add_service(...)` chain, exactly as it would with any other
//! tonic service.

pub mod dispatch;
pub mod manager;
pub mod merged_config;
pub mod proxy;
pub mod registry;
pub mod server_service;
pub mod shutdown;
#[cfg(unix)]
pub mod signal;
pub mod tracker;

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use conclave_api::{RpcError, RpcResult};
use conclave_build_info::BuildInfo;
use conclave_client::Client;
use conclave_config::{ConfigItemSpec, ConfigManager};
use conclave_events::EventsManager;
use conclave_logs::LogsManager;
use conclave_ore::folders::Folders;
use conclave_ore::now::Now;
use tower::limit::concurrency::ConcurrencyLimitLayer;

pub use dispatch::{ApiVersionBounds, Dispatch};
pub use manager::Manager;
pub use merged_config::MergedConfigService;
pub use proxy::{ProxyDispatcher, RpcProxiedManager};
pub use registry::ServiceRegistry;
pub use server_service::{ConfigServiceAdapter, EventServiceAdapter, LoggerServiceAdapter, RpcServerServiceAdapter};
pub use shutdown::ShutdownCoordinator;
pub use tracker::{CallTrace, InFlightGuard, InFlightTracker};

const SRV_NAME: &str = "srv";
const CONFIG_NAME: &str = "config";
const LOG_NAME: &str = "log";
const EVENTS_NAME: &str = "events";

/// Static metadata for a service this process will host, supplied by the
/// binary embedding `conclave-server` for every user descriptor alongside
/// the already-built tonic service it will `add_service` with.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub version: &'static str,
    pub api_versions: Vec<i32>,
    pub is_proxy: bool,
}

impl ServiceDescriptor {
    pub fn new(name: &'static str, version: &'static str, api_versions: Vec<i32>) -> Self {
        ServiceDescriptor { name, version, api_versions, is_proxy: false }
    }

    pub fn proxy(name: &'static str, version: &'static str, api_versions: Vec<i32>) -> Self {
        ServiceDescriptor { name, version, api_versions, is_proxy: true }
    }
}

/// Construction-time options, mirroring the contract in the component's
/// design: a port, folders, a CLI override map, extra static/user config
/// item sets a hosting binary wants registered alongside the framework's
/// own, and the `withEvents`/`withDebugSignal` flags.
pub struct ServerOptions {
    pub port: u16,
    pub folders: Folders,
    pub cli_overrides: HashMap<String, String>,
    pub extra_static_items: Vec<ConfigItemSpec>,
    pub extra_user_items: Vec<ConfigItemSpec>,
    pub user_descriptors: Vec<ServiceDescriptor>,
    pub with_events: bool,
    pub with_debug_signal: bool,
    pub root_log_level: conclave_api::pb::LoggerLevel,
    pub build_info: BuildInfo,
}

impl ServerOptions {
    pub fn new(port: u16, folders: Folders, build_info: BuildInfo) -> Self {
        ServerOptions {
            port,
            folders,
            cli_overrides: HashMap::new(),
            extra_static_items: Vec::new(),
            extra_user_items: Vec::new(),
            user_descriptors: Vec::new(),
            with_events: true,
            with_debug_signal: true,
            root_log_level: conclave_api::pb::LoggerLevel::LvlInfo,
            build_info,
        }
    }
}

/// Everything bootstrapped and ready for a hosting binary to add its own
/// services and start serving.
pub struct Server {
    pub config: Arc<ConfigManager>,
    pub logs: Arc<LogsManager>,
    pub events: Option<Arc<EventsManager>>,
    pub registry: Arc<ServiceRegistry>,
    pub tracker: Arc<InFlightTracker>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub auto_client: Client,
    pub listener: TcpListener,
}

impl Server {
    /// Runs the construction contract end to end: config engine, listener
    /// bind, service registration, persisted proxy state, and every
    /// non-proxy manager's `load` hook. Does not start serving; the caller
    /// assembles the final `tonic::transport::Server` and calls
    /// `serve_with_incoming` on [`Self::listener`] (converted to an async
    /// listener) themselves, then drives [`Self::shutdown`] alongside it.
    pub async fn bootstrap(options: ServerOptions) -> RpcResult<Self> {
        options.folders.ensure_workspace().map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;

        let mut static_items = conclave_config::static_config::items();
        static_items.extend(options.extra_static_items);
        let config = Arc::new(ConfigManager::new(options.folders.clone(), options.cli_overrides.clone(), static_items, options.extra_user_items)?);

        let logs = Arc::new(LogsManager::new(options.folders.clone(), options.root_log_level)?);

        let events: Option<Arc<EventsManager>> = if options.with_events {
            let mgr = Arc::new(EventsManager::new(options.folders.clone(), Arc::clone(&config), Now::system())?);
            mgr.spawn_keep_alive();
            Some(mgr)
        } else {
            None
        };

        let registry = Arc::new(ServiceRegistry::new(options.folders.clone())?);
        registry.register(SRV_NAME, env!("CARGO_PKG_VERSION"), ApiVersionBounds::from_versions(&[0]), false);
        registry.register(CONFIG_NAME, env!("CARGO_PKG_VERSION"), ApiVersionBounds::from_versions(&[0]), false);
        registry.register(LOG_NAME, env!("CARGO_PKG_VERSION"), ApiVersionBounds::from_versions(&[0]), false);
        if options.with_events {
            registry.register(EVENTS_NAME, env!("CARGO_PKG_VERSION"), ApiVersionBounds::from_versions(&[0]), false);
        }
        for descriptor in &options.user_descriptors {
            registry.register(descriptor.name, descriptor.version, ApiVersionBounds::from_versions(&descriptor.api_versions), descriptor.is_proxy);
        }
        registry.load_persisted()?;

        let listener = bind_listener(options.port)?;
        let bound_port = listener.local_addr().map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?.port();

        let max_workers = config.static_int(conclave_config::static_config::MAX_WORKERS) as usize;
        tracing::info!(
            port = bound_port,
            max_workers,
            version = options.build_info.version,
            sha = options.build_info.sha,
            "conclave server bootstrapped"
        );

        let tracker = InFlightTracker::new(Now::system());

        if options.with_debug_signal {
            #[cfg(unix)]
            {
                let dump_dir = options.folders.workspace().join(config.static_str(conclave_config::static_config::LOGS_FOLDER));
                signal::install(Arc::clone(&tracker), dump_dir, Now::system());
            }
        }

        let auto_client = Client::connect(
            "localhost",
            bound_port,
            "conclave-server (auto-client)",
            Some(Duration::from_secs(config.static_int(conclave_config::static_config::CLIENT_TIMEOUT) as u64)),
            true,
        );

        // Only the events manager owns anything worth an explicit load/shutdown
        // hook; config and logger items are read/persisted synchronously and
        // need neither.
        let mut managers: Vec<Arc<dyn Manager>> = Vec::new();
        if let Some(events) = &events {
            managers.push(events_manager_adapter(Arc::clone(events)));
        }

        for manager in &managers {
            manager.load(&auto_client).await?;
        }

        let shutdown = Arc::new(ShutdownCoordinator::new(managers));
        shutdown.set_auto_client(auto_client.clone());

        Ok(Server {
            config,
            logs,
            events,
            registry,
            tracker,
            shutdown,
            auto_client,
            listener,
        })
    }

    /// Builds the four built-in services' tonic-trait adapters, ready to
    /// `.add_service(...)` onto a `tonic::transport::Server` builder
    /// alongside whatever user services the hosting binary assembles.
    pub fn config_service(&self) -> ConfigServiceAdapter {
        let main_host = self.config.static_str(conclave_config::static_config::MAIN_HOST).to_owned();
        let merged = MergedConfigService::new(Arc::clone(&self.config), Arc::clone(&self.registry), self.proxy_timeout(), main_host);
        ConfigServiceAdapter::new(merged, self.dispatch_for(CONFIG_NAME))
    }

    pub fn logger_service(&self) -> LoggerServiceAdapter {
        LoggerServiceAdapter::new(Arc::clone(&self.logs), self.dispatch_for(LOG_NAME))
    }

    pub fn events_service(&self) -> Option<EventServiceAdapter> {
        self.events.as_ref().map(|events| EventServiceAdapter::new(Arc::clone(events), self.dispatch_for(EVENTS_NAME)))
    }

    pub fn srv_service(&self) -> RpcServerServiceAdapter {
        let shutdown_grace_default = self.config.static_float(conclave_config::static_config::SHUTDOWN_TIMEOUT);
        RpcServerServiceAdapter::new(Arc::clone(&self.registry), Arc::clone(&self.shutdown), self.dispatch_for(SRV_NAME), shutdown_grace_default)
    }

    /// A [`Dispatch`] bound to `name`'s registered API version bounds, for
    /// a user descriptor's own service adapter to use.
    pub fn dispatch_for(&self, name: &str) -> Dispatch {
        let bounds = self
            .registry
            .info(&[name.to_owned()], false)
            .map(|items| ApiVersionBounds { supported: items[0].supported_api_version, current: items[0].current_api_version })
            .unwrap_or(ApiVersionBounds { supported: 0, current: 0 });
        Dispatch::new(Arc::clone(&self.tracker), bounds)
    }

    /// A [`ProxyDispatcher`] for forwarding calls to a registered proxy
    /// service, timed out by `rpc-client-timeout`.
    pub fn proxy_dispatcher(&self) -> ProxyDispatcher {
        let main_host = self.config.static_str(conclave_config::static_config::MAIN_HOST).to_owned();
        ProxyDispatcher::new(Arc::clone(&self.registry), Now::system(), self.proxy_timeout(), main_host)
    }

    pub fn concurrency_layer(&self) -> ConcurrencyLimitLayer {
        let max_workers = self.config.static_int(conclave_config::static_config::MAX_WORKERS) as usize;
        ConcurrencyLimitLayer::new(max_workers)
    }

    fn proxy_timeout(&self) -> Option<Duration> {
        let seconds = self.config.static_float(conclave_config::static_config::CLIENT_TIMEOUT);
        if seconds > 0.0 {
            Some(Duration::from_secs_f64(seconds))
        } else {
            None
        }
    }
}

fn bind_listener(port: u16) -> RpcResult<TcpListener> {
    let addr = conclave_ore::netio::ListenAddr::inet("::", port).map_err(|e| RpcError::new(conclave_api::ResultCode::ErrorPortBusy, e.to_string()))?;
    let addr = match addr {
        conclave_ore::netio::ListenAddr::Inet(a) => a,
        #[cfg(unix)]
        conclave_ore::netio::ListenAddr::Unix(_) => unreachable!("bind_listener only ever resolves to an inet address"),
    };
    let listener = TcpListener::bind(addr).map_err(|e| RpcError::new(conclave_api::ResultCode::ErrorPortBusy, format!("failed to bind {addr}: {e}")))?;
    listener.set_nonblocking(true).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
    Ok(listener)
}

struct EventsManagerAdapter(Arc<EventsManager>);
#[async_trait::async_trait]
impl Manager for EventsManagerAdapter {
    async fn shutdown(&self) {
        self.0.shutdown().await;
    }
}
fn events_manager_adapter(manager: Arc<EventsManager>) -> Arc<dyn Manager> {
    Arc::new(EventsManagerAdapter(manager))
}
