// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! tonic-trait adapters for the four built-in services, each threading a
//! [`Dispatch`] check through before delegating to its manager, plus the
//! `srv` service itself (`info`/`shutdown`/`proxy_register`/`proxy_forget`).
//!
//! These wrap the managers directly rather than the plain `*Service` types
//! their own crates already export: those types predate API-version
//! enforcement and in-flight tracking, and adding a dependency from
//! `conclave-config`/`conclave-logs`/`conclave-events` back onto this crate
//! to retrofit them would be circular.

use std::sync::Arc;

use conclave_api::config_service_server::ConfigService as ConfigServiceTrait;
use conclave_api::event_service_server::EventService as EventServiceTrait;
use conclave_api::logger_service_server::LoggerService as LoggerServiceTrait;
use conclave_api::pb::{
    ConfigStatus, ConfigUpdate, Empty, Event, EventFilter, EventInterrupt, EventQueueStatus, Filter, LoggerStatus, LoggerUpdate, MultiServiceInfo,
    ProxyRegisterRequest, ResultStatus, ShutdownRequest,
};
use conclave_api::rpc_server_service_server::RpcServerService as RpcServerServiceTrait;
use conclave_api::respond;
use conclave_events::EventsManager;
use conclave_logs::LogsManager;
use tonic::{Request, Response, Status};

use crate::dispatch::Dispatch;
use crate::merged_config::MergedConfigService;
use crate::registry::ServiceRegistry;
use crate::shutdown::ShutdownCoordinator;

pub struct ConfigServiceAdapter {
    merged: MergedConfigService,
    dispatch: Dispatch,
}

impl ConfigServiceAdapter {
    pub fn new(merged: MergedConfigService, dispatch: Dispatch) -> Self {
        ConfigServiceAdapter { merged, dispatch }
    }
}

#[tonic::async_trait]
impl ConfigServiceTrait for ConfigServiceAdapter {
    async fn get(&self, request: Request<Filter>) -> Result<Response<ConfigStatus>, Status> {
        let meta = request.metadata().clone();
        let filter = request.into_inner();
        let (metadata, _guard) = match self.dispatch.enter("config.get", &meta) {
            Ok(entered) => entered,
            Err(e) => return respond(Err(e)),
        };
        respond(self.merged.get(&filter.names, &metadata, filter.ignore_unknown).await.map(|items| ConfigStatus { r: None, items }))
    }

    async fn set(&self, request: Request<ConfigUpdate>) -> Result<Response<ConfigStatus>, Status> {
        let meta = request.metadata().clone();
        let updates: Vec<(String, String)> = request.into_inner().items.into_iter().map(|u| (u.name, u.value)).collect();
        let (metadata, _guard) = match self.dispatch.enter("config.set", &meta) {
            Ok(entered) => entered,
            Err(e) => return respond(Err(e)),
        };
        respond(self.merged.set(&updates, &metadata, false).await.map(|items| ConfigStatus { r: None, items }))
    }

    async fn reset(&self, request: Request<Filter>) -> Result<Response<ConfigStatus>, Status> {
        let meta = request.metadata().clone();
        let filter = request.into_inner();
        let (metadata, _guard) = match self.dispatch.enter("config.reset", &meta) {
            Ok(entered) => entered,
            Err(e) => return respond(Err(e)),
        };
        respond(self.merged.reset(&filter.names, &metadata, filter.ignore_unknown).await.map(|items| ConfigStatus { r: None, items }))
    }
}

pub struct LoggerServiceAdapter {
    manager: Arc<LogsManager>,
    dispatch: Dispatch,
}

impl LoggerServiceAdapter {
    pub fn new(manager: Arc<LogsManager>, dispatch: Dispatch) -> Self {
        LoggerServiceAdapter { manager, dispatch }
    }
}

#[tonic::async_trait]
impl LoggerServiceTrait for LoggerServiceAdapter {
    async fn get(&self, request: Request<Filter>) -> Result<Response<LoggerStatus>, Status> {
        let meta = request.metadata().clone();
        let filter = request.into_inner();
        self.dispatch.run("log.get", &meta, |_| self.manager.get(&filter).map(|items| LoggerStatus { r: None, items }))
    }

    async fn set(&self, request: Request<LoggerUpdate>) -> Result<Response<LoggerStatus>, Status> {
        let meta = request.metadata().clone();
        let update = request.into_inner();
        self.dispatch.run("log.set", &meta, |_| self.manager.set(&update).map(|items| LoggerStatus { r: None, items }))
    }

    async fn reset(&self, request: Request<Filter>) -> Result<Response<LoggerStatus>, Status> {
        let meta = request.metadata().clone();
        let filter = request.into_inner();
        self.dispatch.run("log.reset", &meta, |_| self.manager.reset(&filter).map(|items| LoggerStatus { r: None, items }))
    }
}

pub struct EventServiceAdapter {
    manager: Arc<EventsManager>,
    dispatch: Dispatch,
}

impl EventServiceAdapter {
    pub fn new(manager: Arc<EventsManager>, dispatch: Dispatch) -> Self {
        EventServiceAdapter { manager, dispatch }
    }
}

#[tonic::async_trait]
impl EventServiceTrait for EventServiceAdapter {
    type ListenStream = conclave_events::service::ListenStream;

    async fn listen(&self, request: Request<EventFilter>) -> Result<Response<Self::ListenStream>, Status> {
        let meta = request.metadata().clone();
        let filter = request.into_inner();
        let (_metadata, guard) = self.dispatch.enter("events.listen", &meta)?;
        let stream = self.manager.listen(filter)?;
        let guarded = async_stream::stream! {
            let _guard = guard;
            futures::pin_mut!(stream);
            while let Some(item) = futures::StreamExt::next(&mut stream).await {
                yield item.map_err(Status::from);
            }
        };
        Ok(Response::new(Box::pin(guarded)))
    }

    async fn send(&self, request: Request<Event>) -> Result<Response<ResultStatus>, Status> {
        let meta = request.metadata().clone();
        let event = request.into_inner();
        self.dispatch.run("events.send", &meta, |_| self.manager.send(event).map(|()| ResultStatus::ok()))
    }

    async fn interrupt(&self, request: Request<EventInterrupt>) -> Result<Response<ResultStatus>, Status> {
        let meta = request.metadata().clone();
        let interrupt = request.into_inner();
        self.dispatch.run("events.interrupt", &meta, |_| self.manager.interrupt(&interrupt).map(|()| ResultStatus::ok()))
    }

    async fn inspect(&self, request: Request<Empty>) -> Result<Response<EventQueueStatus>, Status> {
        self.dispatch
            .run("events.inspect", request.metadata(), |_| Ok(EventQueueStatus { r: None, client_ids: self.manager.inspect() }))
    }
}

/// The built-in `srv` service: process lifecycle and proxy bookkeeping.
pub struct RpcServerServiceAdapter {
    registry: Arc<ServiceRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    dispatch: Dispatch,
    shutdown_grace_default: f64,
}

impl RpcServerServiceAdapter {
    pub fn new(registry: Arc<ServiceRegistry>, shutdown: Arc<ShutdownCoordinator>, dispatch: Dispatch, shutdown_grace_default: f64) -> Self {
        RpcServerServiceAdapter { registry, shutdown, dispatch, shutdown_grace_default }
    }
}

#[tonic::async_trait]
impl RpcServerServiceTrait for RpcServerServiceAdapter {
    async fn info(&self, request: Request<Filter>) -> Result<Response<MultiServiceInfo>, Status> {
        let meta = request.metadata().clone();
        let filter = request.into_inner();
        self.dispatch
            .run("srv.info", &meta, |_| self.registry.info(&filter.names, filter.ignore_unknown).map(|items| MultiServiceInfo { r: None, items }))
    }

    async fn shutdown(&self, request: Request<ShutdownRequest>) -> Result<Response<ResultStatus>, Status> {
        let meta = request.metadata().clone();
        let timeout = request.into_inner().timeout;
        let response = self.dispatch.run("srv.shutdown", &meta, |_| Ok::<_, conclave_api::RpcError>(ResultStatus::ok()));
        let delay = ShutdownCoordinator::resolve_delay(timeout, self.shutdown_grace_default);
        self.shutdown.run_detached(delay);
        response
    }

    async fn proxy_register(&self, request: Request<ProxyRegisterRequest>) -> Result<Response<ResultStatus>, Status> {
        let meta = request.metadata().clone();
        let req = request.into_inner();
        self.dispatch
            .run("srv.proxy_register", &meta, |_| self.registry.proxy_register(&req.names, &req.version, &req.host, req.port).map(|()| ResultStatus::ok()))
    }

    async fn proxy_forget(&self, request: Request<Filter>) -> Result<Response<ResultStatus>, Status> {
        let meta = request.metadata().clone();
        let names = request.into_inner().names;
        self.dispatch.run("srv.proxy_forget", &meta, |_| self.registry.proxy_forget(&names).map(|()| ResultStatus::ok()))
    }
}
