// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Strongly-typed accessors for the four built-in services every conclave
//! server hosts, each a thin wrapper around a shared [`RetryingClient`].
//!
//! The original attaches generated stubs to the client object as dynamic
//! attributes named after the service; here each built-in service instead
//! gets its own accessor type, reachable off [`crate::Client`] by name.

use conclave_api::config_service_client::ConfigServiceClient;
use conclave_api::event_service_client::EventServiceClient;
use conclave_api::logger_service_client::LoggerServiceClient;
use conclave_api::pb::{
    ConfigItemUpdate, ConfigStatus, ConfigUpdate, Event, EventFilter, EventInterrupt, EventQueueStatus, EventStatus, Filter, LoggerConfig, LoggerStatus,
    LoggerUpdate, MultiServiceInfo, ProxyRegisterRequest, ResultStatus, ShutdownRequest,
};
use conclave_api::rpc_server_service_client::RpcServerServiceClient;
use conclave_api::RpcResult;
use futures::Stream;

use crate::retry::RetryingClient;

/// Accessor for the built-in `srv` service: lifecycle and proxy
/// registration.
#[derive(Clone)]
pub struct ServerClient(RetryingClient);

impl ServerClient {
    pub(crate) fn new(retry: RetryingClient) -> Self {
        ServerClient(retry)
    }

    pub async fn info(&self, names: Vec<String>) -> RpcResult<MultiServiceInfo> {
        self.0
            .unary_checked(Filter { names, ignore_unknown: false }, |ch, req| async move { RpcServerServiceClient::new(ch).info(req).await })
            .await
    }

    pub async fn shutdown(&self, timeout: i64) -> RpcResult<ResultStatus> {
        self.0
            .unary_checked(ShutdownRequest { timeout }, |ch, req| async move { RpcServerServiceClient::new(ch).shutdown(req).await })
            .await
    }

    pub async fn proxy_register(&self, names: Vec<String>, version: String, host: String, port: u32) -> RpcResult<ResultStatus> {
        self.0
            .unary_checked(ProxyRegisterRequest { names, version, host, port }, |ch, req| async move {
                RpcServerServiceClient::new(ch).proxy_register(req).await
            })
            .await
    }

    pub async fn proxy_forget(&self, names: Vec<String>) -> RpcResult<ResultStatus> {
        self.0
            .unary_checked(Filter { names, ignore_unknown: false }, |ch, req| async move { RpcServerServiceClient::new(ch).proxy_forget(req).await })
            .await
    }
}

/// Accessor for the built-in `config` service.
#[derive(Clone)]
pub struct ConfigClient(RetryingClient);

impl ConfigClient {
    pub(crate) fn new(retry: RetryingClient) -> Self {
        ConfigClient(retry)
    }

    pub async fn get(&self, names: Vec<String>) -> RpcResult<ConfigStatus> {
        self.0
            .unary_checked(Filter { names, ignore_unknown: false }, |ch, req| async move { ConfigServiceClient::new(ch).get(req).await })
            .await
    }

    pub async fn set(&self, items: Vec<ConfigItemUpdate>) -> RpcResult<ConfigStatus> {
        self.0
            .unary_checked(ConfigUpdate { items }, |ch, req| async move { ConfigServiceClient::new(ch).set(req).await })
            .await
    }

    pub async fn reset(&self, names: Vec<String>) -> RpcResult<ConfigStatus> {
        self.0
            .unary_checked(Filter { names, ignore_unknown: false }, |ch, req| async move { ConfigServiceClient::new(ch).reset(req).await })
            .await
    }
}

/// Accessor for the built-in `log` service.
#[derive(Clone)]
pub struct LoggerClient(RetryingClient);

impl LoggerClient {
    pub(crate) fn new(retry: RetryingClient) -> Self {
        LoggerClient(retry)
    }

    pub async fn get(&self, names: Vec<String>) -> RpcResult<LoggerStatus> {
        self.0
            .unary_checked(Filter { names, ignore_unknown: false }, |ch, req| async move { LoggerServiceClient::new(ch).get(req).await })
            .await
    }

    pub async fn set(&self, items: Vec<LoggerConfig>) -> RpcResult<LoggerStatus> {
        self.0
            .unary_checked(LoggerUpdate { items }, |ch, req| async move { LoggerServiceClient::new(ch).set(req).await })
            .await
    }

    pub async fn reset(&self, names: Vec<String>) -> RpcResult<LoggerStatus> {
        self.0
            .unary_checked(Filter { names, ignore_unknown: false }, |ch, req| async move { LoggerServiceClient::new(ch).reset(req).await })
            .await
    }
}

/// Accessor for the optional built-in `events` service.
#[derive(Clone)]
pub struct EventsClient(RetryingClient);

impl EventsClient {
    pub(crate) fn new(retry: RetryingClient) -> Self {
        EventsClient(retry)
    }

    pub async fn listen(&self, client_id: i32, names: Vec<String>) -> RpcResult<impl Stream<Item = RpcResult<EventStatus>>> {
        self.0
            .server_stream(EventFilter { client_id, names }, |ch, req| async move { EventServiceClient::new(ch).listen(req).await })
            .await
    }

    pub async fn send(&self, name: String, properties: Vec<conclave_api::pb::EventProperty>) -> RpcResult<ResultStatus> {
        self.0
            .unary_checked(Event { name, properties }, |ch, req| async move { EventServiceClient::new(ch).send(req).await })
            .await
    }

    pub async fn interrupt(&self, client_id: i32) -> RpcResult<ResultStatus> {
        self.0
            .unary_checked(EventInterrupt { client_id }, |ch, req| async move { EventServiceClient::new(ch).interrupt(req).await })
            .await
    }

    pub async fn inspect(&self) -> RpcResult<EventQueueStatus> {
        self.0
            .unary_checked(conclave_api::pb::Empty {}, |ch, req| async move { EventServiceClient::new(ch).inspect(req).await })
            .await
    }
}
