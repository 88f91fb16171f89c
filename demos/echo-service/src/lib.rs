// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! A minimal user service, hosted next to the framework's own built-ins, to
//! prove out the [`conclave_server::ServiceDescriptor`] contract end to end.

pub mod pb {
    tonic::include_proto!("conclave.echo");
}

use conclave_api::{RpcError, RpcResult, WireResponse};
use conclave_server::Dispatch;
use tonic::{Request, Response, Status};

use pb::{EchoRequest, EchoResponse};

impl WireResponse for EchoResponse {
    fn set_result(&mut self, r: conclave_api::pb::Result) {
        self.r = Some(r);
    }
}

/// The demo's one piece of actual business logic: repeat `phrase` `count`
/// times, joined by spaces. Holds no state; `conclave-server`'s `Dispatch`
/// handles everything version/tracing-related around it.
#[derive(Default)]
pub struct EchoManager;

impl EchoManager {
    pub fn echo(&self, phrase: &str, count: u32) -> RpcResult<String> {
        if phrase.is_empty() {
            return Err(RpcError::param_missing("phrase"));
        }
        if count == 0 {
            return Err(RpcError::param_invalid("count", "must be at least 1"));
        }
        Ok(vec![phrase; count as usize].join(" "))
    }
}

pub struct EchoServiceAdapter {
    manager: EchoManager,
    dispatch: Dispatch,
}

impl EchoServiceAdapter {
    pub fn new(manager: EchoManager, dispatch: Dispatch) -> Self {
        EchoServiceAdapter { manager, dispatch }
    }
}

#[tonic::async_trait]
impl pb::echo_service_server::EchoService for EchoServiceAdapter {
    async fn echo(&self, request: Request<EchoRequest>) -> Result<Response<EchoResponse>, Status> {
        let meta = request.metadata().clone();
        let req = request.into_inner();
        self.dispatch
            .run("echo.echo", &meta, |_| self.manager.echo(&req.phrase, req.count).map(|reply| EchoResponse { r: None, reply }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_joins_phrase_count_times() {
        let manager = EchoManager;
        assert_eq!(manager.echo("hi", 3).unwrap(), "hi hi hi");
    }

    #[test]
    fn echo_rejects_empty_phrase() {
        let manager = EchoManager;
        assert!(manager.echo("", 1).is_err());
    }

    #[test]
    fn echo_rejects_zero_count() {
        let manager = EchoManager;
        assert!(manager.echo("hi", 0).is_err());
    }
}
