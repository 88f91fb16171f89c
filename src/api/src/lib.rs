// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Wire messages, RPC error/result codes, and small helpers shared by every
//! service hosted by a conclave server.
//!
//! The generated protobuf types live in [`pb`]; this crate also carries the
//! hand-written [`ResultCode`]/[`RpcError`] pair that every manager uses to
//! signal failures without throwing across the RPC boundary (see
//! [`RpcError`] for how that mapping happens).

pub mod pb {
    tonic::include_proto!("conclave.api");
}

mod dispatch;
mod error;
mod meta;

pub use dispatch::{respond, WireResponse};
pub use error::{RpcError, RpcResult};
pub use meta::CallMetadata;

pub use pb::{
    config_service_client, config_service_server, event_service_client, event_service_server,
    logger_service_client, logger_service_server, rpc_server_service_client,
    rpc_server_service_server, ConfigItem, ConfigItemUpdate, ConfigStatus, ConfigUpdate,
    ConfigValidator, Empty, Event, EventFilter, EventInterrupt, EventProperty, EventQueueStatus,
    EventStatus, Filter, LoggerConfig, LoggerLevel, LoggerStatus, LoggerUpdate,
    MultiServiceInfo, ProxyRegisterRequest, Result as WireResult, ResultStatus, ServiceInfo,
    ShutdownRequest,
};

/// The reserved result code meaning "no error".
pub const OK: i32 = 0;

/// The first result code available to caller-defined errors. The framework
/// itself never raises a code at or above this value.
pub const ERROR_CUSTOM: i32 = 100;

/// The framework's closed enumeration of result codes.
///
/// `Result.code` on the wire is a plain `int32`, not a protobuf `enum`,
/// precisely so that application code can raise codes at or above
/// [`ERROR_CUSTOM`] without the framework needing to know about them ahead of
/// time. [`ResultCode`] captures only the codes the framework itself may
/// raise.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,
    Error = 1,
    ErrorRpc = 2,
    ErrorParamMissing = 3,
    ErrorParamInvalid = 4,
    ErrorItemUnknown = 5,
    ErrorItemConflict = 6,
    ErrorModelInvalid = 7,
    ErrorStateUnexpected = 8,
    ErrorStreamShutdown = 9,
    ErrorApiClientTooOld = 10,
    ErrorApiServerTooOld = 11,
    ErrorPortBusy = 12,
    ErrorProxyUnregistered = 13,
}

impl ResultCode {
    /// Recovers a [`ResultCode`] from a raw wire code, if it is one of the
    /// framework's own. Caller-defined codes (`>= ERROR_CUSTOM`) and unknown
    /// ones are reported as `None` by design: callers should compare the raw
    /// `i32` directly when they may be dealing with a custom code.
    pub fn from_raw(code: i32) -> Option<Self> {
        use ResultCode::*;
        Some(match code {
            0 => Ok,
            1 => Error,
            2 => ErrorRpc,
            3 => ErrorParamMissing,
            4 => ErrorParamInvalid,
            5 => ErrorItemUnknown,
            6 => ErrorItemConflict,
            7 => ErrorModelInvalid,
            8 => ErrorStateUnexpected,
            9 => ErrorStreamShutdown,
            10 => ErrorApiClientTooOld,
            11 => ErrorApiServerTooOld,
            12 => ErrorPortBusy,
            13 => ErrorProxyUnregistered,
            _ => return None,
        })
    }
}

impl From<ResultCode> for i32 {
    fn from(rc: ResultCode) -> i32 {
        rc as i32
    }
}

impl Default for pb::Result {
    fn default() -> Self {
        pb::Result {
            code: ResultCode::Ok.into(),
            message: String::new(),
            stack: String::new(),
        }
    }
}

impl pb::Result {
    /// A bare OK result, as returned by every RPC that succeeds.
    pub fn ok() -> Self {
        Self::default()
    }

    /// True if `code` is exactly `OK`.
    pub fn is_ok(&self) -> bool {
        self.code == OK
    }
}

impl ResultStatus {
    pub fn ok() -> Self {
        ResultStatus {
            r: Some(pb::Result::ok()),
        }
    }
}
