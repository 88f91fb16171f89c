// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::fmt;

use crate::{pb, ResultCode, ERROR_CUSTOM, OK};

/// The error type every manager method returns instead of panicking.
///
/// An `RpcError` always carries a raw wire code: either one of
/// [`ResultCode`]'s variants, or a caller-defined code at or above
/// [`ERROR_CUSTOM`]. `report_exception` style code at the dispatch layer
/// turns this into a [`pb::Result`] rather than letting it escape as a tonic
/// `Status`, so a client always gets a structured result back instead of a
/// bare gRPC error.
#[derive(thiserror::Error, Debug)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub stack: String,
}

impl RpcError {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        RpcError {
            code: code.into(),
            message: message.into(),
            stack: String::new(),
        }
    }

    /// Builds an error from a raw wire code, bypassing [`ResultCode`]
    /// entirely. Used when re-raising a [`pb::Result`] a client received
    /// back from a peer: the code may be one of the framework's own or a
    /// caller-defined one, and either way should round-trip unchanged.
    pub fn new_raw(code: i32, message: impl Into<String>, stack: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
            stack: stack.into(),
        }
    }

    /// Builds an error carrying a caller-defined code. Panics if `code` is
    /// below [`ERROR_CUSTOM`]: custom codes must not collide with the
    /// framework's own enumeration.
    pub fn custom(code: i32, message: impl Into<String>) -> Self {
        assert!(
            code >= ERROR_CUSTOM,
            "custom result codes must be >= ERROR_CUSTOM ({ERROR_CUSTOM}), got {code}"
        );
        RpcError {
            code,
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn param_missing(name: &str) -> Self {
        Self::new(ResultCode::ErrorParamMissing, format!("missing parameter: {name}"))
    }

    pub fn param_invalid(name: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ResultCode::ErrorParamInvalid,
            format!("invalid parameter {name}: {reason}"),
        )
    }

    pub fn item_unknown(name: &str) -> Self {
        Self::new(ResultCode::ErrorItemUnknown, format!("unknown item: {name}"))
    }

    pub fn item_conflict(name: &str) -> Self {
        Self::new(ResultCode::ErrorItemConflict, format!("conflicting values for: {name}"))
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    pub fn into_wire(self) -> pb::Result {
        pb::Result {
            code: self.code,
            message: self.message,
            stack: self.stack,
        }
    }

    pub fn from_wire(r: pb::Result) -> Option<Self> {
        if r.code == OK {
            None
        } else {
            Some(RpcError {
                code: r.code,
                message: r.message,
                stack: r.stack,
            })
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ResultCode::from_raw(self.code) {
            Some(rc) => write!(f, "{rc:?} ({}): {}", self.code, self.message),
            None => write!(f, "custom error ({}): {}", self.code, self.message),
        }
    }
}

impl From<RpcError> for tonic::Status {
    fn from(err: RpcError) -> tonic::Status {
        // Dispatch normally catches RpcError and folds it into a Result
        // message instead of a Status; this conversion only matters for
        // transport-level failures raised before a method body runs.
        tonic::Status::internal(err.to_string())
    }
}

/// Convenience alias for manager/method bodies.
pub type RpcResult<T> = std::result::Result<T, RpcError>;
