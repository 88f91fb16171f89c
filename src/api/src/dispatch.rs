// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use tonic::{Response, Status};

use crate::{pb, RpcError, RpcResult};

/// A wire response type whose first field is a [`pb::Result`].
///
/// The framework never lets a manager's error escape as a bare tonic
/// [`Status`]: every declared response type carries its own `Result`, so a
/// caller always gets a structured, typed response back, successful or not.
/// Implemented for every message the built-in services and a hosted
/// service's own RPCs may return.
pub trait WireResponse: Default {
    fn set_result(&mut self, r: pb::Result);
}

/// Turns a manager's [`RpcResult`] into the `Ok(Response<T>)` a tonic
/// service handler returns, folding any [`RpcError`] into `T`'s `Result`
/// field instead of propagating it as a transport-level [`Status`].
///
/// A bare `Status` is reserved for failures the dispatch pipeline itself
/// detects before a manager ever runs (a malformed request that doesn't
/// decode, an API version mismatch caught ahead of the call).
pub fn respond<T: WireResponse>(result: RpcResult<T>) -> Result<Response<T>, Status> {
    let value = match result {
        Ok(mut value) => {
            value.set_result(pb::Result::ok());
            value
        }
        Err(err) => {
            let mut value = T::default();
            value.set_result(err.into_wire());
            value
        }
    };
    Ok(Response::new(value))
}

macro_rules! wire_response {
    ($ty:ty) => {
        impl WireResponse for $ty {
            fn set_result(&mut self, r: pb::Result) {
                self.r = Some(r);
            }
        }
    };
}

wire_response!(pb::ResultStatus);
wire_response!(pb::EventStatus);
wire_response!(pb::ConfigStatus);
wire_response!(pb::LoggerStatus);
wire_response!(pb::MultiServiceInfo);
wire_response!(pb::EventQueueStatus);

impl pb::ConfigStatus {
    pub fn is_ok(&self) -> bool {
        self.r.as_ref().map_or(true, pb::Result::is_ok)
    }
}

impl pb::MultiServiceInfo {
    pub fn is_ok(&self) -> bool {
        self.r.as_ref().map_or(true, pb::Result::is_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultCode;

    #[test]
    fn ok_result_embeds_ok_code() {
        let response = respond::<pb::ResultStatus>(Ok(pb::ResultStatus::default())).unwrap();
        assert!(response.get_ref().r.as_ref().unwrap().is_ok());
    }

    #[test]
    fn error_is_embedded_not_raised_as_status() {
        let response = respond::<pb::ResultStatus>(Err(RpcError::item_unknown("foo"))).unwrap();
        let r = response.get_ref().r.as_ref().unwrap();
        assert_eq!(r.code, i32::from(ResultCode::ErrorItemUnknown));
    }
}
