// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! The per-method entry point every hosted service (built-in or user)
//! calls at the top of each handler: checks the caller's API version
//! against the service's declared bounds, records the call in the
//! in-flight tracker, and on either failure folds the error into the
//! method's own wire response instead of a transport-level `Status`.

use std::sync::Arc;

use conclave_api::{respond, CallMetadata, ResultCode, RpcError, RpcResult, WireResponse};
use tonic::metadata::MetadataMap;
use tonic::{Response, Status};

use crate::tracker::{InFlightGuard, InFlightTracker};

/// The inclusive range of API versions a service accepts, computed from a
/// descriptor's `apiVersionSet` as `supported = min`, `current = max`.
#[derive(Clone, Copy, Debug)]
pub struct ApiVersionBounds {
    pub supported: i32,
    pub current: i32,
}

impl ApiVersionBounds {
    /// Computes bounds from a non-empty set of declared versions, treating
    /// `0` as "unversioned" and excluding it the way the descriptor's
    /// `apiVersionSet\{0}` does.
    pub fn from_versions(versions: &[i32]) -> Self {
        let mut versioned: Vec<i32> = versions.iter().copied().filter(|&v| v != 0).collect();
        if versioned.is_empty() {
            versioned.push(0);
        }
        ApiVersionBounds {
            supported: *versioned.iter().min().unwrap(),
            current: *versioned.iter().max().unwrap(),
        }
    }
}

/// `client_version == 0` means the caller never set the header at all
/// (an old client, or one that doesn't care), which is tolerated
/// unconditionally rather than rejected as "too old".
pub fn check_version(bounds: ApiVersionBounds, client_version: i32) -> RpcResult<()> {
    if client_version == 0 {
        return Ok(());
    }
    if client_version < bounds.supported {
        return Err(RpcError::new(
            ResultCode::ErrorApiClientTooOld,
            format!("client api version {client_version} is older than the oldest version this server supports ({})", bounds.supported),
        ));
    }
    if client_version > bounds.current {
        return Err(RpcError::new(
            ResultCode::ErrorApiServerTooOld,
            format!("client api version {client_version} is newer than the newest version this server supports ({})", bounds.current),
        ));
    }
    Ok(())
}

/// Bundles a service's [`ApiVersionBounds`] with the shared
/// [`InFlightTracker`], so every hosted service's `service.rs` can open a
/// call with one line instead of re-deriving this plumbing per service.
#[derive(Clone)]
pub struct Dispatch {
    tracker: Arc<InFlightTracker>,
    bounds: ApiVersionBounds,
}

impl Dispatch {
    pub fn new(tracker: Arc<InFlightTracker>, bounds: ApiVersionBounds) -> Self {
        Dispatch { tracker, bounds }
    }

    /// Checks the caller's API version and records the call as in-flight.
    /// The returned guard must be held for the duration of the call.
    pub fn enter(&self, rpc: &'static str, meta: &MetadataMap) -> RpcResult<(CallMetadata, InFlightGuard)> {
        let metadata = CallMetadata::from_metadata(meta);
        check_version(self.bounds, metadata.api_version)?;
        let guard = self.tracker.enter(rpc, metadata.clone());
        Ok((metadata, guard))
    }

    /// Runs a unary handler body under [`Self::enter`], folding either an
    /// API-version rejection or the body's own [`RpcError`] into `T`'s
    /// embedded `Result` rather than a transport [`Status`].
    pub fn run<T, F>(&self, rpc: &'static str, meta: &MetadataMap, body: F) -> Result<Response<T>, Status>
    where
        T: WireResponse,
        F: FnOnce(CallMetadata) -> RpcResult<T>,
    {
        match self.enter(rpc, meta) {
            Ok((metadata, _guard)) => respond(body(metadata)),
            Err(err) => respond(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_ore::now::Now;

    #[test]
    fn bounds_ignore_the_unversioned_zero_entry() {
        let bounds = ApiVersionBounds::from_versions(&[0, 1, 2, 3]);
        assert_eq!(bounds.supported, 1);
        assert_eq!(bounds.current, 3);
    }

    #[test]
    fn zero_client_version_is_always_accepted() {
        let bounds = ApiVersionBounds::from_versions(&[2, 3]);
        assert!(check_version(bounds, 0).is_ok());
    }

    #[test]
    fn below_supported_is_client_too_old() {
        let bounds = ApiVersionBounds::from_versions(&[2, 3]);
        let err = check_version(bounds, 1).unwrap_err();
        assert_eq!(err.code, i32::from(ResultCode::ErrorApiClientTooOld));
    }

    #[test]
    fn above_current_is_server_too_old() {
        let bounds = ApiVersionBounds::from_versions(&[2, 3]);
        let err = check_version(bounds, 4).unwrap_err();
        assert_eq!(err.code, i32::from(ResultCode::ErrorApiServerTooOld));
    }

    #[test]
    fn run_embeds_version_error_instead_of_raising_status() {
        let dispatch = Dispatch::new(InFlightTracker::new(Now::from_fn(|| 0)), ApiVersionBounds::from_versions(&[2, 3]));
        let response = dispatch
            .run::<conclave_api::pb::ResultStatus, _>("svc.method", &MetadataMap::new(), |_| Ok(conclave_api::pb::ResultStatus::ok()))
            .unwrap();
        assert!(response.get_ref().r.as_ref().unwrap().is_ok());
    }
}
