// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::future::Future;
use std::time::{Duration, Instant};

use conclave_api::{pb, CallMetadata, RpcError, RpcResult};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Response, Status};

/// Delay between reconnect attempts while a server is unreachable.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Transport-layer wrapper shared by every typed stub accessor.
///
/// Owns a lazily-connecting [`Channel`] (tonic reconnects it transparently
/// underneath once established) plus the policy for how long to keep
/// retrying a call while the server hasn't come up yet, the metadata to
/// stamp on every outgoing request, and whether a non-OK embedded
/// [`pb::Result`] should be turned into an [`RpcError`].
#[derive(Clone)]
pub struct RetryingClient {
    channel: Channel,
    metadata: CallMetadata,
    /// `None` means "fail immediately on any transport error"; `Some(d)`
    /// means "keep retrying `UNAVAILABLE` errors for up to `d`". A
    /// configured timeout of zero is normalized to `None` at construction.
    timeout: Option<Duration>,
    raise_on_non_ok: bool,
}

impl RetryingClient {
    /// Connects (lazily; the first real I/O happens on the first call) to
    /// `host:port`, stamping every outgoing call with `metadata`.
    pub fn connect_lazy(host: &str, port: u16, metadata: CallMetadata, timeout: Option<Duration>, raise_on_non_ok: bool) -> Self {
        let endpoint = Endpoint::from_shared(format!("http://{host}:{port}")).expect("host:port always forms a valid URI authority");
        RetryingClient {
            channel: endpoint.connect_lazy(),
            metadata,
            timeout: timeout.filter(|d| !d.is_zero()),
            raise_on_non_ok,
        }
    }

    /// Builds a client around an already-established channel, used when a
    /// proxy call inherits the listener's own in-process transport instead
    /// of dialing out.
    pub fn from_channel(channel: Channel, metadata: CallMetadata, timeout: Option<Duration>, raise_on_non_ok: bool) -> Self {
        RetryingClient {
            channel,
            metadata,
            timeout: timeout.filter(|d| !d.is_zero()),
            raise_on_non_ok,
        }
    }

    pub fn metadata(&self) -> &CallMetadata {
        &self.metadata
    }

    /// Clones this client with a different per-stub API version, used to
    /// build one [`RetryingClient`] per built-in service off a shared
    /// channel while each service declares its own current API version.
    pub fn with_api_version(&self, api_version: i32) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.api_version = api_version;
        RetryingClient { channel: self.channel.clone(), metadata, ..*self }
    }

    /// Clones this client with retrying disabled: the first transport
    /// error, of any kind, fails the call immediately. Used to coerce the
    /// server's own auto-client into a probe once shutdown starts waiting
    /// for the listener to actually close.
    pub fn one_shot(&self) -> Self {
        RetryingClient { timeout: None, ..self.clone() }
    }

    /// Derives a client that inherits this one's metadata but tags the
    /// caller as proxied, for forwarding a call to the service's registered
    /// peer. See the proxy dispatch rules in `conclave-server`.
    pub fn for_proxy(&self, host: &str, port: u16, api_version: i32) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.client = format!("{} (proxied)", metadata.client);
        metadata.api_version = api_version;
        RetryingClient::connect_lazy(host, port, metadata, self.timeout, false)
    }

    /// Runs a unary call, retrying while the transport reports `UNAVAILABLE`
    /// and the configured timeout hasn't elapsed. Any other transport error,
    /// or retry exhaustion, surfaces as [`conclave_api::ResultCode::ErrorRpc`].
    pub async fn unary<Req, Resp, F, Fut>(&self, request: Req, invoke: F) -> RpcResult<Resp>
    where
        Req: Clone,
        F: Fn(Channel, Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let start = Instant::now();
        loop {
            let wire = self.metadata.attach(Request::new(request.clone()));
            match invoke(self.channel.clone(), wire).await {
                Ok(response) => return Ok(response.into_inner()),
                Err(status) if status.code() == Code::Unavailable && self.may_retry(start) => {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(status) => return Err(rpc_error(status)),
            }
        }
    }

    /// Like [`Self::unary`], but additionally inspects the embedded
    /// [`pb::Result`] of a successful response and fails with its code when
    /// `raise_on_non_ok` is set, matching the original client's behavior of
    /// re-raising a non-OK result as an exception by default.
    pub async fn unary_checked<Req, Resp, F, Fut>(&self, request: Req, invoke: F) -> RpcResult<Resp>
    where
        Req: Clone,
        Resp: WithResult,
        F: Fn(Channel, Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let response = self.unary(request, invoke).await?;
        self.check(response.result())?;
        Ok(response)
    }

    /// Runs a server-streaming call, retrying the initial connection the
    /// same way [`Self::unary`] does. Once the stream is established each
    /// yielded element is inspected for an embedded non-OK [`pb::Result`];
    /// when `raise_on_non_ok` is set that element is turned into the
    /// stream's final (and only) error, terminating iteration, matching the
    /// original client's per-element result inspection.
    pub async fn server_stream<Req, Resp, F, Fut>(&self, request: Req, invoke: F) -> RpcResult<impl futures::Stream<Item = RpcResult<Resp>>>
    where
        Req: Clone,
        Resp: WithResult + Send + 'static,
        F: Fn(Channel, Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<tonic::Streaming<Resp>>, Status>>,
    {
        let start = Instant::now();
        let mut stream = loop {
            let wire = self.metadata.attach(Request::new(request.clone()));
            match invoke(self.channel.clone(), wire).await {
                Ok(response) => break response.into_inner(),
                Err(status) if status.code() == Code::Unavailable && self.may_retry(start) => {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(status) => return Err(rpc_error(status)),
            }
        };
        let raise_on_non_ok = self.raise_on_non_ok;
        Ok(async_stream::stream! {
            loop {
                match stream.message().await {
                    Ok(Some(item)) => {
                        if raise_on_non_ok {
                            if let Some(r) = item.result() {
                                if !r.is_ok() && r.code < conclave_api::ERROR_CUSTOM {
                                    yield Err(RpcError::new_raw(r.code, r.message.clone(), r.stack.clone()));
                                    break;
                                }
                            }
                        }
                        yield Ok(item);
                    }
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(rpc_error(status));
                        break;
                    }
                }
            }
        })
    }

    /// True while a retry is still worth attempting: a timeout was
    /// configured, and less of it has elapsed than the call has been
    /// outstanding.
    fn may_retry(&self, start: Instant) -> bool {
        matches!(self.timeout, Some(timeout) if start.elapsed() < timeout)
    }

    fn check(&self, result: Option<&pb::Result>) -> RpcResult<()> {
        let Some(result) = result else { return Ok(()) };
        if result.is_ok() || !self.raise_on_non_ok || result.code >= conclave_api::ERROR_CUSTOM {
            return Ok(());
        }
        Err(RpcError::new_raw(result.code, result.message.clone(), result.stack.clone()))
    }
}

/// A response type carrying an embedded [`pb::Result`], extracted so
/// [`RetryingClient::unary_checked`] can inspect it generically.
pub trait WithResult {
    fn result(&self) -> Option<&pb::Result>;
}

macro_rules! with_result {
    ($ty:ty) => {
        impl WithResult for $ty {
            fn result(&self) -> Option<&pb::Result> {
                self.r.as_ref()
            }
        }
    };
}

with_result!(pb::ResultStatus);
with_result!(pb::EventStatus);
with_result!(pb::ConfigStatus);
with_result!(pb::LoggerStatus);
with_result!(pb::MultiServiceInfo);
with_result!(pb::EventQueueStatus);

fn rpc_error(status: Status) -> RpcError {
    RpcError::new(conclave_api::ResultCode::ErrorRpc, status.message().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_normalized_to_none() {
        let client = RetryingClient::connect_lazy("localhost", 1, CallMetadata::new("t", "u", "h", "i", 1), Some(Duration::ZERO), true);
        assert!(client.timeout.is_none());
    }

    #[test]
    fn check_passes_through_ok_and_custom_codes() {
        let client = RetryingClient::connect_lazy("localhost", 1, CallMetadata::new("t", "u", "h", "i", 1), None, true);
        assert!(client.check(Some(&pb::Result::ok())).is_ok());
        assert!(client.check(Some(&pb::Result { code: 150, message: String::new(), stack: String::new() })).is_ok());
    }

    #[test]
    fn check_raises_framework_codes_when_enabled() {
        let client = RetryingClient::connect_lazy("localhost", 1, CallMetadata::new("t", "u", "h", "i", 1), None, true);
        let err = client
            .check(Some(&pb::Result {
                code: i32::from(conclave_api::ResultCode::ErrorItemUnknown),
                message: "nope".to_owned(),
                stack: String::new(),
            }))
            .unwrap_err();
        assert_eq!(err.code, i32::from(conclave_api::ResultCode::ErrorItemUnknown));
    }

    #[test]
    fn check_is_a_noop_when_raise_on_non_ok_is_false() {
        let client = RetryingClient::connect_lazy("localhost", 1, CallMetadata::new("t", "u", "h", "i", 1), None, false);
        let result = pb::Result {
            code: i32::from(conclave_api::ResultCode::ErrorItemUnknown),
            message: "nope".to_owned(),
            stack: String::new(),
        };
        assert!(client.check(Some(&result)).is_ok());
    }
}
