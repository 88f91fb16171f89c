// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::fmt;

use tonic::metadata::MetadataMap;
use tonic::Request;

const CLIENT_KEY: &str = "x-conclave-client";
const USER_KEY: &str = "x-conclave-user";
const HOST_KEY: &str = "x-conclave-host";
const IP_KEY: &str = "x-conclave-ip";
const API_VERSION_KEY: &str = "x-conclave-api-version";

/// Identifying metadata a client attaches to every call, and the server
/// reads back off the incoming request.
///
/// Mirrors the original `RpcMetadata` tuple: a short client label, the OS
/// user making the call, the calling host and IP, and the API version the
/// client was built against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallMetadata {
    pub client: String,
    pub user: String,
    pub host: String,
    pub ip: String,
    pub api_version: i32,
}

impl CallMetadata {
    pub fn new(client: impl Into<String>, user: impl Into<String>, host: impl Into<String>, ip: impl Into<String>, api_version: i32) -> Self {
        CallMetadata {
            client: client.into(),
            user: user.into(),
            host: host.into(),
            ip: ip.into(),
            api_version,
        }
    }

    /// Attaches this metadata to an outgoing request as ascii headers.
    pub fn attach<T>(&self, mut request: Request<T>) -> Request<T> {
        let map = request.metadata_mut();
        Self::insert(map, CLIENT_KEY, &self.client);
        Self::insert(map, USER_KEY, &self.user);
        Self::insert(map, HOST_KEY, &self.host);
        Self::insert(map, IP_KEY, &self.ip);
        Self::insert(map, API_VERSION_KEY, &self.api_version.to_string());
        request
    }

    fn insert(map: &mut MetadataMap, key: &str, value: &str) {
        if let (Ok(key), Ok(value)) = (key.parse(), value.parse()) {
            map.insert(key, value);
        }
    }

    /// Recovers metadata from an incoming request's headers. Any field
    /// missing or not valid ascii falls back to an empty string (or, for
    /// `api_version`, to `0`), matching the original's tolerance for
    /// talking to older clients that never set these headers at all.
    pub fn from_metadata(map: &MetadataMap) -> Self {
        CallMetadata {
            client: Self::get(map, CLIENT_KEY),
            user: Self::get(map, USER_KEY),
            host: Self::get(map, HOST_KEY),
            ip: Self::get(map, IP_KEY),
            api_version: Self::get(map, API_VERSION_KEY).parse().unwrap_or(0),
        }
    }

    fn get(map: &MetadataMap, key: &str) -> String {
        map.get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    }
}

impl fmt::Display for CallMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}@{}({}) api:{}",
            self.client, self.user, self.host, self.ip, self.api_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_request() {
        let meta = CallMetadata::new("demo", "alice", "box1", "10.0.0.1", 3);
        let request = meta.clone().attach(Request::new(()));
        let recovered = CallMetadata::from_metadata(request.metadata());
        assert_eq!(meta, recovered);
    }

    #[test]
    fn missing_headers_default_sanely() {
        let recovered = CallMetadata::from_metadata(&MetadataMap::new());
        assert_eq!(recovered.api_version, 0);
        assert_eq!(recovered.client, "");
    }

    #[test]
    fn display_matches_trace_format() {
        let meta = CallMetadata::new("demo", "alice", "box1", "10.0.0.1", 3);
        assert_eq!(meta.to_string(), "[demo] alice@box1(10.0.0.1) api:3");
    }
}
