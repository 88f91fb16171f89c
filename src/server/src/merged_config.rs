// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Fans `config.get`/`set`/`reset` out across every registered proxy peer
//! and merges the results with this server's own, so a caller sees one
//! consistent configuration view regardless of how many processes actually
//! host config items.
//!
//! This wraps [`conclave_config::ConfigManager`] rather than modifying it:
//! the manager's own `get`/`set`/`reset` stay exactly as tested, and the
//! fan-out/merge policy lives here, one layer up, where the service
//! registry is available.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conclave_api::pb::ConfigItem;
use conclave_api::{CallMetadata, RpcError, RpcResult};
use conclave_client::Client;
use conclave_config::ConfigManager;

use crate::proxy::effective_host;
use crate::registry::ServiceRegistry;

pub struct MergedConfigService {
    manager: Arc<ConfigManager>,
    registry: Arc<ServiceRegistry>,
    peer_timeout: Option<Duration>,
    main_host: String,
}

impl MergedConfigService {
    pub fn new(manager: Arc<ConfigManager>, registry: Arc<ServiceRegistry>, peer_timeout: Option<Duration>, main_host: impl Into<String>) -> Self {
        MergedConfigService { manager, registry, peer_timeout, main_host: main_host.into() }
    }

    pub async fn get(&self, names: &[String], caller: &CallMetadata, ignore_unknown: bool) -> RpcResult<Vec<ConfigItem>> {
        let local = self.manager.get(names)?;
        self.merge_with_peers(local, names, caller, ignore_unknown).await
    }

    pub async fn reset(&self, names: &[String], caller: &CallMetadata, ignore_unknown: bool) -> RpcResult<Vec<ConfigItem>> {
        let local = self.manager.reset(names)?;
        for (host, port) in self.registry.distinct_proxy_peers() {
            let host = effective_host(&host, &self.main_host);
            let client = Client::connect_inherited(host, port as u16, caller, caller.api_version, self.peer_timeout);
            client.config().reset(names.to_vec()).await?;
        }
        self.merge_with_peers(local, names, caller, ignore_unknown).await
    }

    pub async fn set(&self, updates: &[(String, String)], caller: &CallMetadata, ignore_unknown: bool) -> RpcResult<Vec<ConfigItem>> {
        let names: Vec<String> = updates.iter().map(|(n, _)| n.clone()).collect();
        let local = self.manager.set(updates)?;
        let wire_updates: Vec<conclave_api::pb::ConfigItemUpdate> = updates
            .iter()
            .map(|(name, value)| conclave_api::pb::ConfigItemUpdate { name: name.clone(), value: value.clone() })
            .collect();
        for (host, port) in self.registry.distinct_proxy_peers() {
            let host = effective_host(&host, &self.main_host);
            let client = Client::connect_inherited(host, port as u16, caller, caller.api_version, self.peer_timeout);
            client.config().set(wire_updates.clone()).await?;
        }
        self.merge_with_peers(local, &names, caller, ignore_unknown).await
    }

    /// Queries every registered proxy peer for `names` and folds its
    /// answer into `local`, by name. A name present with diverging values
    /// across peers raises [`ResultCode::ErrorItemConflict`] unless
    /// `ignore_unknown` is set, in which case the local (or first-seen)
    /// value wins silently.
    async fn merge_with_peers(&self, local: Vec<ConfigItem>, names: &[String], caller: &CallMetadata, ignore_unknown: bool) -> RpcResult<Vec<ConfigItem>> {
        let peers = self.registry.distinct_proxy_peers();
        if peers.is_empty() {
            return Ok(local);
        }

        let mut merged: HashMap<String, ConfigItem> = local.into_iter().map(|i| (i.name.clone(), i)).collect();
        for (host, port) in peers {
            let host = effective_host(&host, &self.main_host);
            let client = Client::connect_inherited(host, port as u16, caller, caller.api_version, self.peer_timeout);
            let status = match client.config().get(names.to_vec()).await {
                Ok(status) => status,
                Err(_) if ignore_unknown => continue,
                Err(e) => return Err(e),
            };
            for item in status.items {
                match merged.get(&item.name) {
                    Some(existing) if existing.value != item.value && !ignore_unknown => {
                        return Err(RpcError::item_conflict(&item.name));
                    }
                    Some(_) => {}
                    None => {
                        merged.insert(item.name.clone(), item);
                    }
                }
            }
        }

        let mut out: Vec<ConfigItem> = merged.into_values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
