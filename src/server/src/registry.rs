// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! The table of [`pb::ServiceInfo`] every registered service is tracked
//! under, backing `srv.info` and the proxy registration RPCs, persisted
//! to `proxy.json` in the workspace folder.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use conclave_api::{pb, RpcError, RpcResult};
use conclave_ore::folders::Folders;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dispatch::ApiVersionBounds;

const PROXY_FILE: &str = "proxy.json";

#[derive(Clone)]
struct Entry {
    info: pb::ServiceInfo,
    is_proxy: bool,
}

/// The server-wide table of registered services.
///
/// Built once at construction time (one entry per descriptor, built-in or
/// user) and mutated thereafter only by `proxy_register`/`proxy_forget`.
pub struct ServiceRegistry {
    folders: Folders,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ServiceRegistry {
    pub fn new(folders: Folders) -> RpcResult<Self> {
        let registry = ServiceRegistry {
            folders,
            entries: Mutex::new(HashMap::new()),
        };
        Ok(registry)
    }

    /// Registers a descriptor's static identity. Called once per service at
    /// construction, before any persisted proxy state is applied.
    pub fn register(&self, name: &str, version: &str, bounds: ApiVersionBounds, is_proxy: bool) {
        self.entries.lock().insert(
            name.to_owned(),
            Entry {
                info: pb::ServiceInfo {
                    name: name.to_owned(),
                    version: version.to_owned(),
                    current_api_version: bounds.current,
                    supported_api_version: bounds.supported,
                    is_proxy,
                    proxy_host: String::new(),
                    proxy_port: 0,
                },
                is_proxy,
            },
        );
    }

    /// Applies `proxy.json`, seeding `proxyHost`/`proxyPort`/`version` for
    /// every entry it names that is actually registered as a proxy. Entries
    /// the file names that aren't (or no longer) proxies are ignored: the
    /// descriptor set, not the persisted file, is authoritative for what
    /// exists.
    pub fn load_persisted(&self) -> RpcResult<()> {
        let path = self.folders.workspace().join(PROXY_FILE);
        let persisted = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("can't read {}: {e}", path.display()))),
        };
        let map: BTreeMap<String, PersistedProxy> =
            serde_json::from_str(&persisted).map_err(|e| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("invalid proxy json at {}: {e}", path.display())))?;

        let mut entries = self.entries.lock();
        for (name, proxy) in map {
            if let Some(entry) = entries.get_mut(&name) {
                if entry.is_proxy {
                    entry.info.proxy_host = proxy.host;
                    entry.info.proxy_port = proxy.port;
                    entry.info.version = proxy.version;
                }
            }
        }
        Ok(())
    }

    pub fn info(&self, names: &[String], ignore_unknown: bool) -> RpcResult<Vec<pb::ServiceInfo>> {
        let entries = self.entries.lock();
        if names.is_empty() {
            let mut all: Vec<pb::ServiceInfo> = entries.values().map(|e| e.info.clone()).collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            return Ok(all);
        }
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match entries.get(name) {
                Some(entry) => out.push(entry.info.clone()),
                None if ignore_unknown => {}
                None => return Err(RpcError::item_unknown(name)),
            }
        }
        Ok(out)
    }

    /// Declares `names` as bound to `(host, port)` at `version`, persisting
    /// the updated proxy map. Fails if any name is unknown or isn't
    /// declared as a proxy, or if `version`/`port` is zero.
    pub fn proxy_register(&self, names: &[String], version: &str, host: &str, port: u32) -> RpcResult<()> {
        if names.is_empty() {
            return Err(RpcError::param_missing("names"));
        }
        if version.is_empty() || port == 0 {
            return Err(RpcError::param_invalid("version/port", "must be non-zero"));
        }
        {
            let mut entries = self.entries.lock();
            for name in names {
                let entry = entries.get_mut(name).ok_or_else(|| RpcError::item_unknown(name))?;
                if !entry.is_proxy {
                    return Err(RpcError::param_invalid("names", format!("{name} is not declared as a proxy service")));
                }
                entry.info.version = version.to_owned();
                entry.info.proxy_host = host.to_owned();
                entry.info.proxy_port = port;
            }
        }
        self.persist()
    }

    /// Clears `proxyHost`/`proxyPort` for `names`, keeping `version`.
    pub fn proxy_forget(&self, names: &[String]) -> RpcResult<()> {
        if names.is_empty() {
            return Err(RpcError::param_missing("names"));
        }
        {
            let mut entries = self.entries.lock();
            for name in names {
                let entry = entries.get_mut(name).ok_or_else(|| RpcError::item_unknown(name))?;
                if !entry.is_proxy {
                    return Err(RpcError::param_invalid("names", format!("{name} is not declared as a proxy service")));
                }
                entry.info.proxy_host = String::new();
                entry.info.proxy_port = 0;
            }
        }
        self.persist()
    }

    /// The current `(host, port)` conclave should forward calls for `name`
    /// to, if registered.
    pub fn proxy_target(&self, name: &str) -> Option<(String, u32)> {
        let entries = self.entries.lock();
        let entry = entries.get(name)?;
        if entry.info.proxy_port == 0 {
            None
        } else {
            Some((entry.info.proxy_host.clone(), entry.info.proxy_port))
        }
    }

    /// Distinct `(host, port)` pairs across every currently-registered
    /// proxy, used by the config merged-reads fan-out.
    pub fn distinct_proxy_peers(&self) -> Vec<(String, u32)> {
        let entries = self.entries.lock();
        let mut peers: Vec<(String, u32)> = entries
            .values()
            .filter(|e| e.is_proxy && e.info.proxy_port != 0)
            .map(|e| (e.info.proxy_host.clone(), e.info.proxy_port))
            .collect();
        peers.sort();
        peers.dedup();
        peers
    }

    fn persist(&self) -> RpcResult<()> {
        let entries = self.entries.lock();
        let map: BTreeMap<&str, PersistedProxy> = entries
            .values()
            .filter(|e| e.is_proxy)
            .map(|e| {
                (
                    e.info.name.as_str(),
                    PersistedProxy {
                        host: e.info.proxy_host.clone(),
                        port: e.info.proxy_port,
                        version: e.info.version.clone(),
                    },
                )
            })
            .collect();
        let path = self.folders.workspace().join(PROXY_FILE);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&map).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, format!("can't write {}: {e}", path.display())))
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct PersistedProxy {
    host: String,
    port: u32,
    version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders(tmp: &Path) -> Folders {
        Folders::new(tmp.join("system"), tmp.join("user"), tmp.join("workspace"))
    }

    #[test]
    fn register_then_info_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ServiceRegistry::new(folders(tmp.path())).unwrap();
        registry.register("sample", "1.0.0", ApiVersionBounds { supported: 1, current: 2 }, true);

        let info = registry.info(&["sample".to_owned()], false).unwrap();
        assert_eq!(info[0].current_api_version, 2);
        assert!(info[0].is_proxy);
        assert_eq!(info[0].proxy_port, 0);
    }

    #[test]
    fn proxy_register_then_forget_retains_version() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ServiceRegistry::new(folders(tmp.path())).unwrap();
        registry.register("sample", "0.0.0", ApiVersionBounds { supported: 1, current: 1 }, true);

        registry.proxy_register(&["sample".to_owned()], "42", "peer.local", 9000).unwrap();
        let info = registry.info(&["sample".to_owned()], false).unwrap();
        assert_eq!(info[0].proxy_host, "peer.local");
        assert_eq!(info[0].proxy_port, 9000);
        assert_eq!(info[0].version, "42");

        registry.proxy_forget(&["sample".to_owned()]).unwrap();
        let info = registry.info(&["sample".to_owned()], false).unwrap();
        assert_eq!(info[0].proxy_host, "");
        assert_eq!(info[0].proxy_port, 0);
        assert_eq!(info[0].version, "42");
    }

    #[test]
    fn registering_a_non_proxy_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ServiceRegistry::new(folders(tmp.path())).unwrap();
        registry.register("config", "0.0.0", ApiVersionBounds { supported: 1, current: 1 }, false);

        let err = registry.proxy_register(&["config".to_owned()], "1", "h", 1).unwrap_err();
        assert_eq!(err.code, i32::from(conclave_api::ResultCode::ErrorParamInvalid));
    }

    #[test]
    fn persisted_proxy_file_is_restored_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ServiceRegistry::new(folders(tmp.path())).unwrap();
        registry.register("sample", "0.0.0", ApiVersionBounds { supported: 1, current: 1 }, true);
        registry.proxy_register(&["sample".to_owned()], "7", "peer", 1234).unwrap();

        let fresh = ServiceRegistry::new(folders(tmp.path())).unwrap();
        fresh.register("sample", "0.0.0", ApiVersionBounds { supported: 1, current: 1 }, true);
        fresh.load_persisted().unwrap();

        assert_eq!(fresh.proxy_target("sample"), Some(("peer".to_owned(), 1234)));
    }
}
