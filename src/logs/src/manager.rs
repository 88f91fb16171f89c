// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::collections::HashMap;
use std::path::Path;

use conclave_api::pb::{Filter, LoggerConfig, LoggerLevel, LoggerUpdate};
use conclave_api::{RpcError, RpcResult};
use conclave_ore::folders::Folders;
use serde_json::Value;

use crate::layer::LiveDirectives;
use crate::level;

const LOGGERS_FILE: &str = "loggers.json";

/// The `srv.logs` service's backing store.
///
/// Every directive a caller sets through `Set` overrides whatever
/// `tracing-subscriber` filter conclave booted with, and is persisted to
/// the workspace's `loggers.json`; `Reset` removes the override instead of
/// writing a new one. [`LogsManager::live_directives`] hands out the same
/// shared table a [`crate::layer::DirectiveLayer`] consults, so changes
/// made through the RPC take effect on the very next log event.
pub struct LogsManager {
    folders: Folders,
    directives: LiveDirectives,
    root_reset_level: LoggerLevel,
}

impl LogsManager {
    /// `root_reset_level` is the level the root logger should fall back to
    /// on `Reset`: the level the subscriber was originally configured with,
    /// before any `Set` calls layered overrides on top.
    pub fn new(folders: Folders, root_reset_level: LoggerLevel) -> RpcResult<Self> {
        let directives = LiveDirectives::new();
        for dir in [folders.system(), folders.user(), folders.workspace()] {
            for (name, (enabled, level)) in load_directives(&dir.join(LOGGERS_FILE))? {
                directives.set(&name, enabled, level);
            }
        }
        Ok(LogsManager {
            folders,
            directives,
            root_reset_level,
        })
    }

    /// The shared directive table a [`crate::layer::DirectiveLayer`] should
    /// be built from, so RPC-driven changes take effect immediately.
    pub fn live_directives(&self) -> LiveDirectives {
        self.directives.clone()
    }

    fn default_for(&self, name: &str) -> (bool, LoggerLevel) {
        (true, if name.is_empty() { self.root_reset_level } else { LoggerLevel::LvlUnknown })
    }

    fn config_for(&self, name: &str) -> LoggerConfig {
        let (enabled, level) = self.directives.get(name).unwrap_or_else(|| self.default_for(name));
        LoggerConfig {
            name: name.to_owned(),
            enabled,
            level: level as i32,
        }
    }

    pub fn get(&self, request: &Filter) -> RpcResult<Vec<LoggerConfig>> {
        check_names(&request.names)?;
        Ok(request.names.iter().map(|n| self.config_for(n)).collect())
    }

    pub fn set(&self, request: &LoggerUpdate) -> RpcResult<Vec<LoggerConfig>> {
        if request.items.is_empty() {
            return Err(RpcError::param_missing("items"));
        }
        let mut out = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let level = LoggerLevel::from_i32(item.level).unwrap_or(LoggerLevel::LvlUnknown);
            self.directives.set(&item.name, item.enabled, level);
            out.push(self.config_for(&item.name));
        }
        self.persist()?;
        Ok(out)
    }

    pub fn reset(&self, request: &Filter) -> RpcResult<Vec<LoggerConfig>> {
        check_names(&request.names)?;
        for name in &request.names {
            self.directives.remove(name);
        }
        let out = request.names.iter().map(|n| self.config_for(n)).collect();
        self.persist()?;
        Ok(out)
    }

    fn persist(&self) -> RpcResult<()> {
        let snapshot = self.directives.snapshot();
        let mut map = serde_json::Map::with_capacity(snapshot.len());
        for (name, (enabled, level)) in &snapshot {
            let value = if !enabled {
                Value::Bool(false)
            } else {
                match level::to_persisted_name(*level) {
                    Some(name) => Value::String(name.to_owned()),
                    None => continue,
                }
            };
            map.insert(name.clone(), value);
        }
        let path = self.folders.workspace().join(LOGGERS_FILE);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(map)).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, format!("can't write {}: {e}", path.display())))
    }
}

fn check_names(names: &[String]) -> RpcResult<()> {
    if names.is_empty() {
        return Err(RpcError::param_missing("names"));
    }
    Ok(())
}

fn load_directives(path: &Path) -> RpcResult<HashMap<String, (bool, LoggerLevel)>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("can't read {}: {e}", path.display()))),
    };
    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("invalid logger json at {}: {e}", path.display())))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("expected a flat object at {}", path.display())))?;

    let mut out = HashMap::with_capacity(obj.len());
    for (name, v) in obj {
        let directive = match v {
            Value::Bool(enabled) => (*enabled, LoggerLevel::LvlUnknown),
            Value::String(s) => match level::from_persisted_name(s) {
                Some(level) => (true, level),
                None => {
                    tracing::warn!(logger = %name, level = %s, "ignoring unknown persisted log level");
                    continue;
                }
            },
            _ => return Err(RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("expected a bool or string for logger {name}"))),
        };
        out.insert(name.clone(), directive);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders(tmp: &Path) -> Folders {
        Folders::new(tmp.join("system"), tmp.join("user"), tmp.join("workspace"))
    }

    #[test]
    fn get_defaults_root_to_reset_level() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = LogsManager::new(folders(tmp.path()), LoggerLevel::LvlWarning).unwrap();
        let out = mgr.get(&Filter { names: vec!["".to_owned()], ignore_unknown: false }).unwrap();
        assert_eq!(out[0].level, LoggerLevel::LvlWarning as i32);
        assert!(out[0].enabled);
    }

    #[test]
    fn set_then_get_reflects_override() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = LogsManager::new(folders(tmp.path()), LoggerLevel::LvlWarning).unwrap();
        mgr.set(&LoggerUpdate {
            items: vec![LoggerConfig {
                name: "conclave_server".to_owned(),
                enabled: true,
                level: LoggerLevel::LvlDebug as i32,
            }],
        })
        .unwrap();

        let out = mgr
            .get(&Filter {
                names: vec!["conclave_server".to_owned()],
                ignore_unknown: false,
            })
            .unwrap();
        assert_eq!(out[0].level, LoggerLevel::LvlDebug as i32);
    }

    #[test]
    fn reset_removes_override() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = LogsManager::new(folders(tmp.path()), LoggerLevel::LvlWarning).unwrap();
        let filter = Filter {
            names: vec!["conclave_server".to_owned()],
            ignore_unknown: false,
        };
        mgr.set(&LoggerUpdate {
            items: vec![LoggerConfig {
                name: "conclave_server".to_owned(),
                enabled: false,
                level: LoggerLevel::LvlError as i32,
            }],
        })
        .unwrap();
        mgr.reset(&filter).unwrap();

        let out = mgr.get(&filter).unwrap();
        assert!(out[0].enabled);
        assert_eq!(out[0].level, LoggerLevel::LvlUnknown as i32);
    }

    #[test]
    fn empty_update_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = LogsManager::new(folders(tmp.path()), LoggerLevel::LvlWarning).unwrap();
        assert!(mgr.set(&LoggerUpdate { items: vec![] }).is_err());
    }

    #[test]
    fn live_directives_reflect_rpc_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = LogsManager::new(folders(tmp.path()), LoggerLevel::LvlWarning).unwrap();
        let live = mgr.live_directives();
        mgr.set(&LoggerUpdate {
            items: vec![LoggerConfig {
                name: "noisy".to_owned(),
                enabled: false,
                level: LoggerLevel::LvlUnknown as i32,
            }],
        })
        .unwrap();
        assert_eq!(live.get("noisy"), Some((false, LoggerLevel::LvlUnknown)));
    }
}
