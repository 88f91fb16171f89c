// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use conclave_api::{RpcError, RpcResult};
use conclave_ore::folders::Folders;
use parking_lot::Mutex;

use crate::item::{ConfigItem, ConfigItemSpec};

const CONFIG_FILE: &str = "config.json";

/// The layered configuration engine backing the `srv.config` service.
///
/// Items come in two flavors: `static` items are loaded once from the
/// layered defaults and never exposed through `Get`/`Set`/`Reset` (the
/// framework's own `rpc-*` items are static, since letting a client change
/// `rpc-main-port` at runtime makes no sense); `user` items are the ones
/// callers can read and update, with non-default values persisted to the
/// workspace's `config.json`.
pub struct ConfigManager {
    folders: Folders,
    static_items: HashMap<String, ConfigItem>,
    user_items: Mutex<HashMap<String, ConfigItem>>,
}

impl ConfigManager {
    pub fn new(folders: Folders, cli_overrides: HashMap<String, String>, static_specs: Vec<ConfigItemSpec>, user_specs: Vec<ConfigItemSpec>) -> RpcResult<Self> {
        let mut static_items = build_items(static_specs)?;
        let mut user_items = build_items(user_specs)?;

        let conflicts: Vec<&str> = static_items
            .keys()
            .filter(|n| user_items.contains_key(n.as_str()))
            .map(|n| n.as_str())
            .collect();
        if !conflicts.is_empty() {
            return Err(RpcError::new(
                conclave_api::ResultCode::ErrorModelInvalid,
                format!("config items defined as both static and user: {}", conflicts.join(", ")),
            ));
        }

        let all_names: Vec<String> = static_items.keys().chain(user_items.keys()).cloned().collect();
        let defaults = load_defaults(&folders, &cli_overrides, &all_names)?;
        let currents = load_config_file(&folders.workspace().join(CONFIG_FILE))?;

        for item in static_items.values_mut().chain(user_items.values_mut()) {
            let name = item.name().to_owned();
            let default_val = defaults.get(&name).cloned().unwrap_or_else(|| item.hard_coded_default.clone());
            item.set_default(default_val.clone())?;

            match currents.get(&name) {
                Some(current) if item.update(current.clone()).is_ok() => {}
                _ => item.update(default_val)?,
            }
        }

        Ok(ConfigManager {
            folders,
            static_items,
            user_items: Mutex::new(user_items),
        })
    }

    /// Returns the current value of a static (framework-internal) item.
    /// Panics if `name` is not a registered static item: callers always
    /// pass a compile-time constant name here.
    pub fn static_str(&self, name: &str) -> &str {
        &self.static_items.get(name).unwrap_or_else(|| panic!("no such static config item: {name}")).value
    }

    pub fn static_int(&self, name: &str) -> i64 {
        self.static_str(name).parse().expect("static int item always holds a validated int")
    }

    pub fn static_float(&self, name: &str) -> f64 {
        self.static_str(name).parse().expect("static float item always holds a validated float")
    }

    pub fn get(&self, names: &[String]) -> RpcResult<Vec<conclave_api::ConfigItem>> {
        self.check_names(names, true)?;
        let items = self.user_items.lock();
        Ok(names.iter().map(|n| items[n].to_wire()).collect())
    }

    pub fn reset(&self, names: &[String]) -> RpcResult<Vec<conclave_api::ConfigItem>> {
        self.check_names(names, false)?;
        let mut items = self.user_items.lock();
        for n in names {
            items.get_mut(n).unwrap().reset();
        }
        let wire = names.iter().map(|n| items[n].to_wire()).collect();
        self.persist(&items)?;
        Ok(wire)
    }

    pub fn set(&self, updates: &[(String, String)]) -> RpcResult<Vec<conclave_api::ConfigItem>> {
        let names: Vec<String> = updates.iter().map(|(n, _)| n.clone()).collect();
        self.check_names(&names, false)?;

        let mut items = self.user_items.lock();
        for (name, value) in updates {
            items[name].validate(value)?;
        }
        for (name, value) in updates {
            items.get_mut(name).unwrap().update(value.clone())?;
        }
        let wire = names.iter().map(|n| items[n].to_wire()).collect();
        self.persist(&items)?;
        Ok(wire)
    }

    fn check_names(&self, names: &[String], empty_ok: bool) -> RpcResult<()> {
        if !empty_ok && names.is_empty() {
            return Err(RpcError::param_missing("names"));
        }
        if names.iter().any(|n| n.is_empty()) {
            return Err(RpcError::param_missing("names"));
        }
        let items = self.user_items.lock();
        let unknown: Vec<&str> = names.iter().filter(|n| !items.contains_key(n.as_str())).map(|n| n.as_str()).collect();
        if !unknown.is_empty() {
            return Err(RpcError::item_unknown(&unknown.join(", ")));
        }
        Ok(())
    }

    fn persist(&self, items: &HashMap<String, ConfigItem>) -> RpcResult<()> {
        let non_default: BTreeMap<&str, &str> = items
            .values()
            .filter(|i| i.value != i.default_value)
            .map(|i| (i.name(), i.value.as_str()))
            .collect();
        save_config_file(&self.folders.workspace().join(CONFIG_FILE), &non_default)
    }
}

fn build_items(specs: Vec<ConfigItemSpec>) -> RpcResult<HashMap<String, ConfigItem>> {
    let mut map = HashMap::new();
    for spec in specs {
        let item = ConfigItem::new(spec)?;
        map.insert(item.name().to_owned(), item);
    }
    Ok(map)
}

fn load_defaults(folders: &Folders, cli_overrides: &HashMap<String, String>, names: &[String]) -> RpcResult<HashMap<String, String>> {
    let mut defaults = HashMap::new();
    defaults.extend(load_config_file(&folders.system().join(CONFIG_FILE))?);
    defaults.extend(load_config_file(&folders.user().join(CONFIG_FILE))?);
    for name in names {
        let env_name = name.to_uppercase().replace('-', "_");
        if let Ok(val) = std::env::var(&env_name) {
            defaults.insert(name.clone(), val);
        }
    }
    defaults.extend(cli_overrides.clone());
    Ok(defaults)
}

fn load_config_file(path: &Path) -> RpcResult<HashMap<String, String>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("can't read {}: {e}", path.display()))),
    };
    let value: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("invalid config json at {}: {e}", path.display())))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("expected a flat string:string object at {}", path.display())))?;
    let mut out = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        let s = v
            .as_str()
            .ok_or_else(|| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("expected a flat string:string object at {}", path.display())))?;
        out.insert(k.clone(), s.to_owned());
    }
    Ok(out)
}

fn save_config_file(path: &Path, values: &BTreeMap<&str, &str>) -> RpcResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, format!("can't create {}: {e}", parent.display())))?;
    }
    let json = serde_json::to_string_pretty(values).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
    std::fs::write(path, json).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, format!("can't write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_api::pb::ConfigValidator;

    fn folders(tmp: &Path) -> Folders {
        Folders::new(tmp.join("system"), tmp.join("user"), tmp.join("workspace"))
    }

    fn user_spec(name: &str, default: &str) -> ConfigItemSpec {
        ConfigItemSpec::new(name, "a test item", default, ConfigValidator::ConfigValidString)
    }

    #[test]
    fn get_set_reset_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = ConfigManager::new(folders(tmp.path()), HashMap::new(), vec![], vec![user_spec("greeting", "hello")]).unwrap();

        let got = mgr.get(&["greeting".to_owned()]).unwrap();
        assert_eq!(got[0].value, "hello");

        mgr.set(&[("greeting".to_owned(), "bonjour".to_owned())]).unwrap();
        assert_eq!(mgr.get(&["greeting".to_owned()]).unwrap()[0].value, "bonjour");

        mgr.reset(&["greeting".to_owned()]).unwrap();
        assert_eq!(mgr.get(&["greeting".to_owned()]).unwrap()[0].value, "hello");
    }

    #[test]
    fn set_persists_only_non_default_values() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = ConfigManager::new(folders(tmp.path()), HashMap::new(), vec![], vec![user_spec("greeting", "hello")]).unwrap();
        mgr.set(&[("greeting".to_owned(), "bonjour".to_owned())]).unwrap();

        let persisted = load_config_file(&tmp.path().join("workspace").join(CONFIG_FILE)).unwrap();
        assert_eq!(persisted.get("greeting").unwrap(), "bonjour");
    }

    #[test]
    fn unknown_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = ConfigManager::new(folders(tmp.path()), HashMap::new(), vec![], vec![user_spec("greeting", "hello")]).unwrap();
        assert!(mgr.get(&["nope".to_owned()]).is_err());
    }

    #[test]
    fn static_and_user_name_conflict_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ConfigManager::new(
            folders(tmp.path()),
            HashMap::new(),
            vec![user_spec("shared", "a")],
            vec![user_spec("shared", "b")],
        )
        .unwrap_err();
        assert_eq!(err.code, i32::from(conclave_api::ResultCode::ErrorModelInvalid));
    }

    #[test]
    fn env_override_wins_over_file_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("GREETING", "from-env");
        let mgr = ConfigManager::new(folders(tmp.path()), HashMap::new(), vec![], vec![user_spec("greeting", "hello")]).unwrap();
        std::env::remove_var("GREETING");
        assert_eq!(mgr.get(&["greeting".to_owned()]).unwrap()[0].value, "from-env");
    }
}
