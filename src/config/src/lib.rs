// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! The layered configuration engine hosted by every conclave server as the
//! built-in `srv.config` service.
//!
//! Precedence, lowest to highest: a hard-coded default, the system config
//! file, the user config file, an environment variable (the item's name
//! upper-cased with `-` turned into `_`), and a command-line override. The
//! effective value a caller sets through `Set` is persisted to the
//! workspace's `config.json`, but only when it differs from the default, so
//! upgrading the default later doesn't get masked by a stale persisted copy.

mod item;
mod manager;
pub mod static_config;
mod validator;

pub use item::ConfigItemSpec;
pub use manager::ConfigManager;
pub use validator::CustomValidator;
