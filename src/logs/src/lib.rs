// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Runtime-adjustable logger levels, hosted by every conclave server as the
//! built-in `srv.logs` service, and wired into the process's actual
//! `tracing-subscriber` pipeline through [`layer::DirectiveLayer`].

pub mod layer;
mod level;
mod manager;

pub use manager::LogsManager;
