// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Small, dependency-light utilities shared across the conclave crates.
//!
//! Each module is an extension of something the stdlib doesn't quite cover:
//! [`id`] and [`now`] have zero optional dependencies and are always
//! available; [`cli`], [`folders`], [`netio`], and [`task`] need an
//! ecosystem crate and sit behind a feature.

pub mod id;
pub mod now;

#[cfg(feature = "cli")]
pub mod cli;

pub mod folders;
pub mod netio;

#[cfg(all(feature = "async", feature = "tracing_"))]
pub mod task;
