// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Wires [`LogsManager`](crate::LogsManager) into an actual
//! `tracing-subscriber` pipeline.
//!
//! `srv.logs` lets a caller change a target's level at runtime; a plain
//! `EnvFilter` is parsed once and can't be mutated, so this crate ships its
//! own tiny [`tracing_subscriber::Layer`] that re-checks a shared directive
//! table on every span/event instead.

use std::collections::HashMap;
use std::sync::Arc;

use conclave_api::pb::LoggerLevel;
use parking_lot::RwLock;
use tracing::{Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::level::to_tracing_level;

/// The live, mutable source of truth [`LogsManager`](crate::LogsManager)
/// updates and [`DirectiveLayer`] reads. Kept separate from the manager
/// itself so the manager's lock (guarding persistence too) isn't held
/// across every log call.
#[derive(Clone, Default)]
pub struct LiveDirectives(Arc<RwLock<HashMap<String, (bool, LoggerLevel)>>>);

impl LiveDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, enabled: bool, level: LoggerLevel) {
        self.0.write().insert(name.to_owned(), (enabled, level));
    }

    pub fn remove(&self, name: &str) {
        self.0.write().remove(name);
    }

    /// The directive set exactly for `name`, with no hierarchy fallback.
    pub fn get(&self, name: &str) -> Option<(bool, LoggerLevel)> {
        self.0.read().get(name).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, (bool, LoggerLevel)> {
        self.0.read().clone()
    }

    /// Most specific match wins: an exact target match, then progressively
    /// shorter `::`-separated prefixes, then the root (`""`) directive.
    fn resolve(&self, target: &str) -> Option<(bool, LoggerLevel)> {
        let directives = self.0.read();
        let mut candidate = target;
        loop {
            if let Some(d) = directives.get(candidate) {
                return Some(*d);
            }
            match candidate.rsplit_once("::") {
                Some((prefix, _)) => candidate = prefix,
                None => break,
            }
        }
        directives.get("").copied()
    }
}

/// A `tracing-subscriber` layer that enforces [`LiveDirectives`]. Compose
/// it under an `EnvFilter` (or any other layer) in the subscriber registry;
/// this layer only ever narrows what gets through, it never lets through
/// something its inner layers would already reject.
pub struct DirectiveLayer {
    directives: LiveDirectives,
}

impl DirectiveLayer {
    pub fn new(directives: LiveDirectives) -> Self {
        DirectiveLayer { directives }
    }
}

impl<S: Subscriber> Layer<S> for DirectiveLayer {
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        match self.directives.resolve(metadata.target()) {
            None => true,
            Some((enabled, level)) => {
                if !enabled {
                    return false;
                }
                match to_tracing_level(level) {
                    Some(max_level) => metadata.level() <= &max_level,
                    None => true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_target_beats_prefix_and_root() {
        let directives = LiveDirectives::new();
        directives.set("", true, LoggerLevel::LvlError);
        directives.set("conclave_server", true, LoggerLevel::LvlWarning);
        directives.set("conclave_server::dispatch", true, LoggerLevel::LvlDebug);

        assert_eq!(directives.resolve("conclave_server::dispatch"), Some((true, LoggerLevel::LvlDebug)));
        assert_eq!(directives.resolve("conclave_server::proxy"), Some((true, LoggerLevel::LvlWarning)));
        assert_eq!(directives.resolve("conclave_events"), Some((true, LoggerLevel::LvlError)));
    }

    #[test]
    fn no_directives_means_unconstrained() {
        let directives = LiveDirectives::new();
        assert_eq!(directives.resolve("anything"), None);
    }

    #[test]
    fn disabled_target_resolves_disabled() {
        let directives = LiveDirectives::new();
        directives.set("noisy", false, LoggerLevel::LvlUnknown);
        assert_eq!(directives.resolve("noisy"), Some((false, LoggerLevel::LvlUnknown)));
    }
}
