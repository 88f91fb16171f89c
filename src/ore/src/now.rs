// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! A swappable clock, so that retain-timeout and keep-alive logic in the
//! event bus can be tested without sleeping in real time.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// A source of the current time. The default implementation reads the
/// system clock; tests substitute a fixed or manually-advanced one.
pub trait NowFn: Send + Sync {
    fn now(&self) -> EpochMillis;
}

/// Shared handle to a [`NowFn`], cheap to clone into every manager that
/// needs to stamp or compare timestamps.
#[derive(Clone)]
pub struct Now(Arc<dyn NowFn>);

impl Now {
    pub fn system() -> Self {
        Now(Arc::new(SystemNow))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> EpochMillis + Send + Sync + 'static,
    {
        Now(Arc::new(FnNow(f)))
    }

    pub fn now(&self) -> EpochMillis {
        self.0.now()
    }
}

impl Default for Now {
    fn default() -> Self {
        Now::system()
    }
}

struct SystemNow;

impl NowFn for SystemNow {
    fn now(&self) -> EpochMillis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the Unix epoch")
            .as_millis() as EpochMillis
    }
}

struct FnNow<F>(F);

impl<F> NowFn for FnNow<F>
where
    F: Fn() -> EpochMillis + Send + Sync,
{
    fn now(&self) -> EpochMillis {
        (self.0)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn fixed_clock_reports_fixed_value() {
        let now = Now::from_fn(|| 42);
        assert_eq!(now.now(), 42);
        assert_eq!(now.now(), 42);
    }

    #[test]
    fn system_clock_advances() {
        let now = Now::system();
        let a = now.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now.now();
        assert!(b >= a);
    }

    #[test]
    fn counter_clock_advances_on_demand() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = counter.clone();
        let now = Now::from_fn(move || c.fetch_add(1, Ordering::SeqCst));
        assert_eq!(now.now(), 0);
        assert_eq!(now.now(), 1);
    }
}
