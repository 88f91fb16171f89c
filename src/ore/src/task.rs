// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Spawns a named tokio task.
//!
//! A plain `tokio::spawn` produces an anonymous task that is indistinguishable
//! from any other in a panic backtrace or a `tokio-console` dump. Every
//! long-running conclave task (the event keep-alive loop, the shutdown
//! finalizer, a proxy's registration retry) goes through here instead so it
//! shows up named.

use std::future::Future;

use tokio::task::JoinHandle;

/// Spawns `future` as a task named `name`. The name currently only shows up
/// in `tracing` spans entered by the task; it is not load-bearing for
/// scheduling.
pub fn spawn<Fut, Name>(name: Name, future: Fut) -> JoinHandle<Fut::Output>
where
    Name: Into<String>,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let name = name.into();
    let span = tracing::info_span!("task", name = %name);
    tokio::spawn(tracing::Instrument::instrument(future, span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_task_runs_and_returns() {
        let handle = spawn("test-task", async { 1 + 1 });
        assert_eq!(handle.await.unwrap(), 2);
    }
}
