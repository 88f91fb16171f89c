// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Coordinates a graceful shutdown: stop accepting new calls, run every
//! manager's `shutdown` hook in reverse registration order, wait out a
//! finalizer delay, then let the process exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conclave_client::Client;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::manager::Manager;

/// Drives the process from "serving" to "gone", once.
///
/// Managers are handed to [`Self::new`] in the same order they were loaded;
/// `shutdown` runs their hooks back to front, mirroring how a stack of
/// resources is usually torn down.
pub struct ShutdownCoordinator {
    managers: Vec<Arc<dyn Manager>>,
    accepting: AtomicBool,
    closing_tx: watch::Sender<bool>,
    closing_rx: watch::Receiver<bool>,
    complete_tx: watch::Sender<bool>,
    complete_rx: watch::Receiver<bool>,
    auto_client: Mutex<Option<Client>>,
}

impl ShutdownCoordinator {
    pub fn new(managers: Vec<Arc<dyn Manager>>) -> Self {
        let (closing_tx, closing_rx) = watch::channel(false);
        let (complete_tx, complete_rx) = watch::channel(false);
        ShutdownCoordinator {
            managers,
            accepting: AtomicBool::new(true),
            closing_tx,
            closing_rx,
            complete_tx,
            complete_rx,
            auto_client: Mutex::new(None),
        }
    }

    /// Installs the server's own auto-client, used after shutdown completes
    /// to make one last probing call confirming the listener actually came
    /// down (mirrors what a caller relying on `srv.shutdown` would see).
    pub fn set_auto_client(&self, client: Client) {
        *self.auto_client.lock() = Some(client);
    }

    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Resolves as soon as the server stops accepting new calls (step 1 of
    /// the shutdown sequence), well before the sequence as a whole
    /// finishes. The hosting binary awaits this — not [`Self::wait_shutdown`]
    /// — to gate the transport's own graceful-stop future: gating it on
    /// full completion would deadlock, since completion itself waits for
    /// the transport to actually finish closing (see
    /// [`Self::probe_until_closed`]).
    pub async fn wait_closing(&self) {
        let mut rx = self.closing_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Resolves once shutdown has fully completed.
    pub async fn wait_shutdown(&self) {
        let mut rx = self.complete_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Runs the full sequence: stop accepting, run every manager's
    /// `shutdown` hook in reverse, wait `finalizer_delay`, then mark
    /// complete. `finalizer_delay` of `None` means no delay at all
    /// (the original's encoding of a negative requested timeout).
    ///
    /// Signals [`Self::wait_closing`] immediately after flipping
    /// `accepting`, not at the end: the transport's graceful-stop is driven
    /// off that signal, and [`Self::probe_until_closed`] below can only
    /// ever observe the listener close if the transport was told to start
    /// closing first.
    pub async fn run(&self, finalizer_delay: Option<Duration>) {
        self.accepting.store(false, Ordering::SeqCst);
        tracing::info!("shutdown: no longer accepting new calls");
        let _ = self.closing_tx.send(true);

        for manager in self.managers.iter().rev() {
            manager.shutdown().await;
        }

        if let Some(delay) = finalizer_delay {
            tracing::info!(?delay, "shutdown: waiting out finalizer delay");
            tokio::time::sleep(delay).await;
        }

        self.probe_until_closed().await;
        self.remove_log_handlers();
        let _ = self.complete_tx.send(true);
        tracing::info!("shutdown: complete");
    }

    /// Spawns [`Self::run`] as a detached, named task instead of awaiting
    /// it inline. Used when shutdown is triggered by an RPC: the handler
    /// returns its response to the caller immediately instead of blocking
    /// the connection that asked for the shutdown in the first place.
    pub fn run_detached(self: &Arc<Self>, finalizer_delay: Option<Duration>) {
        let this = Arc::clone(self);
        conclave_ore::task::spawn("shutdown-finalizer", async move {
            this.run(finalizer_delay).await;
        });
    }

    /// Resolves a shutdown request's timeout (seconds, 0 = server default,
    /// negative = no delay at all) against `configured_default` into a
    /// delay to actually wait, or `None` for no delay.
    pub fn resolve_delay(requested_timeout: i64, configured_default: f64) -> Option<Duration> {
        if requested_timeout < 0 {
            return None;
        }
        let seconds = if requested_timeout == 0 { configured_default } else { requested_timeout as f64 };
        if seconds <= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(seconds))
        }
    }

    /// Coerces the stored auto-client into a one-shot probe and calls
    /// `srv.info` on it repeatedly until the call fails, proving the
    /// listener socket has actually closed. A server with no auto-client
    /// installed (only possible in tests that construct a bare
    /// coordinator) skips straight through.
    async fn probe_until_closed(&self) {
        let Some(client) = self.auto_client.lock().clone() else { return };
        let probe = client.into_one_shot();
        loop {
            if probe.srv().info(Vec::new()).await.is_err() {
                tracing::debug!("shutdown: auto-client probe confirms listener closed");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Tears down rotating log handlers. The framework only ever hosted
    /// runtime-adjustable log *levels*, never an actual rotating-file
    /// handler (that mechanism is an external collaborator), so this has
    /// nothing to release; it stays as an explicit step so the sequence
    /// documented in the shutdown contract reads completely.
    fn remove_log_handlers(&self) {
        tracing::debug!("shutdown: no rotating log handlers to remove");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RecordingManager {
        order: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    #[async_trait]
    impl Manager for RecordingManager {
        async fn shutdown(&self) {
            self.order.lock().push(self.name);
        }
    }

    #[tokio::test]
    async fn shutdown_runs_managers_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let managers: Vec<Arc<dyn Manager>> = vec![
            Arc::new(RecordingManager { order: order.clone(), name: "a" }),
            Arc::new(RecordingManager { order: order.clone(), name: "b" }),
            Arc::new(RecordingManager { order: order.clone(), name: "c" }),
        ];
        let coordinator = ShutdownCoordinator::new(managers);
        coordinator.run(None).await;
        assert_eq!(*order.lock(), vec!["c", "b", "a"]);
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn wait_shutdown_resolves_after_run_completes() {
        let coordinator = Arc::new(ShutdownCoordinator::new(vec![]));
        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait_shutdown().await });
        coordinator.run(None).await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn wait_closing_resolves_before_managers_finish_shutdown() {
        struct SlowManager {
            started: Arc<tokio::sync::Notify>,
        }
        #[async_trait]
        impl Manager for SlowManager {
            async fn shutdown(&self) {
                self.started.notify_one();
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
        let started = Arc::new(tokio::sync::Notify::new());
        let managers: Vec<Arc<dyn Manager>> = vec![Arc::new(SlowManager { started: started.clone() })];
        let coordinator = Arc::new(ShutdownCoordinator::new(managers));

        let runner = coordinator.clone();
        let handle = tokio::spawn(async move { runner.run(None).await });

        tokio::time::timeout(Duration::from_millis(100), coordinator.wait_closing()).await.expect("wait_closing resolved while the manager hook was still running");
        assert!(!coordinator.is_running());
        started.notified().await;
        assert!(!handle.is_finished(), "run() should still be mid-sequence when wait_closing resolves");
        handle.await.unwrap();
    }

    #[test]
    fn resolve_delay_negative_means_no_delay() {
        assert!(ShutdownCoordinator::resolve_delay(-1, 30.0).is_none());
    }

    #[test]
    fn resolve_delay_zero_uses_configured_default() {
        assert_eq!(ShutdownCoordinator::resolve_delay(0, 30.0), Some(Duration::from_secs_f64(30.0)));
    }

    #[test]
    fn resolve_delay_explicit_value_overrides_default() {
        assert_eq!(ShutdownCoordinator::resolve_delay(5, 30.0), Some(Duration::from_secs_f64(5.0)));
    }
}
