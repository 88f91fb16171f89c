// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! On Unix, `SIGUSR2` dumps every in-flight call to a timestamped file
//! under the logs folder, for debugging a server that looks stuck without
//! having to attach a debugger to it.

use std::path::PathBuf;
use std::sync::Arc;

use conclave_ore::now::Now;

use crate::tracker::InFlightTracker;

/// Installs the `SIGUSR2` handler as a background task. A no-op on any
/// platform without that signal.
#[cfg(unix)]
pub fn install(tracker: Arc<InFlightTracker>, dump_dir: PathBuf, now: Now) {
    conclave_ore::task::spawn("debug-dump-signal", async move {
        let mut signal = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined2()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGUSR2 handler, debug dumps disabled");
                return;
            }
        };
        loop {
            signal.recv().await;
            if let Err(e) = write_dump(&tracker, &dump_dir, now.now()) {
                tracing::warn!(error = %e, "failed to write debug dump");
            }
        }
    });
}

#[cfg(not(unix))]
pub fn install(_tracker: Arc<InFlightTracker>, _dump_dir: PathBuf, _now: Now) {}

fn write_dump(tracker: &InFlightTracker, dump_dir: &std::path::Path, timestamp: u64) -> std::io::Result<()> {
    std::fs::create_dir_all(dump_dir)?;
    let path = dump_dir.join(format!("RpcServerDump-{timestamp}.txt"));
    let mut body = String::new();
    for trace in tracker.snapshot() {
        body.push_str(&format!("#{} {} started_at={} caller={}\n", trace.id, trace.rpc, trace.started_at, trace.metadata));
    }
    std::fs::write(path, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_contains_one_line_per_in_flight_call() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = InFlightTracker::new(Now::from_fn(|| 1000));
        let _guard = tracker.enter("svc.method", conclave_api::CallMetadata::new("c", "u", "h", "i", 1));

        write_dump(&tracker, tmp.path(), 1000).unwrap();
        let dumped = std::fs::read_to_string(tmp.path().join("RpcServerDump-1000.txt")).unwrap();
        assert!(dumped.contains("svc.method"));
    }
}
