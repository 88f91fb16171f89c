// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::collections::HashMap;
use std::sync::Arc;

use conclave_api::pb;
use conclave_api::{RpcError, RpcResult};
use conclave_config::{static_config, ConfigManager};
use conclave_ore::folders::Folders;
use conclave_ore::id::IdPool;
use conclave_ore::now::{EpochMillis, Now};
use futures::Stream;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::queue::QueueItem;

const QUEUES_FILE: &str = "queues.json";

struct QueueEntry {
    tx: mpsc::UnboundedSender<QueueItem>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<QueueItem>>>,
}

struct State {
    queues: HashMap<i32, QueueEntry>,
    interrupt_times: HashMap<i32, Option<EpochMillis>>,
    ids: IdPool,
}

/// The `srv.events` service's backing store: one queue per active
/// subscriber, a keep-alive task that exercises all of them, and a
/// retention window that drops a subscriber's queue if it doesn't resume
/// listening in time.
pub struct EventsManager {
    folders: Folders,
    config: Arc<ConfigManager>,
    now: Now,
    state: SyncMutex<State>,
    keep_alive_stop: Arc<Notify>,
    keep_alive_handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl EventsManager {
    pub fn new(folders: Folders, config: Arc<ConfigManager>, now: Now) -> RpcResult<Self> {
        let persisted = load_queue_ids(&folders.workspace().join(QUEUES_FILE))?;
        let mut queues = HashMap::new();
        let mut interrupt_times = HashMap::new();
        let mut ids = IdPool::new();
        let load_time = now.now();
        for index in persisted {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(index, QueueEntry { tx, rx: Arc::new(AsyncMutex::new(rx)) });
            // A queue recreated from disk has no listener attached yet, so
            // it is immediately eligible for retain-timeout eviction unless
            // resumed.
            interrupt_times.insert(index, Some(load_time));
            ids.mark_taken(index);
        }

        Ok(EventsManager {
            folders,
            config,
            now,
            state: SyncMutex::new(State { queues, interrupt_times, ids }),
            keep_alive_stop: Arc::new(Notify::new()),
            keep_alive_handle: SyncMutex::new(None),
        })
    }

    /// Starts the background task that pushes an empty-named keep-alive
    /// event to every subscriber on an interval. Takes `self` as an `Arc`
    /// since the task outlives the call that spawns it.
    pub fn spawn_keep_alive(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = conclave_ore::task::spawn("events-keep-alive", async move {
            loop {
                if let Err(err) = this.internal_send(pb::Event::default()) {
                    tracing::error!(%err, "exception while sending keep alive event");
                }
                let keepalive_secs = this.config.static_int(static_config::EVENT_KEEPALIVE_TIMEOUT) as u64;
                tokio::select! {
                    _ = this.keep_alive_stop.notified() => break,
                    _ = tokio::time::sleep(std::time::Duration::from_secs(keepalive_secs)) => {}
                }
            }
        });
        *self.keep_alive_handle.lock() = Some(handle);
    }

    pub async fn shutdown(&self) {
        self.keep_alive_stop.notify_waiters();
        let handle = self.keep_alive_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let state = self.state.lock();
        for entry in state.queues.values() {
            let _ = entry.tx.send(QueueItem::Shutdown(pb::Result {
                code: i32::from(conclave_api::ResultCode::ErrorStreamShutdown),
                message: "service is shutdown".to_owned(),
                stack: String::new(),
            }));
        }
    }

    pub fn listen(self: &Arc<Self>, request: pb::EventFilter) -> RpcResult<impl Stream<Item = RpcResult<pb::EventStatus>>> {
        for name in &request.names {
            if name.is_empty() {
                return Err(RpcError::param_missing("names"));
            }
            if name.contains(' ') {
                return Err(RpcError::param_invalid("names", format!("must not contain whitespace: {name}")));
            }
        }

        let (index, rx) = self.register_listener(request.client_id)?;
        let this = Arc::clone(self);
        let names = request.names;

        Ok(async_stream::stream! {
            yield Ok(pb::EventStatus { r: None, client_id: index, event: None });

            let mut rx = rx.lock().await;
            let mut shutdown_event = None;
            loop {
                match rx.recv().await {
                    None | Some(QueueItem::Interrupt) => break,
                    Some(QueueItem::Shutdown(r)) => {
                        shutdown_event = Some(pb::EventStatus { r: Some(r), client_id: index, event: None });
                        break;
                    }
                    Some(QueueItem::Event(event)) => {
                        if names.is_empty() || names.contains(&event.name) {
                            yield Ok(pb::EventStatus { r: None, client_id: index, event: Some(event) });
                        }
                    }
                }
            }
            drop(rx);

            this.mark_interrupted(index);
            if let Some(event) = shutdown_event {
                yield Ok(event);
            }
        })
    }

    pub fn interrupt(&self, request: &pb::EventInterrupt) -> RpcResult<()> {
        let state = self.state.lock();
        let entry = state
            .queues
            .get(&request.client_id)
            .ok_or_else(|| RpcError::item_unknown(&request.client_id.to_string()))?;
        if let Some(Some(_)) = state.interrupt_times.get(&request.client_id) {
            return Err(RpcError::new(
                conclave_api::ResultCode::ErrorStateUnexpected,
                format!("already interrupted: {}", request.client_id),
            ));
        }
        let _ = entry.tx.send(QueueItem::Interrupt);
        Ok(())
    }

    pub fn send(&self, event: pb::Event) -> RpcResult<()> {
        if event.name.is_empty() {
            return Err(RpcError::param_missing("name"));
        }
        if event.name.contains(' ') {
            return Err(RpcError::param_invalid("name", format!("must not contain whitespace: {}", event.name)));
        }
        self.internal_send(event)
    }

    pub fn inspect(&self) -> Vec<i32> {
        self.state.lock().queues.keys().copied().collect()
    }

    fn register_listener(&self, client_id: i32) -> RpcResult<(i32, Arc<AsyncMutex<mpsc::UnboundedReceiver<QueueItem>>>)> {
        let mut state = self.state.lock();
        if client_id > 0 {
            let index = client_id;
            let rx = state
                .queues
                .get(&index)
                .map(|entry| entry.rx.clone())
                .ok_or_else(|| RpcError::item_unknown(&index.to_string()))?;
            state.interrupt_times.insert(index, None);
            Ok((index, rx))
        } else {
            let index = state.ids.allocate();
            let (tx, rx) = mpsc::unbounded_channel();
            let rx = Arc::new(AsyncMutex::new(rx));
            state.queues.insert(index, QueueEntry { tx, rx: rx.clone() });
            state.interrupt_times.insert(index, None);
            let ids: Vec<i32> = state.queues.keys().copied().collect();
            drop(state);
            self.persist_queue_ids(&ids)?;
            Ok((index, rx))
        }
    }

    fn mark_interrupted(&self, index: i32) {
        self.state.lock().interrupt_times.insert(index, Some(self.now.now()));
    }

    fn internal_send(&self, event: pb::Event) -> RpcResult<()> {
        let retain_timeout_ms = (self.config.static_int(static_config::EVENT_RETAIN_TIMEOUT) as u64).saturating_mul(1000);
        let now = self.now.now();
        let mut state = self.state.lock();

        let indices: Vec<i32> = state.queues.keys().copied().collect();
        let mut to_delete = Vec::new();
        for index in indices {
            let interrupted_at = state.interrupt_times.get(&index).copied().flatten();
            let expired = interrupted_at.map_or(false, |t| now.saturating_sub(t) >= retain_timeout_ms);
            if expired {
                to_delete.push(index);
            } else if let Some(entry) = state.queues.get(&index) {
                let _ = entry.tx.send(QueueItem::Event(event.clone()));
            }
        }

        if !to_delete.is_empty() {
            for index in &to_delete {
                state.queues.remove(index);
                state.interrupt_times.remove(index);
                state.ids.release(*index);
            }
            let ids: Vec<i32> = state.queues.keys().copied().collect();
            drop(state);
            self.persist_queue_ids(&ids)?;
        }
        Ok(())
    }

    fn persist_queue_ids(&self, ids: &[i32]) -> RpcResult<()> {
        save_queue_ids(&self.folders.workspace().join(QUEUES_FILE), ids)
    }
}

fn load_queue_ids(path: &std::path::Path) -> RpcResult<Vec<i32>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("can't read {}: {e}", path.display()))),
    };
    let value: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("invalid queues json at {}: {e}", path.display())))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("expected a flat object at {}", path.display())))?;
    obj.keys()
        .map(|k| k.parse::<i32>().map_err(|_| RpcError::new(conclave_api::ResultCode::ErrorModelInvalid, format!("non-integer queue id: {k}"))))
        .collect()
}

fn save_queue_ids(path: &std::path::Path, ids: &[i32]) -> RpcResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
    }
    let mut map = serde_json::Map::with_capacity(ids.len());
    for id in ids {
        map.insert(id.to_string(), serde_json::Value::Array(Vec::new()));
    }
    let json = serde_json::to_string_pretty(&serde_json::Value::Object(map)).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, e.to_string()))?;
    std::fs::write(path, json).map_err(|e| RpcError::new(conclave_api::ResultCode::Error, format!("can't write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    use conclave_api::ResultCode;
    use futures::StreamExt;

    use super::*;

    fn folders(tmp: &Path) -> Folders {
        Folders::new(tmp.join("system"), tmp.join("user"), tmp.join("workspace"))
    }

    fn config() -> Arc<ConfigManager> {
        Arc::new(ConfigManager::new(Folders::new("/nonexistent-system", "/nonexistent-user", std::env::temp_dir()), HashMap::new(), static_config::items(), vec![]).unwrap())
    }

    fn clock(start: u64) -> Now {
        let millis = Arc::new(AtomicU64::new(start));
        Now::from_fn(move || millis.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn listen_resume_interrupt_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = Arc::new(EventsManager::new(folders(tmp.path()), config(), clock(0)).unwrap());

        let mut stream = mgr.listen(pb::EventFilter { client_id: 0, names: vec![] }).unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let client_id = first.client_id;
        assert!(client_id > 0);
        assert!(first.event.is_none());

        mgr.send(pb::Event { name: "tick".to_owned(), properties: vec![] }).unwrap();
        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(next.event.unwrap().name, "tick");

        mgr.interrupt(&pb::EventInterrupt { client_id }).unwrap();
        assert!(stream.next().await.is_none());

        // Interrupting an already-interrupted subscriber is rejected.
        let err = mgr.interrupt(&pb::EventInterrupt { client_id }).unwrap_err();
        assert_eq!(err.code, i32::from(ResultCode::ErrorStateUnexpected));

        // Resuming picks the same queue back up.
        let mut resumed = mgr.listen(pb::EventFilter { client_id, names: vec![] }).unwrap();
        let header = resumed.next().await.unwrap().unwrap();
        assert_eq!(header.client_id, client_id);
    }

    #[tokio::test]
    async fn listen_filters_out_non_matching_names() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = Arc::new(EventsManager::new(folders(tmp.path()), config(), clock(0)).unwrap());

        let mut stream = mgr.listen(pb::EventFilter { client_id: 0, names: vec!["wanted".to_owned()] }).unwrap();
        stream.next().await.unwrap().unwrap();

        mgr.send(pb::Event { name: "ignored".to_owned(), properties: vec![] }).unwrap();
        mgr.send(pb::Event { name: "wanted".to_owned(), properties: vec![] }).unwrap();

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.event.unwrap().name, "wanted");
    }

    #[tokio::test]
    async fn inspect_lists_registered_subscribers() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = Arc::new(EventsManager::new(folders(tmp.path()), config(), clock(0)).unwrap());
        assert!(mgr.inspect().is_empty());

        let mut stream = mgr.listen(pb::EventFilter { client_id: 0, names: vec![] }).unwrap();
        let header = stream.next().await.unwrap().unwrap();
        assert_eq!(mgr.inspect(), vec![header.client_id]);
    }

    #[tokio::test]
    async fn send_rejects_missing_or_blank_name() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = EventsManager::new(folders(tmp.path()), config(), clock(0)).unwrap();
        let err = mgr.send(pb::Event { name: String::new(), properties: vec![] }).unwrap_err();
        assert_eq!(err.code, i32::from(ResultCode::ErrorParamMissing));

        let err = mgr.send(pb::Event { name: "has space".to_owned(), properties: vec![] }).unwrap_err();
        assert_eq!(err.code, i32::from(ResultCode::ErrorParamInvalid));
    }

    #[tokio::test]
    async fn shutdown_pushes_shutdown_status_to_every_listener() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = Arc::new(EventsManager::new(folders(tmp.path()), config(), clock(0)).unwrap());

        let mut stream = mgr.listen(pb::EventFilter { client_id: 0, names: vec![] }).unwrap();
        stream.next().await.unwrap().unwrap();

        mgr.shutdown().await;

        let closing = stream.next().await.unwrap().unwrap();
        assert_eq!(closing.r.unwrap().code, i32::from(ResultCode::ErrorStreamShutdown));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn load_and_save_queue_ids_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(QUEUES_FILE);
        save_queue_ids(&path, &[2, 5, 1]).unwrap();
        let mut loaded = load_queue_ids(&path).unwrap();
        loaded.sort();
        assert_eq!(loaded, vec![1, 2, 5]);
    }

    #[test]
    fn load_queue_ids_tolerates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_queue_ids(&tmp.path().join(QUEUES_FILE)).unwrap().is_empty());
    }
}
