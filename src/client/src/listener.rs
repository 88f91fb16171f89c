// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! A long-running `events.listen` consumer that reconnects on its own,
//! the way a service that merely wants a feed of events (rather than
//! managing a stream by hand) should consume the event bus.

use std::time::Duration;

use conclave_api::pb::Event;
use conclave_api::ResultCode;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::builtin::EventsClient;
use crate::retry::RETRY_DELAY;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Spawns a task that keeps a `listen` stream open against `events` for as
/// long as the process runs, invoking `on_event` for every non-keep-alive
/// event received.
///
/// Reconnects are retried with exponential back-off starting at
/// [`RETRY_DELAY`]: the last seen subscriber id is remembered and reused so
/// a reconnect resumes rather than starts over, except after
/// `ERROR_ITEM_UNKNOWN` (the server forgot the subscriber, most likely its
/// retention window elapsed), which clears the remembered id and forces a
/// fresh subscription.
pub struct EventListener;

impl EventListener {
    pub fn spawn<F>(events: EventsClient, names: Vec<String>, mut on_event: F) -> JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        conclave_ore::task::spawn("events-listener", async move {
            let mut client_id = 0i32;
            let mut backoff = RETRY_DELAY;
            loop {
                match events.listen(client_id, names.clone()).await {
                    Ok(mut stream) => {
                        backoff = RETRY_DELAY;
                        let mut shutdown = false;
                        while let Some(item) = stream.next().await {
                            match item {
                                Ok(status) => {
                                    if status.client_id > 0 {
                                        client_id = status.client_id;
                                    }
                                    if let Some(r) = &status.r {
                                        if r.code == i32::from(ResultCode::ErrorStreamShutdown) {
                                            shutdown = true;
                                            break;
                                        }
                                    }
                                    if let Some(event) = status.event {
                                        on_event(event);
                                    }
                                }
                                Err(err) => {
                                    if err.code == i32::from(ResultCode::ErrorItemUnknown) {
                                        client_id = 0;
                                    }
                                    break;
                                }
                            }
                        }
                        if shutdown {
                            tokio::time::sleep(backoff).await;
                        }
                    }
                    Err(_) => {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        })
    }
}
