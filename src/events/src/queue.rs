// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use conclave_api::pb;

/// One item pushed onto a subscriber's queue.
///
/// Mirrors the original's use of a plain `Queue` where `None` meant
/// "stop listening" and an `EventStatus` meant "the server is shutting
/// down": both are end-of-stream markers, but only the latter should be
/// re-yielded to the caller before the stream closes.
pub(crate) enum QueueItem {
    Event(pb::Event),
    Interrupt,
    Shutdown(pb::Result),
}
