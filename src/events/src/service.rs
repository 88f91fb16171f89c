// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::pin::Pin;

use conclave_api::pb::EventStatus;
use futures::Stream;
use tonic::Status;

/// The stream type backing `EventService::listen`'s associated type.
///
/// `conclave-server`'s `EventServiceAdapter` implements the tonic-generated
/// trait directly (see its module docs for why), so this crate contributes
/// only the stream type the trait impl's associated type needs.
pub type ListenStream = Pin<Box<dyn Stream<Item = Result<EventStatus, Status>> + Send>>;
