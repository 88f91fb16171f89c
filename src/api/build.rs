// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // protobuf-src vendors a `protoc` binary so contributors don't need one
    // on their PATH.
    std::env::set_var("PROTOC", protobuf_src::protoc());

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile(&["proto/rpc.proto"], &["proto"])?;
    Ok(())
}
