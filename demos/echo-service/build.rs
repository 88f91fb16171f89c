// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protobuf_src::protoc());

    tonic_build::configure()
        .build_client(false)
        .build_server(true)
        // `rpc.proto`'s messages are already generated (and re-exported) by
        // `conclave-api`; point at that crate's types instead of
        // regenerating them here.
        .extern_path(".conclave.api", "::conclave_api::pb")
        .compile(&["proto/echo.proto"], &["proto", "../../src/api/proto"])?;
    Ok(())
}
