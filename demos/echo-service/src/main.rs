// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! A standalone binary hosting the `echo` service alongside the framework's
//! built-in `srv`/`config`/`log`/`events` services, demonstrating the
//! [`conclave_server::Server::bootstrap`] contract end to end.

use std::io;

use clap::Parser;
use conclave_api::config_service_server::ConfigServiceServer;
use conclave_api::event_service_server::EventServiceServer;
use conclave_api::logger_service_server::LoggerServiceServer;
use conclave_api::rpc_server_service_server::RpcServerServiceServer;
use conclave_ore::cli::{ConfigOverride, NO_VERSION_HELP_TEMPLATE};
use conclave_ore::folders::Folders;
use conclave_server::{Server, ServerOptions, ServiceDescriptor};
use echo_service::{pb::echo_service_server::EchoServiceServer, EchoManager, EchoServiceAdapter};
use tracing_subscriber::filter::EnvFilter;

const BUILD_INFO: conclave_build_info::BuildInfo = conclave_build_info::build_info!();

/// A minimal conclave server hosting the echo demo service.
#[derive(Parser)]
#[clap(help_template = NO_VERSION_HELP_TEMPLATE)]
struct Args {
    /// Override the system folder.
    #[clap(long, default_value = "/etc/echo-service", parse(from_str = expanded_path))]
    system: std::path::PathBuf,

    /// Override the user folder.
    #[clap(long, default_value = "~/.config/echo-service", parse(from_str = expanded_path))]
    user: std::path::PathBuf,

    /// Workspace folder, used for persisted proxy/config state and logs.
    #[clap(short, long, default_value = "./echo-service-workspace", parse(from_str = expanded_path))]
    workspace: std::path::PathBuf,

    /// RPC server listening port.
    #[clap(short, long, default_value = "54321")]
    port: u16,

    /// Override a configuration item, e.g. `-c rpc-max-workers=8`.
    #[clap(short = 'c', long = "config", value_name = "NAME=VALUE")]
    config_overrides: Vec<ConfigOverride>,

    /// Which log messages to emit.
    #[clap(long, value_name = "FILTER", default_value = "info")]
    log_filter: EnvFilter,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("echo-service: fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args: Args = conclave_ore::cli::parse_args();

    tracing_subscriber::fmt().with_env_filter(args.log_filter).with_writer(io::stderr).init();

    let folders = Folders::new(args.system, args.user, args.workspace);
    let cli_overrides = args.config_overrides.into_iter().map(|o| (o.name, o.value)).collect();

    let mut options = ServerOptions::new(args.port, folders, BUILD_INFO);
    options.cli_overrides = cli_overrides;
    options.user_descriptors.push(ServiceDescriptor::new("echo", BUILD_INFO.version, vec![1]));

    let server = Server::bootstrap(options).await?;
    tracing::info!(port = server.listener.local_addr()?.port(), "echo-service listening");

    let echo_service = EchoServiceServer::new(EchoServiceAdapter::new(EchoManager, server.dispatch_for("echo")));

    let router = tonic::transport::Server::builder()
        .layer(server.concurrency_layer())
        .add_service(RpcServerServiceServer::new(server.srv_service()))
        .add_service(ConfigServiceServer::new(server.config_service()))
        .add_service(LoggerServiceServer::new(server.logger_service()))
        .add_optional_service(server.events_service().map(EventServiceServer::new))
        .add_service(echo_service);

    let listener = tokio::net::TcpListener::from_std(server.listener)?;
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    let shutdown = server.shutdown;
    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt, shutting down");
                shutdown.run_detached(None);
            }
            () = shutdown.wait_closing() => {}
        }
    };

    router.serve_with_incoming_shutdown(incoming, shutdown_signal).await?;
    Ok(())
}

/// Expands a leading `~` to `$HOME`, the way a shell would. Every other
/// path is passed through untouched.
fn expanded_path(arg: &str) -> std::path::PathBuf {
    match arg.strip_prefix("~/") {
        Some(rest) => std::env::var_os("HOME").map(|home| std::path::Path::new(&home).join(rest)).unwrap_or_else(|| arg.into()),
        None => arg.into(),
    }
}
