// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Small networking helpers: where a server binds, and what IP it reports
//! itself as to callers of `srv.info`.

use std::net::{SocketAddr, UdpSocket};

/// Discovers the local IP address that would be used to reach the public
/// internet, without actually sending any traffic.
///
/// UDP sockets don't perform a handshake on `connect`, so this never
/// touches the network; it only asks the kernel to pick a route and reports
/// the local address it chose. Falls back to the loopback address if no
/// route exists (e.g. in a fully offline sandbox).
pub fn local_ip() -> std::net::IpAddr {
    try_local_ip().unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
}

fn try_local_ip() -> Option<std::net::IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip())
}

/// Where a server's main listener should bind.
///
/// conclave listens on a single TCP port (`rpc-main-port`), but the
/// underlying transport matters for tests and for embedding multiple
/// servers in one process, so this stays generic over the two forms tonic
/// itself supports.
#[derive(Clone, Debug)]
pub enum ListenAddr {
    Inet(SocketAddr),
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

impl ListenAddr {
    pub fn inet(host: &str, port: u16) -> std::io::Result<Self> {
        use std::net::ToSocketAddrs;
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, format!("no address for {host}:{port}")))?;
        Ok(ListenAddr::Inet(addr))
    }
}

impl std::fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenAddr::Inet(addr) => write!(f, "{addr}"),
            #[cfg(unix)]
            ListenAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ip_never_panics() {
        let _ = local_ip();
    }

    #[test]
    fn inet_resolves_localhost() {
        let addr = ListenAddr::inet("localhost", 0).unwrap();
        match addr {
            ListenAddr::Inet(a) => assert_eq!(a.port(), 0),
            #[cfg(unix)]
            ListenAddr::Unix(_) => panic!("expected inet"),
        }
    }
}
