//! TCP connection establishment: name resolution, a bounded connect per
//! resolved address, and read/write timeouts on every stream handed out.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

use dns_lookup::lookup_host;
use tracing::debug;

use super::{Endpoint, Service};
use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Embedded devices can be slow to assemble a reply, but a peer silent for
/// this long is considered hung
const READ_TIMEOUT: Duration = Duration::from_secs(30);

const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect to `endpoint` for the given service. Tries each resolved address
/// once and never retries beyond that; callers decide whether an alternate
/// port is worth a second attempt. The caller owns the returned stream.
pub fn connect(endpoint: &Endpoint, service: Service) -> Result<TcpStream> {
    let port = endpoint.port_for(service);
    debug!("connecting to {} port {port} ({service})", endpoint.host());
    connect_port(endpoint.host(), port)
}

/// Connect to an explicit port on `host`. Used for FTP data channels, whose
/// port comes out of the PASV negotiation rather than an `Endpoint`.
pub fn connect_port(host: &str, port: u16) -> Result<TcpStream> {
    let mut last_err: Option<io::Error> = None;
    for addr in resolve(host)? {
        let target = SocketAddr::new(addr, port);
        match TcpStream::connect_timeout(&target, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_read_timeout(Some(READ_TIMEOUT))?;
                stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
                return Ok(stream);
            }
            Err(err) => {
                debug!("connect to {target} failed: {err}");
                last_err = Some(err);
            }
        }
    }
    Err(Error::Transport(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        )
    })))
}

fn resolve(host: &str) -> Result<Vec<IpAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    Ok(lookup_host(host)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use std::net::TcpListener;

    #[test]
    fn test_resolve_accepts_literal_addresses() {
        let addrs = resolve("127.0.0.1").unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);

        let addrs = resolve("::1").unwrap();
        assert_eq!(addrs, vec!["::1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_connect_port_reaches_a_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect_port("127.0.0.1", port).unwrap();
        assert!(stream.peer_addr().is_ok());
    }

    #[test]
    fn test_connect_port_fails_on_dead_port() {
        let port = test_utils::dead_port();
        let result = connect_port("127.0.0.1", port);
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[test]
    fn test_connect_resolves_service_port_overrides() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let endpoint = Endpoint::new("127.0.0.1").with_telnet_port(port);
        let stream = connect(&endpoint, Service::Telnet).unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }
}
