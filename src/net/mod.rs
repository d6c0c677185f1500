//! Protocol clients for talking to embedded camera firmware: TCP transport,
//! a minimal HTTP/1.0 client, FTP with passive-mode transfers, and a Telnet
//! shell scraper.

use std::fmt;

pub mod ftp;
pub mod http;
pub mod telnet;
pub mod transport;

/// Sentinel total in a progress callback marking the single final
/// completion event of a transfer. Distinct from zero, which means the
/// total is simply not known.
pub const PROGRESS_DONE: u64 = u64::MAX;

/// Network services the toolkit speaks, with their registered ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Http,
    Ftp,
    Telnet,
}

impl Service {
    /// Registered default port, used when an `Endpoint` leaves a port at zero
    pub fn default_port(&self) -> u16 {
        match self {
            Service::Http => 80,
            Service::Ftp => 21,
            Service::Telnet => 23,
        }
    }

    /// Lowercase service name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Service::Http => "http",
            Service::Ftp => "ftp",
            Service::Telnet => "telnet",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A target device address. A port field left at zero resolves to the
/// service's registered default at connect time.
#[derive(Debug, Clone)]
pub struct Endpoint {
    host: String,
    http_port: u16,
    ftp_port: u16,
    telnet_port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http_port: 0,
            ftp_port: 0,
            telnet_port: 0,
        }
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    #[allow(dead_code)]
    pub fn with_ftp_port(mut self, port: u16) -> Self {
        self.ftp_port = port;
        self
    }

    #[allow(dead_code)]
    pub fn with_telnet_port(mut self, port: u16) -> Self {
        self.telnet_port = port;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configured HTTP port; zero means the default is in effect
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Effective port for a service, resolving zero to the registered default
    pub fn port_for(&self, service: Service) -> u16 {
        let configured = match service {
            Service::Http => self.http_port,
            Service::Ftp => self.ftp_port,
            Service::Telnet => self.telnet_port,
        };
        if configured == 0 {
            service.default_port()
        } else {
            configured
        }
    }
}
