//! Device identification engine. Probes an endpoint over HTTP and FTP,
//! scores what each probe sees, and reports the best candidate model along
//! with anything useful picked up on the way, admin credentials included.

pub mod confidence;
pub mod device_config;

use serde::Serialize;
use tracing::{debug, info};

use crate::devices::{DeviceKind, maygion_mips};
use crate::error::Error;
use crate::net::ftp::FtpClient;
use crate::net::http;
use crate::net::{Endpoint, Service};

use self::confidence::ConfidenceTable;
use self::device_config::Credentials;

/// Ports the web interface commonly hides on when it is not on 80
const HTTP_FALLBACK_PORTS: [u16; 2] = [81, 8080];

/// Everything a finished identification run learned.
#[derive(Debug, Serialize)]
pub struct IdentifyReport {
    /// Best candidate, if any probe pushed one over the confidence bar
    pub device: Option<DeviceKind>,
    /// Admin login, either recovered from the device or proven defaults
    pub credentials: Option<Credentials>,
    /// Web interface port when it is pinned or was discovered, 80 otherwise
    pub http_port: Option<u16>,
    /// Final per-candidate scores, in the order candidates appeared
    pub scores: Vec<(DeviceKind, i32)>,
}

/// One identification run against a single endpoint.
pub struct Identifier {
    endpoint: Endpoint,
    ftp: FtpClient,
    table: ConfidenceTable,
    credentials: Option<Credentials>,
    /// Current HTTP port; zero means automatic
    http_port: u16,
    fallback_ports: Vec<u16>,
}

impl Identifier {
    pub fn new(endpoint: Endpoint) -> Self {
        let ftp = FtpClient::new(&endpoint);
        let http_port = endpoint.http_port();
        Identifier {
            ftp,
            http_port,
            endpoint,
            table: ConfidenceTable::new(),
            credentials: None,
            fallback_ports: HTTP_FALLBACK_PORTS.to_vec(),
        }
    }

    /// Replace the ports tried when the web interface is not where expected.
    #[allow(dead_code)]
    pub fn with_fallback_ports(mut self, ports: Vec<u16>) -> Self {
        self.fallback_ports = ports;
        self
    }

    /// Run the probe sequence to completion. HTTP is tried first; FTP only
    /// when HTTP settled nothing, since a successful FTP login both confirms
    /// the model and may recover credentials worth retrying HTTP with. Port
    /// fallback runs last and only when no port was pinned or discovered.
    pub fn run(mut self) -> IdentifyReport {
        let mut http_ok = self.probe_http();

        if !http_ok && !self.table.any_confirmed() {
            self.probe_ftp();
            if self.credentials.is_some() {
                http_ok = self.probe_http();
            }
        }

        if !http_ok && self.http_port == 0 {
            for port in self.fallback_ports.clone() {
                self.http_port = port;
                if self.probe_http() {
                    http_ok = true;
                    break;
                }
            }
            if !http_ok {
                self.http_port = 0;
            }
        }

        self.ftp.close();

        let device = self.table.winner();
        match device {
            Some(kind) => info!("identified {} as {kind}", self.endpoint.host()),
            None => info!("could not identify {}", self.endpoint.host()),
        }
        IdentifyReport {
            device,
            credentials: self.credentials,
            http_port: (self.http_port != 0).then_some(self.http_port),
            scores: self.table.scores().to_vec(),
        }
    }

    fn effective_http_port(&self) -> u16 {
        if self.http_port != 0 {
            self.http_port
        } else {
            Service::Http.default_port()
        }
    }

    /// Probe the web interface. Returns true only when the status page
    /// answered with an authorized success response.
    fn probe_http(&mut self) -> bool {
        let host = self.endpoint.host().to_string();
        let port = self.effective_http_port();
        info!("probing http on {host}:{port}");

        let headers = http::fetch_headers(&host, port);
        if let Some(server) = headers.iter().find_map(|h| header_value(h, "Server")) {
            debug!("server header: {server:?}");
            if server == maygion_mips::SERVER_SIGNATURE {
                self.table.add(DeviceKind::MaygionMips, 10);
            }
        }

        let (username, password) = match &self.credentials {
            Some(creds) => (creds.username.as_str(), creds.password.as_str()),
            None => (maygion_mips::DEFAULT_USERNAME, maygion_mips::DEFAULT_PASSWORD),
        };
        let path = format!(
            "{}?user={username}&password={password}",
            maygion_mips::STATUS_PAGE
        );
        let body = match http::fetch(&host, port, &path) {
            Ok(body) => body,
            Err(Error::Transport(err)) => {
                debug!("http unreachable on {host}:{port}: {err}");
                return false;
            }
            Err(err) => {
                debug!("status page scrape failed: {err}");
                String::new()
            }
        };

        match extract_xml_value(&body, "Success") {
            Some("0") => {
                // Right status page shape, wrong password
                self.table.add(DeviceKind::MaygionMips, 20);
                match extract_xml_value(&body, "ErrorCode") {
                    Some("eHttpError_No_Auth") | Some("5") => {
                        self.table.add(DeviceKind::MaygionMips, 20);
                    }
                    other => debug!("unrecognized status page error code: {other:?}"),
                }
                false
            }
            Some("1") => {
                self.table.add(DeviceKind::MaygionMips, 10);
                if self.credentials.is_none() {
                    debug!("default credentials accepted");
                    self.credentials = Some(Credentials {
                        username: maygion_mips::DEFAULT_USERNAME.to_string(),
                        password: maygion_mips::DEFAULT_PASSWORD.to_string(),
                    });
                }
                let board = extract_xml_value(&body, "Board");
                debug!("board id: {board:?}");
                if board == Some("MIPS") {
                    self.table.confirm(DeviceKind::MaygionMips);
                }
                true
            }
            _ => {
                self.table.add(DeviceKind::MaygionMips, -10);
                false
            }
        }
    }

    /// Probe FTP with the camera's built-in service account. A successful
    /// login confirms the model outright; the configuration file it exposes
    /// may also name the web port and the admin login.
    fn probe_ftp(&mut self) {
        info!(
            "probing ftp on {}:{}",
            self.endpoint.host(),
            self.endpoint.port_for(Service::Ftp)
        );
        match self
            .ftp
            .login(maygion_mips::FTP_USERNAME, maygion_mips::FTP_PASSWORD)
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("ftp answered but rejected the camera service account");
                return;
            }
            Err(err) => {
                debug!("ftp probe skipped: {err}");
                return;
            }
        }
        self.table.confirm(DeviceKind::MaygionMips);

        let mut raw = Vec::new();
        if let Err(err) = self.ftp.download(
            maygion_mips::CONFIG_DIR,
            maygion_mips::CONFIG_FILE,
            &mut raw,
            &mut |_, _| {},
        ) {
            debug!("configuration fetch failed: {err}");
            return;
        }

        let config = device_config::parse(&raw);
        if let Some(port) = config.http_port {
            info!("web interface reported on port {port}");
            self.http_port = port;
        }
        if let Some(creds) = config.credentials {
            info!("recovered admin credentials for user {:?}", creds.username);
            self.credentials = Some(creds);
        }
    }
}

/// Value of the named header, case-insensitive on the name.
fn header_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = header.split_once(':')?;
    key.eq_ignore_ascii_case(name).then(|| value.trim_start())
}

/// Content of `<tag>...</tag>`, trimmed. Empty content counts as absent.
fn extract_xml_value<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    let value = xml[start..end].trim();
    (!value.is_empty()).then_some(value)
}
