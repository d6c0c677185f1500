//! FTP client covering the slice of RFC 959 the camera firmware speaks:
//! USER/PASS login, binary mode, passive-mode single-file retrieval.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use tracing::{debug, trace};

use super::transport;
use super::{Endpoint, PROGRESS_DONE, Service};
use crate::error::{Error, Result};

/// Control-connection wrapper. Holds the session open between `login` and
/// `download` so a caller can fetch several files over one login.
pub struct FtpClient {
    host: String,
    port: u16,
    control: Option<BufReader<TcpStream>>,
}

impl FtpClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        FtpClient {
            host: endpoint.host().to_string(),
            port: endpoint.port_for(Service::Ftp),
            control: None,
        }
    }

    /// Log in and switch to binary mode. `Ok(false)` means the server
    /// answered but turned the credentials down; a connection failure means
    /// the endpoint does not expose FTP at all.
    pub fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        if self.control.is_some() {
            return Ok(true);
        }

        let stream = match transport::connect_port(&self.host, self.port) {
            Ok(stream) => stream,
            Err(err) => {
                debug!("ftp connect to {}:{} failed: {err}", self.host, self.port);
                return Err(Error::ProbeUnavailable("ftp"));
            }
        };
        let mut control = BufReader::new(stream);

        if !expect_status(&mut control, 220)? {
            return Ok(false);
        }
        send_command(&mut control, &format!("USER {username}"))?;
        if !expect_status(&mut control, 331)? {
            return Ok(false);
        }
        send_command(&mut control, &format!("PASS {password}"))?;
        if !expect_status(&mut control, 230)? {
            return Ok(false);
        }
        send_command(&mut control, "TYPE I")?;
        if !expect_status(&mut control, 200)? {
            return Ok(false);
        }

        debug!("ftp login as {username:?} succeeded");
        self.control = Some(control);
        Ok(true)
    }

    /// Retrieve `remote_file` from `remote_dir` over a passive-mode data
    /// connection, streaming it into `out`. `progress` is called with
    /// `(bytes_so_far, 0)` as data arrives and once more with
    /// `(bytes_so_far, PROGRESS_DONE)` when the transfer loop ends, whether
    /// it ended cleanly or not.
    pub fn download(
        &mut self,
        remote_dir: &str,
        remote_file: &str,
        out: &mut dyn Write,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<()> {
        let control = self
            .control
            .as_mut()
            .ok_or_else(|| Error::Protocol("FTP download attempted before login".into()))?;

        send_command(control, "PASV")?;
        let reply = require_status(control, 227)?;
        let data_port = parse_pasv_port(&reply)?;
        // Connect back to the host we dialed, not the address the server
        // advertises. Cameras behind NAT report their LAN address there.
        let mut data = transport::connect_port(&self.host, data_port)?;

        send_command(control, &format!("CWD {remote_dir}"))?;
        require_status(control, 250)?;
        send_command(control, &format!("RETR {remote_file}"))?;
        require_status(control, 150)?;

        let mut buf = [0u8; 4096];
        let mut received: u64 = 0;
        let outcome = loop {
            match data.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    if let Err(err) = out.write_all(&buf[..n]) {
                        break Err(Error::Transport(err));
                    }
                    received += n as u64;
                    progress(received, 0);
                }
                Err(err) => break Err(Error::Transport(err)),
            }
        };
        progress(received, PROGRESS_DONE);
        outcome?;

        require_status(control, 226)?;
        debug!("retrieved {remote_dir}/{remote_file} ({received} bytes)");
        Ok(())
    }

    /// Send QUIT and drop the control connection. Errors are ignored, the
    /// session is finished either way.
    pub fn close(&mut self) {
        if let Some(mut control) = self.control.take() {
            let _ = control.get_mut().write_all(b"QUIT\r\n");
        }
    }
}

fn send_command(control: &mut BufReader<TcpStream>, command: &str) -> Result<()> {
    trace!("ftp send: {command}");
    control
        .get_mut()
        .write_all(format!("{command}\r\n").as_bytes())?;
    Ok(())
}

/// Read one full server reply, skipping multi-line continuation lines. The
/// terminal line starts with three digits followed by a space.
fn read_reply(control: &mut impl BufRead) -> Result<(u32, String)> {
    loop {
        let mut buf = Vec::new();
        let n = control.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(Error::Protocol("FTP control connection closed".into()));
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        trace!("ftp reply: {line}");
        let bytes = line.as_bytes();
        if bytes.len() >= 4
            && bytes[..3].iter().all(u8::is_ascii_digit)
            && bytes[3] == b' '
            && let Ok(code) = line[..3].parse::<u32>()
        {
            return Ok((code, line));
        }
    }
}

fn expect_status(control: &mut impl BufRead, want: u32) -> Result<bool> {
    let (code, line) = read_reply(control)?;
    if code != want {
        debug!("ftp reply {line:?}, wanted {want}");
        return Ok(false);
    }
    Ok(true)
}

fn require_status(control: &mut impl BufRead, want: u32) -> Result<String> {
    let (code, line) = read_reply(control)?;
    if code != want {
        return Err(Error::Protocol(format!(
            "unexpected FTP reply {line:?}, wanted {want}"
        )));
    }
    Ok(line)
}

/// Pull the data port out of a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
/// reply. The address octets are ignored, only the port pair matters.
fn parse_pasv_port(reply: &str) -> Result<u16> {
    let malformed = || Error::Protocol(format!("malformed PASV reply: {reply:?}"));
    let start = reply.find('(').ok_or_else(malformed)?;
    let end = reply[start..].find(')').ok_or_else(malformed)? + start;
    let fields: Vec<&str> = reply[start + 1..end].split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(malformed());
    }
    let high: u8 = fields[4].parse().map_err(|_| malformed())?;
    let low: u8 = fields[5].parse().map_err(|_| malformed())?;
    Ok(u16::from(high) * 256 + u16::from(low))
}
