//! Minimal HTTP/1.0 client. The embedded web servers on these cameras do
//! not reliably implement HTTP/1.1 keep-alive or chunked encoding, so every
//! request is a one-shot GET with `Connection: close` and the body is
//! whatever arrives before the peer hangs up.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use tracing::{debug, trace};

use super::transport;
use crate::error::{Error, Result};

/// Fetch the response header lines for `GET /` on the given port, each with
/// its trailing CR stripped, body discarded. An unreachable port or a
/// garbled status line comes back as an empty list: HTTP being absent here
/// is an expected outcome, not a failure.
pub fn fetch_headers(host: &str, port: u16) -> Vec<String> {
    match try_fetch_headers(host, port) {
        Ok(headers) => headers,
        Err(err) => {
            debug!("header fetch from {host}:{port} failed: {err}");
            Vec::new()
        }
    }
}

fn try_fetch_headers(host: &str, port: u16) -> Result<Vec<String>> {
    let stream = transport::connect_port(host, port)?;
    let mut reader = BufReader::new(stream);
    send_request(reader.get_mut(), host, "/")?;

    let Some(status) = read_line(&mut reader)? else {
        return Ok(Vec::new());
    };
    if parse_status_line(&status).is_err() {
        debug!("ignoring non-HTTP response from {host}:{port}");
        return Ok(Vec::new());
    }

    let mut headers = Vec::new();
    while let Some(line) = read_line(&mut reader)? {
        if line.is_empty() {
            break;
        }
        trace!("got header: {line}");
        headers.push(line);
    }
    Ok(headers)
}

/// Fetch `path` on the given port and return the response body, read until
/// the peer closes the connection. A non-200 status yields an empty body; a
/// status line that is not HTTP at all is a protocol error.
pub fn fetch(host: &str, port: u16, path: &str) -> Result<String> {
    debug!("fetching {path:?} from {host}:{port}");
    let stream = transport::connect_port(host, port)?;
    let mut reader = BufReader::new(stream);
    send_request(reader.get_mut(), host, path)?;

    let status = read_line(&mut reader)?
        .ok_or_else(|| Error::Protocol("empty HTTP response".into()))?;
    let code = parse_status_line(&status)?;
    if code != 200 {
        debug!("unexpected HTTP status {code} for {path:?}");
        return Ok(String::new());
    }

    // Skip headers up to the blank separator line
    while let Some(line) = read_line(&mut reader)? {
        if line.is_empty() {
            break;
        }
        trace!("got header: {line}");
    }

    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn send_request(stream: &mut TcpStream, host: &str, path: &str) -> Result<()> {
    let request = format!(
        "GET {path} HTTP/1.0\r\nHost: {host}\r\nAccept: */*\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;
    Ok(())
}

/// Read one line as raw bytes, strip the CRLF tail, and decode leniently.
/// `None` means the peer already closed the connection.
fn read_line(reader: &mut impl BufRead) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Validate `HTTP/x.y NNN reason` and return the status code
fn parse_status_line(line: &str) -> Result<u32> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(Error::Protocol(format!("not an HTTP response: {line:?}")));
    }
    parts
        .next()
        .and_then(|token| token.parse::<u32>().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed HTTP status line: {line:?}")))
}
