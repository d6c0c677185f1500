//! Parser for the `cs.ini` configuration file the camera keeps in its
//! ramdisk. The interesting parts are the web-server port and the `ui=`
//! line, which carries the admin credentials as a base64 blob.

use serde::Serialize;
use tracing::{debug, trace};

/// Admin login recovered from the configuration blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Everything the configuration file tells us about the device.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Web interface port, only when it differs from the default 80
    pub http_port: Option<u16>,
    /// Present only when the blob yields both a username and a password
    pub credentials: Option<Credentials>,
}

#[derive(PartialEq)]
enum Section {
    None,
    Http,
    Usr,
    Other,
}

/// Parse the raw file contents. Unknown sections and keys are skipped, so a
/// firmware revision that adds fields does not break the scan.
pub fn parse(raw: &[u8]) -> DeviceConfig {
    let text = String::from_utf8_lossy(raw);
    let mut config = DeviceConfig::default();
    let mut sextets: Vec<u8> = Vec::new();
    let mut section = Section::None;

    for line in text.lines() {
        trace!("config line: {line}");
        if line.starts_with("[http]") {
            section = Section::Http;
        } else if line.starts_with("[usr]") {
            section = Section::Usr;
        } else if line.starts_with('[') {
            section = Section::Other;
        } else if section == Section::Http
            && let Some(value) = line.strip_prefix("port=")
            && let Some(port) = parse_port(value)
            && port != 80
            && port != 0
        {
            debug!("web interface reported on port {port}");
            config.http_port = Some(port);
        } else if section == Section::Usr
            && let Some(encoded) = line.strip_prefix("ui=")
        {
            sextets.extend(encoded.bytes().filter_map(decode_sextet));
        }
    }

    if !sextets.is_empty() {
        let decoded_bytes = pack(&sextets);
        let decoded = String::from_utf8_lossy(&decoded_bytes);
        trace!("decoded ui blob: {decoded}");
        if let (Some(username), Some(password)) =
            (field(&decoded, "usr="), field(&decoded, "pwd="))
            && !username.is_empty()
            && !password.is_empty()
        {
            config.credentials = Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            });
        }
    }

    config
}

/// Decode table from base64.sourceforge.net's b64.c, indexed by `byte - 43`.
/// `$` marks characters outside the alphabet; sextet value is entry minus 62.
const DECODE_TABLE: &[u8; 80] =
    b"|$$$}rstuvwxyz{$$$$$$$>?@ABCDEFGHIJKLMNOPQRSTUVW$$$$$$XYZ[\\]^_`abcdefghijklmnopq";

fn decode_sextet(byte: u8) -> Option<u8> {
    if !(43..=122).contains(&byte) {
        return None;
    }
    let mapped = DECODE_TABLE[usize::from(byte - 43)];
    if mapped == b'$' {
        return None;
    }
    Some(mapped - 62)
}

/// Pack 6-bit values back into bytes, four at a time. A short tail yields
/// only the bytes it fully covers.
fn pack(sextets: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(sextets.len() * 3 / 4);
    for chunk in sextets.chunks(4) {
        if chunk.len() >= 2 {
            out.push(chunk[0] << 2 | chunk[1] >> 4);
        }
        if chunk.len() >= 3 {
            out.push(chunk[1] << 4 | chunk[2] >> 2);
        }
        if chunk.len() == 4 {
            out.push(chunk[2] << 6 | chunk[3]);
        }
    }
    out
}

/// Value of `key` up to the next CRLF, or to the end of the text.
fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let start = text.find(key)? + key.len();
    let rest = &text[start..];
    let end = rest.find("\r\n").unwrap_or(rest.len());
    Some(&rest[..end])
}

fn parse_port(value: &str) -> Option<u16> {
    let value = value.trim_start();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}
