//! Telnet shell scraper. The cameras run an unauthenticated busybox shell
//! on the telnet port, so there is no option negotiation to speak of, just
//! a prompt to wait for and command echo to discard.

use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::debug;

use super::transport;
use super::{Endpoint, Service};
use crate::error::{Error, Result};

/// Shell prompt the camera firmware prints when it is ready for input
const PROMPT: &str = "# ";

/// One interactive shell session. Bytes are buffered across reads so a
/// marker split over two TCP segments is still found.
pub struct TelnetShell {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TelnetShell {
    /// Connect and wait for the first prompt.
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        let stream = transport::connect(endpoint, Service::Telnet)?;
        let mut shell = TelnetShell {
            stream,
            buffer: Vec::new(),
        };
        shell.read_until(PROMPT)?;
        Ok(shell)
    }

    /// Run `command` and return everything printed between the echoed
    /// command and the next prompt. `echo_marker` is the tail of the echo;
    /// everything up to and including it is discarded.
    pub fn exec(&mut self, command: &str, echo_marker: &str) -> Result<String> {
        debug!("telnet exec: {command}");
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.read_until(echo_marker)?;
        let output = self.read_until(PROMPT)?;
        Ok(output[..output.len() - PROMPT.len()].to_string())
    }

    /// End the session the way the camera's shell expects: ETX then SUB.
    pub fn logout(mut self) -> Result<()> {
        self.stream.write_all(&[0x03, 0x1a])?;
        Ok(())
    }

    /// Accumulate bytes until `marker` appears, consuming through its end.
    fn read_until(&mut self, marker: &str) -> Result<String> {
        let needle = marker.as_bytes();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(pos) = find(&self.buffer, needle) {
                let taken: Vec<u8> = self.buffer.drain(..pos + needle.len()).collect();
                return Ok(String::from_utf8_lossy(&taken).into_owned());
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(Error::Protocol(format!(
                    "telnet session closed while waiting for {marker:?}"
                )));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TelnetScript;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_find_locates_marker_across_buffer() {
        assert_eq!(find(b"abc# def", b"# "), Some(3));
        assert_eq!(find(b"abc", b"# "), None);
        assert_eq!(find(b"#", b"# "), None);
    }

    #[test]
    fn test_exec_returns_text_between_echo_and_prompt() {
        let table = "dev:    size   erasesize  name\r\nmtd0: 00400000 00010000 \"ALL\"\r\n";
        let server = TelnetScript::start(vec![vec![table.to_string()]]);
        let endpoint = Endpoint::new("127.0.0.1").with_telnet_port(server.port());

        let mut shell = TelnetShell::connect(&endpoint).unwrap();
        let output = shell.exec("cat /proc/mtd", "/proc/mtd\r\n").unwrap();
        shell.logout().unwrap();

        assert_eq!(output, table);
        assert!(!output.contains(PROMPT));
    }

    #[test]
    fn test_exec_twice_over_one_session() {
        let server = TelnetScript::start(vec![vec![
            "first output\r\n".to_string(),
            "second output\r\n".to_string(),
        ]]);
        let endpoint = Endpoint::new("127.0.0.1").with_telnet_port(server.port());

        let mut shell = TelnetShell::connect(&endpoint).unwrap();
        assert_eq!(shell.exec("echo first", "first\r\n").unwrap(), "first output\r\n");
        assert_eq!(
            shell.exec("echo second", "second\r\n").unwrap(),
            "second output\r\n"
        );
        shell.logout().unwrap();
    }

    #[test]
    fn test_connect_fails_when_peer_closes_without_prompt() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let _ = listener.accept();
        });

        let endpoint = Endpoint::new("127.0.0.1").with_telnet_port(port);
        assert!(matches!(
            TelnetShell::connect(&endpoint),
            Err(Error::Protocol(_))
        ));
    }
}
