//! Loopback protocol peers for exercising the clients without a camera on
//! the network. Each fixture binds an ephemeral port and plays a canned
//! script on a background thread.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Port with nothing listening on it. Bound briefly and released so the
/// kernel will not hand it out again right away.
pub fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Minimal 200 response carrying `body`
pub fn http_ok(body: &str) -> String {
    format!("HTTP/1.0 200 OK\r\nContent-Type: text/xml\r\n\r\n{body}")
}

/// 200 response with a Server header
pub fn http_ok_with_server(server: &str, body: &str) -> String {
    format!("HTTP/1.0 200 OK\r\nServer: {server}\r\nContent-Type: text/html\r\n\r\n{body}")
}

/// Scripted HTTP peer. Serves one canned response per connection, in
/// order, and records the request line of each.
pub struct HttpScript {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl HttpScript {
    pub fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            for response in responses {
                let Ok((stream, _)) = listener.accept() else { return };
                serve_http(stream, &response, &log);
            }
        });
        HttpScript {
            port,
            requests,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request lines seen, one per connection. Waits for every scripted
    /// response to have been served.
    pub fn requests(self) -> Vec<String> {
        self.handle.join().unwrap();
        let log = self.requests.lock().unwrap();
        log.clone()
    }
}

fn serve_http(stream: TcpStream, response: &str, log: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    log.lock().unwrap().push(request_line.trim_end().to_string());
    // Drain the rest of the request before answering
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
        }
    }
    let _ = (&stream).write_all(response.as_bytes());
}

/// Scripted FTP server speaking just enough protocol for a login and one
/// passive-mode retrieval. Every command received is logged verbatim.
pub struct FtpScript {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FtpScript {
    /// Accept any login and serve `payload` for whatever file is retrieved.
    pub fn start(payload: Vec<u8>) -> Self {
        Self::launch(payload, false)
    }

    /// Greet normally but refuse the USER command.
    pub fn start_rejecting() -> Self {
        Self::launch(Vec::new(), true)
    }

    fn launch(payload: Vec<u8>, reject: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&commands);
        let handle = thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else { return };
            serve_ftp(stream, &payload, reject, &log);
        });
        FtpScript {
            port,
            commands,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Commands received on the control connection. Waits for the session
    /// to end.
    pub fn commands(self) -> Vec<String> {
        self.handle.join().unwrap();
        let log = self.commands.lock().unwrap();
        log.clone()
    }
}

fn serve_ftp(stream: TcpStream, payload: &[u8], reject: bool, log: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(&stream);
    let mut control = &stream;
    let _ = control.write_all(b"220-MayGion FTP\r\n220 Ready\r\n");

    let mut data_listener: Option<TcpListener> = None;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();
        log.lock().unwrap().push(command.clone());
        let verb = command.split(' ').next().unwrap_or("");
        let reply = match verb {
            "USER" if reject => "530 Login incorrect\r\n".to_string(),
            "USER" => "331 Password required\r\n".to_string(),
            "PASS" => "230 Logged in\r\n".to_string(),
            "TYPE" => "200 Type set\r\n".to_string(),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                let data_port = listener.local_addr().unwrap().port();
                data_listener = Some(listener);
                format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                    data_port / 256,
                    data_port % 256
                )
            }
            "CWD" => "250 Directory changed\r\n".to_string(),
            "RETR" => {
                let _ = control.write_all(b"150 Opening data connection\r\n");
                if let Some(listener) = data_listener.take()
                    && let Ok((mut data, _)) = listener.accept()
                {
                    let _ = data.write_all(payload);
                }
                "226 Transfer complete\r\n".to_string()
            }
            "QUIT" => {
                let _ = control.write_all(b"221 Goodbye\r\n");
                return;
            }
            _ => "502 Not implemented\r\n".to_string(),
        };
        let _ = control.write_all(reply.as_bytes());
    }
}

/// Scripted telnet shell. Prints a prompt, echoes each command line back,
/// then prints the next canned output. One inner list of outputs per
/// expected connection.
pub struct TelnetScript {
    port: u16,
}

impl TelnetScript {
    pub fn start(sessions: Vec<Vec<String>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for outputs in sessions {
                let Ok((stream, _)) = listener.accept() else { return };
                serve_telnet(stream, &outputs);
            }
        });
        TelnetScript { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn serve_telnet(stream: TcpStream, outputs: &[String]) {
    let mut reader = BufReader::new(&stream);
    let mut shell = &stream;
    let _ = shell.write_all(b"# ");
    for output in outputs {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let _ = shell.write_all(line.trim_end().as_bytes());
        let _ = shell.write_all(b"\r\n");
        let _ = shell.write_all(output.as_bytes());
        let _ = shell.write_all(b"# ");
    }
    // Swallow the logout bytes so the peer's final write cannot fail
    let mut sink = Vec::new();
    let _ = reader.read_to_end(&mut sink);
}

/// Counts connection attempts to a port without speaking any protocol.
pub struct PortCounter {
    port: u16,
    hits: Arc<AtomicUsize>,
}

impl PortCounter {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            while let Ok((stream, _)) = listener.accept() {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });
        PortCounter { port, hits }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

mod tests {
    use super::*;

    #[test]
    fn test_http_script_serves_and_logs() {
        let server = HttpScript::start(vec![http_ok("hello")]);
        let mut stream = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        stream.write_all(b"GET /x HTTP/1.0\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.ends_with("hello"));
        assert_eq!(server.requests(), vec!["GET /x HTTP/1.0".to_string()]);
    }

    #[test]
    fn test_port_counter_sees_connections() {
        let counter = PortCounter::start();
        let stream = TcpStream::connect(("127.0.0.1", counter.port())).unwrap();
        drop(stream);
        for _ in 0..50 {
            if counter.hits() == 1 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(counter.hits(), 1);
    }

    #[test]
    fn test_dead_port_refuses_connections() {
        assert!(TcpStream::connect(("127.0.0.1", dead_port())).is_err());
    }
}
