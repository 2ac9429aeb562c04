//! A minimal threaded HTTP server for the test suite.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct TestServer {
    pub port: u16,
    done: Arc<AtomicBool>,
}

impl TestServer {
    /// Start a server calling `handler` on a fresh thread per connection.
    pub fn new(
        handler: impl Fn(TcpStream) -> io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();
        let handler = Arc::new(handler);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if done_clone.load(Ordering::SeqCst) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let handler = handler.clone();
                        thread::spawn(move || handler(stream));
                    }
                    Err(e) => {
                        eprintln!("testserver: accept: {}", e);
                        break;
                    }
                }
            }
        });
        // make sure the server accepts connections before returning
        while let Err(e) = TcpStream::connect(("127.0.0.1", port)) {
            if e.kind() == io::ErrorKind::ConnectionRefused {
                thread::sleep(Duration::from_millis(10));
                continue;
            }
            eprintln!("testserver: pre-connect: {}", e);
            break;
        }
        TestServer { port, done }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://localhost:{}{}", self.port, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        // connect once to unblock the accept loop
        let _ = TcpStream::connect(("127.0.0.1", self.port));
    }
}

/// One parsed request as seen by a test handler.
#[derive(Debug, Default)]
pub struct TestRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TestRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one full request (head and body) off the stream. Returns `None`
/// when the peer closed without sending a request line.
pub fn read_request(reader: &mut BufReader<TcpStream>) -> io::Result<Option<TestRequest>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let mut req = TestRequest {
        method: parts.next().unwrap_or("").to_string(),
        path: parts.next().unwrap_or("").to_string(),
        ..Default::default()
    };

    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            req.headers
                .push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    if let Some(len) = req.header("content-length").and_then(|v| v.parse().ok()) {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        req.body = body;
    } else if req
        .header("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
    {
        req.body = read_chunked_body(reader)?;
    }

    Ok(Some(req))
}

fn read_chunked_body(reader: &mut BufReader<TcpStream>) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let size = usize::from_str_radix(line.trim(), 16)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?;
        if size == 0 {
            let mut end = String::new();
            reader.read_line(&mut end)?;
            return Ok(body);
        }
        let mut chunk = vec![0u8; size + 2];
        reader.read_exact(&mut chunk)?;
        chunk.truncate(size);
        body.extend_from_slice(&chunk);
    }
}

/// Serialize a response with a body and explicit extra headers.
pub fn write_response(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> io::Result<()> {
    write!(stream, "HTTP/1.1 {} {}\r\n", status, reason)?;
    for (name, value) in headers {
        write!(stream, "{}: {}\r\n", name, value)?;
    }
    write!(stream, "Content-Length: {}\r\n\r\n", body.len())?;
    stream.write_all(body)?;
    stream.flush()
}
