use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;

use crate::test::init_test_log;
use crate::testserver::{read_request, write_response, TestServer};
use crate::source::ReaderSource;
use crate::Session;

fn echo_server() -> TestServer {
    TestServer::new(|mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while let Some(req) = read_request(&mut reader)? {
            let mirrored = req.header("test").unwrap_or("").to_string();
            let received_length = req.header("content-length").unwrap_or("-").to_string();
            let headers = [
                ("Test", mirrored.as_str()),
                ("Received-Length", received_length.as_str()),
            ];
            if req.method == "HEAD" {
                write!(stream, "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n")?;
                stream.flush()?;
            } else {
                write_response(&mut stream, 200, "OK", &headers, &req.body)?;
            }
        }
        Ok(())
    })
}

#[test]
fn post_echoes_body_and_header() {
    init_test_log();
    let server = echo_server();
    let session = Session::new();

    let res = session
        .post(&server.url("/echo"))
        .header("Test", "dummy")
        .send("test-data")
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.header_value("test"), Some("dummy"));
    assert_eq!(res.body(), b"test-data");
    assert!(res.history().is_empty());
}

#[test]
fn zero_length_body_round_trips() {
    init_test_log();
    let server = echo_server();
    let session = Session::new();

    let res = session.post(&server.url("/echo")).send("").unwrap();
    assert_eq!(res.status(), 200);
    // the empty post did announce itself
    assert_eq!(res.header_value("received-length"), Some("0"));
    assert_eq!(res.body(), b"");
}

#[test]
fn get_sends_no_content_length() {
    init_test_log();
    let server = echo_server();
    let session = Session::new();

    let res = session.get(&server.url("/echo")).call().unwrap();
    assert_eq!(res.header_value("received-length"), Some("-"));
}

#[test]
fn unsized_body_goes_chunked() {
    init_test_log();
    let server = echo_server();
    let session = Session::new();

    let body = ReaderSource::new(&b"streamed payload"[..]);
    let res = session.post(&server.url("/echo")).send(body).unwrap();
    // server saw chunked, not content-length
    assert_eq!(res.header_value("received-length"), Some("-"));
    assert_eq!(res.body(), b"streamed payload");
}

#[test]
fn default_user_agent_is_sent() {
    init_test_log();
    let server = TestServer::new(|mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while let Some(req) = read_request(&mut reader)? {
            let ua = req.header("user-agent").unwrap_or("").to_string();
            write_response(&mut stream, 200, "OK", &[], ua.as_bytes())?;
        }
        Ok(())
    });

    let body = Session::new()
        .get(&server.url("/"))
        .call()
        .unwrap()
        .into_string()
        .unwrap();
    assert!(body.starts_with("Requests-"), "unexpected agent: {}", body);

    let custom = Session::new()
        .get(&server.url("/"))
        .header("User-Agent", "custom/1.0")
        .call()
        .unwrap()
        .into_string()
        .unwrap();
    assert_eq!(custom, "custom/1.0");
}

fn chunked_server(chunks: &'static [&'static [u8]]) -> TestServer {
    TestServer::new(move |mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while read_request(&mut reader)?.is_some() {
            write!(stream, "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")?;
            for chunk in chunks {
                write!(stream, "{:x}\r\n", chunk.len())?;
                stream.write_all(chunk)?;
                write!(stream, "\r\n")?;
            }
            write!(stream, "0\r\n\r\n")?;
            stream.flush()?;
        }
        Ok(())
    })
}

#[test]
fn chunked_response_is_decoded() {
    init_test_log();
    let server = chunked_server(&[b"hello ", b"world"]);
    let session = Session::new();

    let res = session.get(&server.url("/")).call().unwrap();
    assert_eq!(res.body(), b"hello world");

    // the transport survived the chunked read
    let res = session.get(&server.url("/")).call().unwrap();
    assert_eq!(res.body(), b"hello world");
}

#[test]
fn chunked_response_with_no_chunks_is_empty() {
    init_test_log();
    let server = chunked_server(&[]);

    let res = Session::new().get(&server.url("/")).call().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), b"");
}

#[test]
fn head_has_no_body() {
    init_test_log();
    let server = echo_server();
    let session = Session::new();

    let res = session.head(&server.url("/echo")).call().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), b"");

    // the content-length of the head response did not desync the framing
    let res = session.post(&server.url("/echo")).send("after-head").unwrap();
    assert_eq!(res.body(), b"after-head");
}

#[test]
fn json_bodies_both_ways() {
    init_test_log();
    let server = echo_server();
    let session = Session::new();

    let sent = serde_json::json!({"thing": "yo", "n": 3});
    let received: serde_json::Value = session
        .post(&server.url("/echo"))
        .send_json(&sent)
        .unwrap()
        .into_json()
        .unwrap();
    assert_eq!(received, sent);
}

#[test]
fn form_body_is_urlencoded() {
    init_test_log();
    let server = echo_server();

    let res = Session::new()
        .post(&server.url("/echo"))
        .send_form(&[("key", "a value"), ("other", "1&2")])
        .unwrap();
    assert_eq!(res.body(), b"key=a+value&other=1%262");
}

#[test]
fn streaming_read() {
    init_test_log();
    let server = echo_server();
    let session = Session::new();

    let (mut stream, history) = session
        .post(&server.url("/echo"))
        .stream("streaming body")
        .unwrap();
    assert!(history.is_empty());
    assert_eq!(stream.headers().status(), 200);

    let mut out = String::new();
    stream.read_to_string(&mut out).unwrap();
    assert_eq!(out, "streaming body");
    assert!(stream.done());
}

#[cfg(unix)]
#[test]
fn unix_socket_request() {
    use std::os::unix::net::UnixListener;

    init_test_log();

    let dir = std::env::temp_dir().join(format!("requests-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("api.sock");
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path).unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(_) => break,
            };
            std::thread::spawn(move || -> io::Result<()> {
                let mut buf = [0u8; 4096];
                // read until the blank line; these requests have no body
                let mut head = Vec::new();
                loop {
                    let n = stream.read(&mut buf)?;
                    if n == 0 {
                        return Ok(());
                    }
                    head.extend_from_slice(&buf[..n]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                write!(stream, "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nlocal")?;
                stream.flush()
            });
        }
    });

    let url = format!("unix://{}", path.display());
    let res = Session::new().get(&url).call().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), b"local");
}
