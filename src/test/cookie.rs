use std::io::BufReader;
use std::net::TcpStream;

use crate::test::init_test_log;
use crate::testserver::{read_request, write_response, TestServer};
use crate::Session;

fn cookie_server() -> TestServer {
    TestServer::new(|mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while let Some(req) = read_request(&mut reader)? {
            let (path, query) = match req.path.split_once('?') {
                Some((p, q)) => (p, q),
                None => (req.path.as_str(), ""),
            };

            if path == "/cookies/set" {
                let set_cookie = match query.split_once('=') {
                    Some((k, v)) => format!("{}={}; Path=/", k, v),
                    None => "invalid=1; Path=/".to_string(),
                };
                let headers = [("Set-Cookie", set_cookie.as_str())];
                write_response(&mut stream, 200, "OK", &headers, b"stored")?;
            } else if path == "/cookies/set-secure" {
                let headers = [("Set-Cookie", "s=classified; Path=/; Secure")];
                write_response(&mut stream, 200, "OK", &headers, b"stored")?;
            } else if path == "/cookies/delete" {
                let set_cookie = format!("{}=gone; Path=/; Max-Age=0", query);
                let headers = [("Set-Cookie", set_cookie.as_str())];
                write_response(&mut stream, 200, "OK", &headers, b"deleted")?;
            } else if path == "/cookies" {
                let observed = req.header("cookie").unwrap_or("").to_string();
                write_response(&mut stream, 200, "OK", &[], observed.as_bytes())?;
            } else {
                write_response(&mut stream, 404, "Not Found", &[], b"")?;
            }
        }
        Ok(())
    })
}

#[test]
fn cookie_round_trip() {
    init_test_log();
    let server = cookie_server();
    let session = Session::new();

    session.get(&server.url("/cookies/set?k=v")).call().unwrap();

    let cookies = session.jar().cookies();
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].name(), "k");
    assert_eq!(cookies[0].value(), "v");
    assert_eq!(cookies[0].path(), "/");

    // the server observes exactly what it set
    let observed = session
        .get(&server.url("/cookies"))
        .call()
        .unwrap()
        .into_string()
        .unwrap();
    assert_eq!(observed, "k=v");
}

#[test]
fn multiple_cookies_accumulate() {
    init_test_log();
    let server = cookie_server();
    let session = Session::new();

    session.get(&server.url("/cookies/set?a=1")).call().unwrap();
    session.get(&server.url("/cookies/set?b=2")).call().unwrap();

    let observed = session
        .get(&server.url("/cookies"))
        .call()
        .unwrap()
        .into_string()
        .unwrap();
    assert_eq!(observed, "a=1; b=2");
}

#[test]
fn secure_cookie_stays_off_plain_http() {
    init_test_log();
    let server = cookie_server();
    let session = Session::new();

    session
        .get(&server.url("/cookies/set-secure"))
        .call()
        .unwrap();
    // stored, but withheld from an http request
    assert_eq!(session.jar().cookies().len(), 1);

    let observed = session
        .get(&server.url("/cookies"))
        .call()
        .unwrap()
        .into_string()
        .unwrap();
    assert_eq!(observed, "");
}

#[test]
fn max_age_zero_removes_cookie() {
    init_test_log();
    let server = cookie_server();
    let session = Session::new();

    session.get(&server.url("/cookies/set?k=v")).call().unwrap();
    session
        .get(&server.url("/cookies/delete?k"))
        .call()
        .unwrap();

    let observed = session
        .get(&server.url("/cookies"))
        .call()
        .unwrap()
        .into_string()
        .unwrap();
    assert_eq!(observed, "");
}

#[test]
fn cookies_survive_redirects() {
    init_test_log();
    let server = TestServer::new(|mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while let Some(req) = read_request(&mut reader)? {
            if req.path == "/login" {
                let headers = [
                    ("Set-Cookie", "session=abc123; Path=/"),
                    ("Location", "/account"),
                ];
                write_response(&mut stream, 302, "Found", &headers, b"")?;
            } else {
                let observed = req.header("cookie").unwrap_or("").to_string();
                write_response(&mut stream, 200, "OK", &[], observed.as_bytes())?;
            }
        }
        Ok(())
    });

    let session = Session::new();
    let res = session.get(&server.url("/login")).call().unwrap();

    // the cookie set by the redirecting hop is sent on the followed hop
    assert_eq!(res.body(), b"session=abc123");
    assert_eq!(res.history().len(), 1);
}
