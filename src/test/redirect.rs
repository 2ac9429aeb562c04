use std::io::BufReader;
use std::net::TcpStream;

use crate::test::init_test_log;
use crate::testserver::{read_request, write_response, TestServer};
use crate::{Error, RedirectMode, Session};

fn redirect_server() -> TestServer {
    TestServer::new(|mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while let Some(req) = read_request(&mut reader)? {
            if let Some(rest) = req.path.strip_prefix("/redirect/") {
                let n: u32 = rest.parse().unwrap_or(0);
                if n == 0 {
                    write_response(&mut stream, 200, "OK", &[], b"Hello World!")?;
                } else {
                    let location = format!("/redirect/{}", n - 1);
                    let headers = [("Location", location.as_str())];
                    write_response(&mut stream, 308, "Permanent Redirect", &headers, b"hop")?;
                }
            } else if req.path == "/boost-redirect" {
                let headers = [("Location", "http://boost.org")];
                write_response(&mut stream, 308, "Permanent Redirect", &headers, b"away")?;
            } else if req.path == "/no-location" {
                write_response(&mut stream, 308, "Permanent Redirect", &[], b"lost")?;
            } else if req.path == "/post-hop" {
                let headers = [("Location", "/target")];
                write_response(&mut stream, 302, "Found", &headers, b"")?;
            } else if req.path == "/target" {
                let body = format!("{}:{}", req.method, String::from_utf8_lossy(&req.body));
                write_response(&mut stream, 200, "OK", &[], body.as_bytes())?;
            } else if req.path == "/dir/page" {
                let headers = [("Location", "sibling")];
                write_response(&mut stream, 302, "Found", &headers, b"")?;
            } else if req.path == "/dir/sibling" {
                write_response(&mut stream, 200, "OK", &[], b"relative worked")?;
            } else {
                write_response(&mut stream, 404, "Not Found", &[], b"")?;
            }
        }
        Ok(())
    })
}

#[test]
fn chain_is_followed_with_history() {
    init_test_log();
    let server = redirect_server();
    let session = Session::new();

    let res = session
        .get(&server.url("/redirect/3"))
        .max_redirects(5)
        .send(())
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), b"Hello World!");
    assert_eq!(res.history().len(), 3);
    for entry in res.history().iter() {
        assert_eq!(entry.header().status(), 308);
        assert_eq!(entry.body(), b"hop");
    }
    assert!(res.url().path().ends_with("/redirect/0"));
}

#[test]
fn hop_limit_is_enforced() {
    init_test_log();
    let server = redirect_server();
    let session = Session::new();

    let err = session
        .get(&server.url("/redirect/3"))
        .max_redirects(2)
        .call()
        .unwrap_err();

    match err {
        Error::TooManyRedirects(history) => assert_eq!(history.len(), 2),
        other => panic!("expected TooManyRedirects, got {:?}", other),
    }
}

#[test]
fn cross_origin_is_forbidden_in_endpoint_mode() {
    init_test_log();
    let server = redirect_server();
    let session = Session::new();

    let err = session
        .get(&server.url("/boost-redirect"))
        .redirect(RedirectMode::Endpoint)
        .call()
        .unwrap_err();

    match err {
        Error::ForbiddenRedirect(history) => {
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].header().status(), 308);
        }
        other => panic!("expected ForbiddenRedirect, got {:?}", other),
    }
}

#[test]
fn redirect_mode_none_stops_immediately() {
    init_test_log();
    let server = redirect_server();

    let err = Session::new()
        .get(&server.url("/redirect/1"))
        .redirect(RedirectMode::None)
        .call()
        .unwrap_err();

    assert!(matches!(err, Error::ForbiddenRedirect(h) if h.len() == 1));
}

#[test]
fn missing_location_is_invalid() {
    init_test_log();
    let server = redirect_server();

    let err = Session::new()
        .get(&server.url("/no-location"))
        .call()
        .unwrap_err();

    assert!(matches!(err, Error::InvalidRedirect(h) if h.len() == 1));
}

#[test]
fn method_and_body_survive_redirects() {
    init_test_log();
    let server = redirect_server();

    // 302 does not rewrite POST to GET, and the body is replayed
    let res = Session::new()
        .post(&server.url("/post-hop"))
        .send("payload")
        .unwrap();

    assert_eq!(res.body(), b"POST:payload");
    assert_eq!(res.history().len(), 1);
}

#[test]
fn relative_location_resolves_against_request_url() {
    init_test_log();
    let server = redirect_server();

    let res = Session::new().get(&server.url("/dir/page")).call().unwrap();
    assert_eq!(res.body(), b"relative worked");
    assert!(res.url().path().ends_with("/dir/sibling"));
}

#[test]
fn cross_origin_hop_switches_pools() {
    init_test_log();
    let target = TestServer::new(|mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while read_request(&mut reader)?.is_some() {
            write_response(&mut stream, 200, "OK", &[], b"other origin")?;
        }
        Ok(())
    });

    let target_url = target.url("/final");
    let hop = TestServer::new(move |mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        while read_request(&mut reader)?.is_some() {
            let headers = [("Location", target_url.as_str())];
            write_response(&mut stream, 307, "Temporary Redirect", &headers, b"")?;
        }
        Ok(())
    });

    let session = Session::new();
    let res = session.get(&hop.url("/start")).call().unwrap();

    assert_eq!(res.body(), b"other origin");
    assert_eq!(res.history().len(), 1);
    // the two origins got their own pools
    assert_eq!(session.pool_count(), 2);
}
