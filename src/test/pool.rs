use std::io::{BufReader, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use url::Url;

use crate::pool::ConnectionPool;
use crate::resolver::DefaultResolver;
use crate::test::init_test_log;
use crate::testserver::{read_request, write_response, TestServer};
use crate::{Error, Session};

// an echo server counting connections that carried at least one request
fn counting_server(conns: Arc<AtomicUsize>, close_header: bool) -> TestServer {
    TestServer::new(move |mut stream: TcpStream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut counted = false;
        while let Some(req) = read_request(&mut reader)? {
            if !counted {
                counted = true;
                conns.fetch_add(1, Ordering::SeqCst);
            }
            let headers: &[(&str, &str)] = if close_header {
                &[("Connection", "close")]
            } else {
                &[]
            };
            write_response(&mut stream, 200, "OK", headers, &req.body)?;
            if close_header {
                return Ok(());
            }
        }
        Ok(())
    })
}

#[test]
fn sequential_requests_share_a_connection() {
    init_test_log();
    let conns = Arc::new(AtomicUsize::new(0));
    let server = counting_server(conns.clone(), false);
    let session = Session::new();

    for i in 0..3 {
        let body = format!("round {}", i);
        let res = session.post(&server.url("/echo")).send(body.clone()).unwrap();
        assert_eq!(res.into_string().unwrap(), body);
    }

    assert_eq!(conns.load(Ordering::SeqCst), 1);
    assert_eq!(session.pool_count(), 1);
}

#[test]
fn connection_close_forces_fresh_connections() {
    init_test_log();
    let conns = Arc::new(AtomicUsize::new(0));
    let server = counting_server(conns.clone(), true);
    let session = Session::new();

    for _ in 0..2 {
        session.post(&server.url("/echo")).send("x").unwrap();
    }

    assert_eq!(conns.load(Ordering::SeqCst), 2);
}

#[test]
fn drained_stream_returns_connection_to_free_list() {
    init_test_log();
    let server = counting_server(Arc::new(AtomicUsize::new(0)), false);
    let session = Session::new();
    let url = Url::parse(&server.url("/echo")).unwrap();

    let (mut stream, _) = session
        .post(&server.url("/echo"))
        .stream("some body")
        .unwrap();

    let pool = session.get_pool(&url).unwrap();
    assert_eq!(pool.counts(), (1, 0));

    let mut sink = Vec::new();
    stream.read_to_end(&mut sink).unwrap();
    assert_eq!(pool.counts(), (0, 1));
}

#[test]
fn abandoned_stream_kills_connection() {
    init_test_log();
    let server = counting_server(Arc::new(AtomicUsize::new(0)), false);
    let session = Session::new();
    let url = Url::parse(&server.url("/echo")).unwrap();

    let (stream, _) = session
        .post(&server.url("/echo"))
        .stream("undrained body bytes")
        .unwrap();

    // dropping mid-body leaves the framing position unknown
    drop(stream);

    let pool = session.get_pool(&url).unwrap();
    assert_eq!(pool.counts(), (0, 0));

    // and the session still works on a fresh connection
    let res = session.post(&server.url("/echo")).send("again").unwrap();
    assert_eq!(res.body(), b"again");
}

#[test]
fn dump_releases_like_a_full_read() {
    init_test_log();
    let server = counting_server(Arc::new(AtomicUsize::new(0)), false);
    let session = Session::new();
    let url = Url::parse(&server.url("/echo")).unwrap();

    let (mut stream, _) = session
        .post(&server.url("/echo"))
        .stream("body to be discarded")
        .unwrap();
    stream.dump().unwrap();

    let pool = session.get_pool(&url).unwrap();
    assert_eq!(pool.counts(), (0, 1));
}

#[test]
fn borrow_waits_for_a_slot() {
    init_test_log();
    let pool = ConnectionPool::new(
        "localhost".to_string(),
        "localhost".to_string(),
        false,
        1,
        Default::default(),
    );
    pool.lookup(&DefaultResolver, 9).unwrap();

    let first = pool.borrow_connection().unwrap();
    assert_eq!(pool.counts(), (1, 0));

    let (tx, rx) = mpsc::channel();
    let pool2 = pool.clone();
    let waiter = thread::spawn(move || {
        let handle = pool2.borrow_connection();
        tx.send(()).unwrap();
        handle
    });

    // the waiter is stuck while the only slot is borrowed
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    pool.return_connection(first.conn.clone(), true);
    drop(first);

    rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(waiter.join().unwrap().is_ok());
}

#[test]
fn cancelled_borrow_wakes_with_aborted() {
    init_test_log();
    let pool = ConnectionPool::new(
        "localhost".to_string(),
        "localhost".to_string(),
        false,
        1,
        Default::default(),
    );
    pool.lookup(&DefaultResolver, 9).unwrap();

    let _held = pool.borrow_connection().unwrap();

    let pool2 = pool.clone();
    let waiter = thread::spawn(move || pool2.borrow_connection());

    thread::sleep(Duration::from_millis(50));
    pool.close();

    let res = waiter.join().unwrap();
    assert!(matches!(res, Err(Error::Aborted)));
}

#[test]
fn no_endpoints_is_not_found() {
    init_test_log();
    let pool = ConnectionPool::new(
        "nowhere.invalid".to_string(),
        "nowhere.invalid".to_string(),
        false,
        2,
        Default::default(),
    );
    // no lookup happened; the endpoint list is empty
    let res = pool.borrow_connection();
    assert!(matches!(res, Err(Error::NotFound(_))));
}

#[test]
fn get_pool_returns_the_same_pool() {
    init_test_log();
    let server = counting_server(Arc::new(AtomicUsize::new(0)), false);
    let session = Session::new();
    let url = Url::parse(&server.url("/")).unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let session = session.clone();
        let url = url.clone();
        handles.push(thread::spawn(move || {
            session.get_pool(&url).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(session.pool_count(), 1);
}

#[test]
fn concurrent_requests_get_their_own_responses() {
    init_test_log();
    let conns = Arc::new(AtomicUsize::new(0));
    let server = counting_server(conns.clone(), false);
    // one connection for everyone: requests are fully serialized on it
    let session = Session::builder().max_connections_per_origin(1).build();

    let mut handles = Vec::new();
    for i in 0..4 {
        let session = session.clone();
        let url = server.url("/echo");
        handles.push(thread::spawn(move || {
            let body = format!("thread {}", i);
            let res = session.post(&url).send(body.clone()).unwrap();
            assert_eq!(res.into_string().unwrap(), body);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(conns.load(Ordering::SeqCst), 1);
}
