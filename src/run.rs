//! The request loop: send, inspect, follow.
//!
//! One borrowed connection serves as many hops as possible; the borrow
//! only moves to another pool when a redirect crosses origins. Every hop
//! that is followed leaves a [`HistoryEntry`] behind, and the body source
//! is rewound before it is sent again.
//!
//! The HTTP method survives every redirect status. 301/302 do not turn a
//! `POST` into a `GET` here; that browser behavior belongs to callers who
//! want it.

use http::{HeaderMap, Method};
use url::Url;

use crate::conn::{ConnHandle, RequestParams};
use crate::config::RequestOptions;
use crate::redirect::should_redirect;
use crate::response::{History, HistoryEntry, Response};
use crate::session::{Origin, Session};
use crate::source::Source;
use crate::stream::Stream;
use crate::Error;

pub(crate) fn request_stream(
    session: &Session,
    method: Method,
    url: Url,
    headers: &HeaderMap,
    opts: &RequestOptions,
    source: &mut dyn Source,
) -> Result<(Stream, History, Url), Error> {
    let mut history = History::new();
    let mut url = url;
    let mut redirects_left = opts.max_redirects;

    check_insecure(&url, opts)?;

    let mut pool = session.get_pool(&url)?;
    let mut handle = pool.borrow_connection()?;

    loop {
        // routing sanity: the borrowed connection must match the url
        let url_host = host_of(&url);
        if !handle.conn.host().eq_ignore_ascii_case(&url_host) {
            let expected = handle.conn.host().to_string();
            handle.release();
            return Err(Error::WrongHost {
                expected,
                actual: url_host,
            });
        }

        let target = encoded_resource(&url);
        let params = RequestParams {
            method: &method,
            target: &target,
            headers,
            jar: Some(session.jar()),
            psl: session.psl(),
            user_agent: session.config().user_agent(),
        };

        let stream = handle.open_request(&params, source)?;

        if !stream.headers().is_redirect() {
            info!("{} {} -> {}", method, url, stream.headers().status());
            return Ok((stream, history, url));
        }

        let (header, body, kept) = stream.into_redirect_parts()?;
        let status = header.status();
        let location = header.header("location").map(str::to_string);
        history.push(HistoryEntry::new(header, body));

        let new_url = match location.and_then(|l| url.join(&l).ok()) {
            Some(u) => u,
            None => {
                release_kept(kept);
                return Err(Error::InvalidRedirect(history));
            }
        };

        debug!("redirect ({}) {} -> {}", status.as_u16(), url, new_url);

        if !should_redirect(opts.redirect, &url, &new_url, session.psl()) {
            release_kept(kept);
            return Err(Error::ForbiddenRedirect(history));
        }

        if redirects_left == 0 {
            release_kept(kept);
            return Err(Error::TooManyRedirects(history));
        }
        redirects_left -= 1;
        if redirects_left == 0 {
            release_kept(kept);
            return Err(Error::TooManyRedirects(history));
        }

        if let Err(e) = check_insecure(&new_url, opts) {
            release_kept(kept);
            return Err(e);
        }

        // crossing origins moves the borrow to another pool
        let crossing = match (Origin::of(&url), Origin::of(&new_url)) {
            (Ok(a), Ok(b)) => a != b,
            (_, Err(e)) | (Err(e), _) => {
                release_kept(kept);
                return Err(e);
            }
        };

        if crossing {
            release_kept(kept);
            pool = session.get_pool(&new_url)?;
            handle = pool.borrow_connection()?;
        } else {
            handle = match kept {
                Some(h) => h,
                None => pool.borrow_connection()?,
            };
        }

        source.reset()?;
        url = new_url;
    }
}

pub(crate) fn request_buffered(
    session: &Session,
    method: Method,
    url: Url,
    headers: &HeaderMap,
    opts: &RequestOptions,
    source: &mut dyn Source,
) -> Result<Response, Error> {
    let (mut stream, history, final_url) =
        request_stream(session, method, url, headers, opts, source)?;
    let header = stream.headers().clone();
    let body = stream.read_to_vec()?;
    Ok(Response::new(header, body, history, final_url))
}

fn release_kept(kept: Option<ConnHandle>) {
    if let Some(handle) = kept {
        handle.release();
    }
}

fn check_insecure(url: &Url, opts: &RequestOptions) -> Result<(), Error> {
    if opts.enforce_tls && !matches!(url.scheme(), "https" | "wss") {
        return Err(Error::Insecure(url.to_string()));
    }
    Ok(())
}

fn host_of(url: &Url) -> String {
    match url.host_str() {
        Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
        // unix urls have no authority
        _ => "localhost".to_string(),
    }
}

/// Path plus query, the request target in origin form.
pub(crate) fn encoded_resource(url: &Url) -> String {
    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}
