//! Redirect policy.

use url::Url;

use crate::cookies::PublicSuffixList;

/// How far away a `Location` target may take a request.
///
/// The tiers are ordered from most to least restrictive. Note that the
/// HTTP method is never rewritten while following: a redirected `POST`
/// stays a `POST` on 301/302, unlike in browsers. Callers that want the
/// browser behavior can disable redirects and re-issue themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RedirectMode {
    /// Follow no redirects at all.
    None,
    /// Only follow to the same scheme, host and port.
    Endpoint,
    /// Follow within the same registered domain, as decided by the
    /// public suffix list. `a.example.com` to `b.example.com` is fine,
    /// `example.com` to `example.org` is not.
    PrivateDomain,
    /// Follow to the exact same host only (scheme and port may change).
    SameDomain,
    /// Follow anywhere.
    Any,
}

impl Default for RedirectMode {
    fn default() -> Self {
        RedirectMode::PrivateDomain
    }
}

/// Whether `mode` permits following from `current` to `target`.
pub(crate) fn should_redirect(
    mode: RedirectMode,
    current: &Url,
    target: &Url,
    psl: &PublicSuffixList,
) -> bool {
    match mode {
        RedirectMode::None => false,
        RedirectMode::Endpoint => same_endpoint(current, target),
        RedirectMode::PrivateDomain => {
            same_host(current, target) || same_registrable_domain(current, target, psl)
        }
        RedirectMode::SameDomain => same_endpoint(current, target) || same_host(current, target),
        RedirectMode::Any => true,
    }
}

fn same_host(current: &Url, target: &Url) -> bool {
    match (current.host_str(), target.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        // unix targets have no authority; a relative location stays local
        (None, None) => current.scheme() == target.scheme(),
        _ => false,
    }
}

fn same_endpoint(current: &Url, target: &Url) -> bool {
    current.scheme() == target.scheme()
        && same_host(current, target)
        && current.port_or_known_default() == target.port_or_known_default()
}

fn same_registrable_domain(current: &Url, target: &Url, psl: &PublicSuffixList) -> bool {
    let a = match current.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return false,
    };
    let b = match target.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return false,
    };
    match (psl.registrable_domain(&a), psl.registrable_domain(&b)) {
        (Some(ra), Some(rb)) => ra == rb,
        _ => false,
    }
}
