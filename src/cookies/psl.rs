//! Public suffix handling.
//!
//! A cookie may not be scoped to a suffix under which the public can
//! register names (`com`, `co.uk`, `github.io`, ...). The same data decides
//! what counts as "the same site" for the `PrivateDomain` redirect tier.
//!
//! The built-in table is a conservative snapshot covering the common
//! registries. Deployments that need the full list can load a current
//! publicsuffix.org data file with [`PublicSuffixList::from_lines`].

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Rules for which DNS suffixes are public registration points.
#[derive(Debug, Clone, Default)]
pub struct PublicSuffixList {
    exact: HashSet<String>,
    // "*.ck" stored as "ck"
    wildcard: HashSet<String>,
    // "!www.ck" stored as "www.ck"
    exception: HashSet<String>,
}

static DEFAULT_LIST: Lazy<PublicSuffixList> =
    Lazy::new(|| PublicSuffixList::from_lines(DEFAULT_RULES));

impl PublicSuffixList {
    /// The built-in rule set.
    pub fn shared() -> &'static PublicSuffixList {
        &DEFAULT_LIST
    }

    /// Parse rules in publicsuffix.org format: one rule per line,
    /// `*.` wildcards, `!` exceptions, `//` comments.
    pub fn from_lines(data: &str) -> PublicSuffixList {
        let mut list = PublicSuffixList::default();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let rule = line.split_whitespace().next().unwrap_or("");
            let rule = rule.to_ascii_lowercase();
            if let Some(rest) = rule.strip_prefix("!") {
                list.exception.insert(rest.to_string());
            } else if let Some(rest) = rule.strip_prefix("*.") {
                list.wildcard.insert(rest.to_string());
            } else {
                list.exact.insert(rule);
            }
        }
        list
    }

    /// Whether `domain` (lowercased, no trailing dot) is itself a public
    /// suffix.
    pub fn is_public_suffix(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        if self.exception.contains(domain) {
            return false;
        }
        if self.exact.contains(domain) {
            return true;
        }
        if let Some((_, parent)) = domain.split_once('.') {
            if self.wildcard.contains(parent) {
                return true;
            }
        }
        // unknown TLDs are treated as suffixes (the implicit "*" rule)
        !domain.contains('.')
    }

    /// The registrable domain of `host`: the public suffix plus one label.
    /// `None` when the host is itself a suffix (or empty).
    pub fn registrable_domain<'a>(&self, host: &'a str) -> Option<&'a str> {
        if host.is_empty() || self.is_public_suffix(host) {
            return None;
        }
        // walk suffixes from the right, longest match wins
        let mut candidate = host;
        loop {
            match candidate.split_once('.') {
                Some((_, rest)) => {
                    if self.is_public_suffix(rest) {
                        return Some(candidate);
                    }
                    candidate = rest;
                }
                None => return Some(candidate),
            }
        }
    }
}

// A trimmed snapshot of publicsuffix.org covering the registries most
// traffic touches. Lowercase, most specific rules first is not required.
const DEFAULT_RULES: &str = "\
com
org
net
edu
gov
mil
int
info
biz
name
io
co
me
dev
app
xyz
ai
us
ca
de
fr
nl
se
no
fi
dk
es
it
ch
at
be
pl
cz
eu
ru
cn
in
br
mx
ar
co.uk
org.uk
net.uk
ac.uk
gov.uk
me.uk
ltd.uk
plc.uk
sch.uk
co.jp
ne.jp
or.jp
ac.jp
go.jp
ad.jp
com.au
net.au
org.au
edu.au
gov.au
id.au
asn.au
co.nz
net.nz
org.nz
ac.nz
govt.nz
co.kr
or.kr
ac.kr
go.kr
com.cn
net.cn
org.cn
edu.cn
gov.cn
com.br
net.br
org.br
gov.br
com.mx
org.mx
gob.mx
com.ar
net.ar
org.ar
co.in
net.in
org.in
ac.in
gov.in
co.za
org.za
net.za
gov.za
com.sg
org.sg
edu.sg
gov.sg
com.hk
org.hk
edu.hk
gov.hk
com.tw
org.tw
edu.tw
gov.tw
github.io
gitlab.io
herokuapp.com
amazonaws.com
s3.amazonaws.com
cloudfront.net
azurewebsites.net
appspot.com
netlify.app
vercel.app
pages.dev
workers.dev
*.ck
!www.ck
";
