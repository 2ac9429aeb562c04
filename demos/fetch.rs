//! Fetch a url and print the response, curl style.
//!
//! ```text
//! cargo run --example fetch -- https://example.com/
//! ```

use std::env;
use std::io::{self, Write};
use std::process::exit;

use requests::{RedirectMode, Session};

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let url = match args.next() {
        Some(url) => url,
        None => {
            eprintln!("usage: fetch <url> [body]");
            exit(1);
        }
    };
    let body = args.next();

    let session = Session::builder()
        .redirect(RedirectMode::Any)
        .max_redirects(10)
        .build();

    let builder = match &body {
        Some(_) => session.post(&url),
        None => session.get(&url),
    };

    let result = match body {
        Some(body) => builder.send(body),
        None => builder.call(),
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            eprintln!("fetch: {}", e);
            exit(1);
        }
    };

    for hop in response.history().iter() {
        eprintln!(
            "< {} -> {}",
            hop.header().status(),
            hop.header().header("location").unwrap_or("?")
        );
    }
    eprintln!("< {}", response.status());
    for (name, value) in response.headers() {
        eprintln!("< {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }

    io::stdout().write_all(response.body()).unwrap();
}
