/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Session credential handed to the chat service during the handshake.
//!
//! The cookie string itself comes from outside (a browser session that passed
//! the service's checks) and is treated as opaque.  The service also expects a
//! per-client `randid`; one is generated whenever the cookie lacks it, so every
//! connect cycle looks like a distinct visitor.

use rand::Rng;

use crate::constants::{RANDID_DIGITS, RANDID_KEY};

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    cookie: String,
}

impl Credential {
    pub fn new(raw: &str) -> Self {
        Self::with_rng(raw, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(raw: &str, rng: &mut R) -> Self {
        if raw.contains(RANDID_KEY) {
            return Self {
                cookie: raw.to_string(),
            };
        }

        let randid = generate_randid(rng);
        let base = raw.trim().trim_end_matches(';').trim_end();
        let cookie = if base.is_empty() {
            format!("{RANDID_KEY}{randid}")
        } else {
            format!("{base}; {RANDID_KEY}{randid}")
        };
        Self { cookie }
    }

    /// Value for the `Cookie` handshake header.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// The `randid` carried by this credential.
    pub fn randid(&self) -> Option<&str> {
        let start = self.cookie.find(RANDID_KEY)? + RANDID_KEY.len();
        let rest = &self.cookie[start..];
        let end = rest.find(';').unwrap_or(rest.len());
        Some(rest[..end].trim())
    }
}

// The cookie grants access to the service; keep it out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("randid", &self.randid())
            .finish_non_exhaustive()
    }
}

fn generate_randid<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..RANDID_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
