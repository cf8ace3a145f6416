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

use std::path::PathBuf;

use clap::Parser;

/// Chat relay
///
/// Runs two anonymous text chats side by side and relays what each stranger
/// says to the other, optionally rewriting it on the way.
///
/// Control commands are read from stdin as JSON lines, for example
/// `{"type":"action","clientId":1,"action":"connect"}`. Control events are
/// written to stdout as JSON lines. Logs go to stderr (see `RUST_LOG`).
#[derive(Parser, Debug, Clone, Default)]
#[clap(name = "chatrelay")]
pub struct Opt {
    /// YAML config file. Defaults to `CHATRELAY_CONFIG_PATH`, then to
    /// environment variables.
    #[clap(long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Cookie sent to the chat service. Overrides the config file.
    #[clap(long = "cookie", conflicts_with = "cookie_file")]
    pub cookie: Option<String>,

    /// Read the cookie from a file (first line).
    #[clap(long = "cookie-file")]
    pub cookie_file: Option<PathBuf>,

    /// Override the chat service WebSocket URL.
    #[clap(long = "url")]
    pub server_url: Option<String>,

    /// Start with the relay disabled.
    #[clap(long = "no-relay")]
    pub no_relay: bool,

    /// Connect both sessions right away.
    #[clap(long = "connect")]
    pub connect: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let opt = Opt::parse_from([
            "chatrelay",
            "--config",
            "relay.yaml",
            "--cookie",
            "cf=1",
            "--no-relay",
            "--connect",
        ]);
        assert_eq!(opt.config, Some(PathBuf::from("relay.yaml")));
        assert_eq!(opt.cookie.as_deref(), Some("cf=1"));
        assert!(opt.no_relay);
        assert!(opt.connect);
    }

    #[test]
    fn test_cookie_sources_conflict() {
        let result = Opt::try_parse_from([
            "chatrelay",
            "--cookie",
            "cf=1",
            "--cookie-file",
            "cookie.txt",
        ]);
        assert!(result.is_err());
    }
}
