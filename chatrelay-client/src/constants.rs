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

pub const DEFAULT_SERVER_URL: &str = "wss://omegleweb.io:8443/";
pub const DEFAULT_ORIGIN: &str = "https://omegleweb.io";

pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

pub const RANDID_KEY: &str = "randid=";
pub const RANDID_DIGITS: usize = 16;

pub const LOG_LOOKING: &str = "Looking for a stranger...";
pub const LOG_CONNECTED: &str = "Connected to stranger!";
pub const LOG_DISCONNECTED: &str = "Disconnected.";
pub const BROADCAST_PREFIX: &str = "[Broadcast]";

/// Capacity of the control event channel. Oldest events are dropped first.
pub const CONTROL_EVENT_CAPACITY: usize = 256;
