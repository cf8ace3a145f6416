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

//! Text rewrites applied to messages relayed from a stranger to the partner
//! session.
//!
//! Two rules exist:
//!
//! * **gender inversion** swaps a standalone `m`/`f` (case preserved), where
//!   standalone means not touching another ASCII letter;
//! * **numeric offset** adds a signed offset to every `-?[0-9]+` run.
//!
//! Gender inversion runs first.  Both return [`Cow::Borrowed`] when nothing
//! was rewritten.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static LETTER_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new("[A-Za-z]+").expect("letter run pattern is valid"));
static INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new("-?[0-9]+").expect("integer pattern is valid"));

/// Per-session rewrite settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub gender_inversion: bool,
    pub number_offset: i64,
}

impl TransformConfig {
    /// True when [`apply`] can never change the text.
    pub fn is_identity(&self) -> bool {
        !self.gender_inversion && self.number_offset == 0
    }
}

/// Run the whole pipeline.
pub fn apply<'a>(text: &'a str, config: &TransformConfig) -> Cow<'a, str> {
    let inverted = if config.gender_inversion {
        invert_gender(text)
    } else {
        Cow::Borrowed(text)
    };

    if config.number_offset == 0 {
        return inverted;
    }
    match inverted {
        Cow::Borrowed(text) => offset_numbers(text, config.number_offset),
        Cow::Owned(text) => Cow::Owned(offset_numbers(&text, config.number_offset).into_owned()),
    }
}

/// Swap every standalone `m`/`f`, keeping case.
pub fn invert_gender(text: &str) -> Cow<'_, str> {
    let mut rewritten: Option<String> = None;
    let mut copied_up_to = 0;

    for run in LETTER_RUN.find_iter(text) {
        let swapped = match run.as_str() {
            "m" => "f",
            "f" => "m",
            "M" => "F",
            "F" => "M",
            _ => continue,
        };
        let out = rewritten.get_or_insert_with(|| String::with_capacity(text.len()));
        out.push_str(&text[copied_up_to..run.start()]);
        out.push_str(swapped);
        copied_up_to = run.end();
    }

    match rewritten {
        Some(mut out) => {
            out.push_str(&text[copied_up_to..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(text),
    }
}

/// Add `offset` to every integer in `text`.
///
/// Runs that do not fit an `i64`, or would overflow, are kept verbatim.
pub fn offset_numbers(text: &str, offset: i64) -> Cow<'_, str> {
    if offset == 0 {
        return Cow::Borrowed(text);
    }
    INTEGER.replace_all(text, |caps: &Captures<'_>| {
        let digits = &caps[0];
        digits
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_add(offset))
            .map_or_else(|| digits.to_string(), |n| n.to_string())
    })
}
