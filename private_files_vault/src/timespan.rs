//! Private Files Vault - Time-span text
//!
//! Footer extras carry durations as `[d.]hh:mm:ss[.fffffff]` text with
//! 100ns ticks. Used through `#[serde(with = "crate::timespan")]`.

use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serializer};

const NANOS_PER_TICK: u32 = 100;
const TICK_DIGITS: usize = 7;

/// Format a duration as time-span text
pub fn format(d: &Duration) -> String {
    let secs = d.as_secs();
    let days = secs / 86_400;
    let hours = (secs / 3_600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    let ticks = d.subsec_nanos() / NANOS_PER_TICK;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if ticks > 0 {
        out.push_str(&format!(".{:07}", ticks));
    }
    out
}

/// Parse time-span text. Returns `None` for anything malformed.
pub fn parse(text: &str) -> Option<Duration> {
    let text = text.trim();
    let mut parts = text.split(':');

    let head = parts.next()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let tail = parts.next()?;
    if parts.next().is_some() || minutes >= 60 {
        return None;
    }

    let (days, hours) = match head.split_once('.') {
        Some((d, h)) => (d.parse::<u64>().ok()?, h.parse::<u64>().ok()?),
        None => (0, head.parse::<u64>().ok()?),
    };
    if hours >= 24 {
        return None;
    }

    let (seconds, ticks) = match tail.split_once('.') {
        Some((s, f)) => {
            if f.is_empty() || f.len() > TICK_DIGITS || !f.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // Right-pad to seven digits: ".5" is 5_000_000 ticks
            let padded = format!("{:0<7}", f);
            (s.parse::<u64>().ok()?, padded.parse::<u32>().ok()?)
        }
        None => (tail.parse::<u64>().ok()?, 0),
    };
    if seconds >= 60 {
        return None;
    }

    // Day count is unbounded
    let total = days
        .checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + seconds)?;
    Some(Duration::new(total, ticks * NANOS_PER_TICK))
}

pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse(&text).ok_or_else(|| de::Error::custom(format!("invalid time span: {}", text)))
}
