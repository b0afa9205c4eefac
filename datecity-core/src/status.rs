//! Player status extraction.
//!
//! The model reports the player's variables at the end of every reply as
//!
//! ```text
//! [Stats] Day: 3 | HP: 15 | Money: $235 | Strength: 25 | Intelligence: 15 [Stats]
//! ```
//!
//! `PlayerStatus` is never stored; it is recomputed from the transcript on
//! every read. Parsing is best-effort and per field: a malformed value falls
//! back to that field's default without affecting the other four.

use crate::transcript::Message;
use serde::{Deserialize, Serialize};

/// Opening and closing token of the status block.
pub const STATS_MARKER: &str = "[Stats]";

/// Days the player has before losing.
pub const MAX_DAYS: i32 = 10;

/// Full HP, restored by sleeping.
pub const MAX_HP: i32 = 100;

const DEFAULT_DAY: i32 = 0;
const DEFAULT_HP: i32 = MAX_HP;
const DEFAULT_MONEY: &str = "$100";
const DEFAULT_STRENGTH: i32 = 10;
const DEFAULT_INTELLIGENCE: i32 = 10;

/// Snapshot of the player's variables as last reported by the model.
///
/// Money is opaque text (`$235`, `€12`, `broke`) so any currency display the
/// model invents survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub day: i32,
    pub hp: i32,
    pub money: String,
    pub strength: i32,
    pub intelligence: i32,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            day: DEFAULT_DAY,
            hp: DEFAULT_HP,
            money: DEFAULT_MONEY.to_string(),
            strength: DEFAULT_STRENGTH,
            intelligence: DEFAULT_INTELLIGENCE,
        }
    }
}

impl PlayerStatus {
    /// Derive the status from a transcript.
    ///
    /// Scans backward for the most recent message carrying the marker;
    /// defaults when there is none.
    pub fn extract<'a, I>(messages: I) -> Self
    where
        I: IntoIterator<Item = &'a Message>,
        I::IntoIter: DoubleEndedIterator,
    {
        messages
            .into_iter()
            .rev()
            .find(|m| m.content.contains(STATS_MARKER))
            .map(|m| Self::parse(&m.content))
            .unwrap_or_default()
    }

    /// Parse the first status block found in `content`.
    ///
    /// Text between the first and second marker is used; while the closing
    /// marker has not streamed in yet, everything after the first marker is.
    pub fn parse(content: &str) -> Self {
        let Some(body) = marker_body(content) else {
            return Self::default();
        };

        Self {
            day: int_field(body, "Day").unwrap_or(DEFAULT_DAY),
            hp: int_field(body, "HP").unwrap_or(DEFAULT_HP),
            money: field(body, "Money")
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_MONEY)
                .to_string(),
            strength: int_field(body, "Strength").unwrap_or(DEFAULT_STRENGTH),
            intelligence: int_field(body, "Intelligence").unwrap_or(DEFAULT_INTELLIGENCE),
        }
    }

    /// Render the status in the wire format the model is asked to emit.
    pub fn to_marker(&self) -> String {
        format!(
            "{STATS_MARKER} Day: {} | HP: {} | Money: {} | Strength: {} | Intelligence: {} {STATS_MARKER}",
            self.day, self.hp, self.money, self.strength, self.intelligence
        )
    }

    /// One-line status bar for display.
    pub fn status_bar(&self) -> String {
        format!(
            "Day: {}/{MAX_DAYS} | HP: {}/{MAX_HP} | Money: {} | Strength: {} | Intelligence: {}",
            self.day, self.hp, self.money, self.strength, self.intelligence
        )
    }
}

fn marker_body(content: &str) -> Option<&str> {
    let start = content.find(STATS_MARKER)? + STATS_MARKER.len();
    let rest = &content[start..];
    Some(match rest.find(STATS_MARKER) {
        Some(end) => &rest[..end],
        None => rest,
    })
}

/// Value of the `Label: value` segment, trimmed.
fn field<'a>(body: &'a str, label: &str) -> Option<&'a str> {
    body.split('|').find_map(|segment| {
        let (name, value) = segment.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(label)
            .then_some(value.trim())
    })
}

fn int_field(body: &str, label: &str) -> Option<i32> {
    field(body, label).and_then(leading_int)
}

/// Parse the integer prefix of `s`, so `15/100` and `20 HP` both read as numbers.
fn leading_int(s: &str) -> Option<i32> {
    let s = s.trim();
    let digits_start = usize::from(s.starts_with('-') || s.starts_with('+'));
    let digits_len = s[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    s[..digits_start + digits_len].parse().ok()
}
