//! Inline markers the model embeds in its narration.
//!
//! Sound cues are detected on raw stream fragments, not on the accumulated
//! message, so a cue sounds once per fragment that carries its token.

use serde::{Deserialize, Serialize};

/// Shown in place of the opening message while its warning banner is still
/// streaming.
pub const LOADING_PLACEHOLDER: &str = "Loading...";

const WARNING_OPEN: &str = "<w";
const WARNING_CLOSE: &str = "</warning>";

/// Audible feedback for an in-game outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cue {
    /// An attraction score went up.
    Success,
    /// An attraction score went down.
    Failure,
    /// Money was spent or earned.
    Money,
}

impl Cue {
    /// Every cue, in the order they are reported.
    pub const ALL: [Cue; 3] = [Cue::Success, Cue::Failure, Cue::Money];

    /// Open and close halves of the cue's token. Either half triggers it.
    fn tokens(self) -> [&'static str; 2] {
        match self {
            Cue::Success => ["[+", "+]"],
            Cue::Failure => ["[-", "-]"],
            Cue::Money => ["[$", "$]"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Cue::Success => "success",
            Cue::Failure => "failure",
            Cue::Money => "money",
        }
    }

    /// Cues present in one stream fragment, at most once each.
    pub fn detect(fragment: &str) -> Vec<Cue> {
        Cue::ALL
            .into_iter()
            .filter(|cue| cue.tokens().iter().any(|t| fragment.contains(t)))
            .collect()
    }
}

impl std::fmt::Display for Cue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Displayed body of the first active message.
///
/// The opening message starts with a warning banner. Until the banner's
/// closing tag has arrived the placeholder is shown; afterwards only the text
/// following the tag is. Content without a banner passes through.
pub fn opening_body(content: &str) -> &str {
    if !content.contains(WARNING_OPEN) {
        return content;
    }
    match content.find(WARNING_CLOSE) {
        Some(pos) => content[pos + WARNING_CLOSE.len()..].trim_start(),
        None => LOADING_PLACEHOLDER,
    }
}
