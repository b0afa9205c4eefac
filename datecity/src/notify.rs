//! Terminal rendering of cues and notices.

use datecity_core::{Cue, Notice, Notifier};
use std::io::Write;

/// Prints cues (with the terminal bell) and notices to stdout.
#[derive(Debug, Clone, Copy)]
pub struct TerminalNotifier {
    bell: bool,
}

impl TerminalNotifier {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

impl Notifier for TerminalNotifier {
    fn cue(&self, cue: Cue) {
        let mut stdout = std::io::stdout().lock();
        let bell = if self.bell { "\x07" } else { "" };
        writeln!(stdout, "{bell}[{}]", cue_label(cue)).ok();
        stdout.flush().ok();
    }

    fn notice(&self, notice: Notice) {
        let tag = match notice {
            Notice::CompletionFailed(_) | Notice::BackendUnavailable => "ERROR",
            Notice::LocalProviderDetected | Notice::InstallLocalProvider => "NOTICE",
        };
        println!("[{tag}] {notice}");
    }
}

fn cue_label(cue: Cue) -> &'static str {
    match cue {
        Cue::Success => "+",
        Cue::Failure => "-",
        Cue::Money => "$",
    }
}
