//! Line-mode game loop.
//!
//! A simple line-oriented protocol:
//! - Lines starting with `#` are commands (new, status, history, help, quit)
//! - Everything else is sent to the game
//! - Output lines are tagged `[DATECITY]`, `[YOU]`, `[STATUS]` or `[ERROR]`

use datecity_core::prompt::WELCOME;
use datecity_core::{GameSession, Role, SessionError};
use std::io::{self, BufRead, Write};

const HELP: &str = "\
  #new      - Start over (clears the current game)
  #status   - Show your stats
  #history  - Show the conversation so far
  #help     - Show this help
  #quit     - Save and exit
  (anything else is sent to the game)";

/// What a command asks the loop to do.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    New,
    Status,
    History,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let name = line.strip_prefix('#')?.split_whitespace().next().unwrap_or("");
    Some(match name {
        "new" | "reset" => Command::New,
        "status" => Command::Status,
        "history" => Command::History,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

/// Run the game until `#quit` or end of input, then flush the session.
pub async fn run<R: BufRead, W: Write>(
    mut session: GameSession,
    input: R,
    mut out: W,
) -> io::Result<()> {
    writeln!(out, "=== DateCity ===")?;
    if let Some(kind) = session.backend_kind() {
        writeln!(
            out,
            "Model: {} ({kind})",
            session.current_model().unwrap_or("unknown")
        )?;
    }
    if !session.is_durable() {
        writeln!(out, "[NOTICE] Progress will not be saved this session")?;
    }
    writeln!(out, "Type #help for commands.")?;
    writeln!(out)?;

    if session.has_started() {
        print_last_reply(&session, &mut out)?;
    } else {
        writeln!(out, "{WELCOME}")?;
    }
    out.flush()?;

    for line in input.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read input");
                break;
            }
        };
        let line = line.trim();

        if let Some(command) = parse_command(line) {
            match command {
                Command::Quit => {
                    writeln!(out, "Goodbye!")?;
                    break;
                }
                Command::New => {
                    session.reset();
                    writeln!(out, "[NEW GAME]")?;
                    writeln!(out, "{WELCOME}")?;
                }
                Command::Status => {
                    writeln!(out, "[STATUS] {}", session.status().status_bar())?;
                }
                Command::History => print_history(&session, &mut out)?,
                Command::Help => writeln!(out, "[HELP]\n{HELP}")?,
                Command::Unknown(name) => {
                    writeln!(out, "[ERROR] Unknown command #{name}. Type #help for help.")?;
                }
            }
            out.flush()?;
            continue;
        }

        // Enter starts a new game; afterwards blank lines are ignored.
        if line.is_empty() && session.has_started() {
            continue;
        }

        write!(out, "[PROCESSING]")?;
        out.flush()?;

        let result = session.submit(line).await;
        write!(out, "\r            \r")?;

        match result {
            Ok(report) => {
                writeln!(out, "[DATECITY]")?;
                for para in report.reply.split("\n\n") {
                    writeln!(out, "{para}")?;
                }
                writeln!(out)?;
                writeln!(out, "[STATUS] {}", report.status.status_bar())?;
            }
            Err(SessionError::EmptyInput) => {}
            Err(e) => writeln!(out, "[ERROR] {e}")?,
        }
        out.flush()?;
    }

    session.shutdown();
    Ok(())
}

fn print_last_reply<W: Write>(session: &GameSession, out: &mut W) -> io::Result<()> {
    if let Some(last) = session
        .visible_messages()
        .into_iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
    {
        writeln!(out, "[DATECITY]\n{}\n", last.body)?;
    }
    writeln!(out, "[STATUS] {}", session.status().status_bar())
}

fn print_history<W: Write>(session: &GameSession, out: &mut W) -> io::Result<()> {
    writeln!(out, "[HISTORY]")?;
    for message in session.visible_messages() {
        let tag = match message.role {
            Role::User => "YOU",
            Role::Assistant => "DATECITY",
            Role::System => continue,
        };
        writeln!(out, "[{tag}] {}", message.body)?;
    }
    Ok(())
}
