//! The system prompt that turns the model into the game.

/// Injected at the start of every request; never stored in the transcript.
pub const SYSTEM_PROMPT: &str = include_str!("prompts/datecity.txt");

/// Shown by front ends before the first turn.
pub const WELCOME: &str = "Welcome to DateCity.\n\
Find someone who will invite you home before day 10. Train at the gym, study \
at the university, earn money at the restaurant, and try your luck at the bar.\n\
Press Enter to start.";
