//! DateCity: a chat-driven dating game played by a language model.
//!
//! This crate provides:
//! - Transcript persistence with session identity rotation
//! - Streaming reconciliation of model output into the transcript
//! - Player status extraction from the model's `[Stats]` marker
//! - Local/remote completion backend selection
//!
//! # Quick Start
//!
//! ```ignore
//! use datecity_core::{GameSession, NullNotifier, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::from_env();
//!     let mut session = GameSession::start(config, Arc::new(NullNotifier)).await;
//!
//!     let report = session.submit("").await?;
//!     println!("{}", report.reply);
//!     println!("{}", report.status.status_bar());
//!
//!     session.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conversation_log;
pub mod gateway;
pub mod markers;
pub mod notify;
pub mod persist;
pub mod prompt;
pub mod session;
pub mod status;
pub mod store;
pub mod stream;
pub mod testing;
pub mod transcript;

// Primary public API
pub use config::{LogTarget, SessionConfig};
pub use gateway::{BackendKind, CompletionBackend, CompletionOptions, GatewayError};
pub use markers::Cue;
pub use notify::{Notice, Notifier, NullNotifier};
pub use persist::PersistError;
pub use session::{GameSession, SessionError, TurnReport, VisibleMessage};
pub use status::PlayerStatus;
pub use store::{ConversationStore, SessionId};
pub use testing::{MockBackend, MockReply, TestHarness};
pub use transcript::{Message, Role};
