//! The streaming chat pipeline.
//!
//! A submitted message opens a turn in the [`Session`]; the reply is generated
//! on a dedicated worker thread and streamed back as fragments through a
//! channel. The consumer (TUI loop, line-mode chat) applies each fragment to the
//! transcript and repaints, then asks the session to finish the turn, which runs
//! speech synthesis once.

pub mod session;
pub mod worker;

pub use session::{ChatSettings, DisplayUpdate, Session, Turn, TurnState};
pub use worker::{FragmentStream, spawn_generation};
