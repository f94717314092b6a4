//! Streaming Amharic chat with spoken replies.
//!
//! A [`pipeline::Session`] owns the conversation. Each submitted message
//! starts a worker thread that streams the model's reply back over a
//! channel; once the reply is complete it is optionally turned into an
//! audio file. The [`tui`] and [`repl`] front ends drive a session, and
//! [`dataset`] holds the offline fine-tuning data tools.

pub mod ai;
pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod handler;
pub mod pipeline;
pub mod provider;
pub mod repl;
pub mod speech;
pub mod transcript;
pub mod translate;
pub mod tui;
pub mod ui;
