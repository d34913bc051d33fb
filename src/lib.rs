//! # BrainBrew
//!
//! Turns a list of topics into AI-generated study material (notes, Q&A pairs
//! and multiple-choice quizzes) and walks a user through the quiz.
//!
//! ## Features
//!
//! - **Notes**: markdown notes with LaTeX, streamed as they are generated
//! - **Q&A**: open-ended questions, each with a streamed answer
//! - **Quiz**: schema-validated multiple-choice questions with scoring
//! - **Re-entrant sessions**: every interaction is one pass over a keyed
//!   session store, in memory or SQLite
//!
//! ## Architecture
//!
//! ```text
//! Event → App::handle → ContentPipeline → Generator (chat completions over HTTP)
//!             ↓                ↓
//!       SessionContext    schema::decode
//!             ↓
//!      SessionStore (memory | SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use brainbrew::{App, Config, ContentPipeline, PassServer};
//! use brainbrew::llm::ChatClient;
//! use brainbrew::session::open_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = ChatClient::new(&config.model, config.request.clone())?;
//!     let pipeline = ContentPipeline::new(Arc::new(client));
//!     let store = open_store(&config.session).await?;
//!     PassServer::new(App::new(pipeline), store, "local").run().await?;
//!     Ok(())
//! }
//! ```

/// Pass reducer: events in, renders out.
pub mod app;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Generation client and the `Generator` seam.
pub mod llm;
/// Task dispatch and decode-retry policy.
pub mod pipeline;
/// Prompt templates and formatting.
pub mod prompts;
/// Quiz items and the quiz state machine.
pub mod quiz;
/// Output schemas and structured decoding.
pub mod schema;
/// Line-delimited JSON pass runner.
pub mod server;
/// Per-session keyed state.
pub mod session;

pub use app::{App, Event, Render};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::ContentPipeline;
pub use server::PassServer;
