//! Confab — conversational session orchestration with external tool servers.
//!
//! Runs the loop between a human, an LLM completion provider, and a set of
//! tool servers exposing callable capabilities over a request/response
//! channel. The LLM signals tool use by embedding a `<use_tool>` block in its
//! reply text; confab extracts it, dispatches it through the [`hub::ToolHub`],
//! folds the result back into the transcript, and asks the model again until
//! no further tool call appears.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use confab::prelude::*;
//!
//! # async fn example(provider: Arc<dyn CompletionProvider>) -> confab::error::Result<()> {
//! let hub = ToolHub::new(ApprovalPolicy::auto());
//! let mut orchestrator = SessionOrchestrator::new(provider, hub);
//! orchestrator.start_session(None, "You are a helpful assistant.")?;
//! let reply = orchestrator.execute_message("hello").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod hub;
pub mod llm;
pub mod orchestrator;
pub mod prelude;
pub mod role;
pub mod server;
pub mod session;
