//! Tool server protocol client: channel, lifecycle, catalog.

pub mod catalog;
pub mod channel;
pub mod client;

pub use catalog::{CatalogEntry, ToolCatalog, ToolDescriptor};
pub use channel::{ChildProcessChannel, ToolChannel};
pub use client::{ServerState, ToolServerClient};
