//! Completion service client, response extraction and prompt construction.

pub mod client;
pub mod extract;
pub mod prompt;

pub use client::{AnthropicClient, CompletionService};
pub use extract::extract_text;
