//! Core type definitions for the canonical conversation model.
//!
//! These are pure data: messages, attachments, tool declarations, tool calls
//! and tool results. Every vendor adapter translates from and into them.

pub mod messages;
pub mod tools;

// Re-export commonly used types
pub use messages::*;
pub use tools::*;
