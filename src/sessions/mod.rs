//! Sessions module - conversation state and live connections
//!
//! Data types for sessions and messages live in [`types`]; the live
//! connection and room tracking lives in [`registry`].

mod registry;
mod types;

pub use registry::{ConnectionId, ConnectionRegistry};
pub use types::{derive_title, ChatMessage, MessageMetadata, Sender, Session};
