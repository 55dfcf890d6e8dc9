//! Provider-agnostic wire types shared by every taleforge crate: chat
//! messages, tool calls/definitions, streaming events, the crate-wide error
//! type, and structured trace events.

pub mod capability;
pub mod error;
pub mod stream;
pub mod tool;
pub mod trace;

pub use capability::LlmCapabilities;
pub use error::{Error, Result};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
pub use trace::TraceEvent;
