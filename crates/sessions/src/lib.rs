//! Session persistence: the session registry, the user/assistant chat
//! transcript, and world-snapshot storage. Everything here is ambient
//! plumbing around the engine crate's pure orchestration logic.

pub mod store;
pub mod transcript;
pub mod worldio;

pub use store::{SessionRecord, SessionRegistry};
pub use transcript::{ChatMessage, ChatRole, TranscriptStore};
pub use worldio::WorldFileStore;
