//! Append-only JSONL chat history.
//!
//! Each session gets a `<sessionId>.jsonl` file. Only `user`/`assistant`
//! text messages are ever appended here — tool-call and tool-result
//! messages live for the duration of one Orchestrator turn and are never
//! persisted (SPEC_FULL.md §3, §4.7).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tf_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One persisted turn of conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Appends to, and reads back, one session's JSONL chat history file.
pub struct TranscriptStore {
    base_dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.jsonl"))
    }

    /// Append a single message. Called once per turn outcome: never for
    /// cancelled turns, never for intermediate tool messages.
    pub fn append(&self, session_id: &str, message: &ChatMessage) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(Error::Io)?;
        let json = serde_json::to_string(message)?;

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(session_id))
            .map_err(Error::Io)?;
        file.write_all(json.as_bytes()).map_err(Error::Io)?;
        file.write_all(b"\n").map_err(Error::Io)?;

        Ok(())
    }

    /// Replace the whole transcript (used by Regenerate, which pops the
    /// trailing assistant message before the next stream).
    pub fn overwrite(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(Error::Io)?;
        let mut buf = String::new();
        for m in messages {
            buf.push_str(&serde_json::to_string(m)?);
            buf.push('\n');
        }
        std::fs::write(self.path(session_id), buf).map_err(Error::Io)
    }

    pub fn read(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let path = self.path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let mut messages = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatMessage>(line) {
                Ok(m) => messages.push(m),
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "skipping malformed chat history line");
                }
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        store.append("s1", &ChatMessage::user("hello")).unwrap();
        store.append("s1", &ChatMessage::assistant("hi there")).unwrap();

        let messages = store.read("s1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].content, "hi there");
    }

    #[test]
    fn read_missing_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        assert!(store.read("nope").unwrap().is_empty());
    }

    #[test]
    fn overwrite_drops_trailing_assistant_message_for_regenerate() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        store.append("s1", &ChatMessage::user("look around")).unwrap();
        store.append("s1", &ChatMessage::assistant("You see a tavern.")).unwrap();

        let mut messages = store.read("s1").unwrap();
        messages.pop();
        store.overwrite("s1", &messages).unwrap();

        let after = store.read("s1").unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].role, ChatRole::User);
    }
}
