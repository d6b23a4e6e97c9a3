//! Conversation history for `process.spawn` prompts.
//!
//! A job carrying a `session_id` gets the session's earlier turns prepended
//! to its prompt, and on success its prompt and output are appended. History
//! lives in memory only and is bounded by message count and total size.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::Serialize;

use jobsync_core::config::ProcessConfig;
use jobsync_core::types::SessionId;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    User,
    Assistant,
}

impl SessionRole {
    fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMessage {
    pub role: SessionRole,
    pub content: String,
}

/// Bounded per-session message history.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, VecDeque<SessionMessage>>,
    max_messages: usize,
    max_chars: usize,
}

impl SessionStore {
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            max_messages: config.session_max_messages,
            max_chars: config.session_max_chars,
        }
    }

    /// Start an empty session.
    pub fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(id.clone(), VecDeque::new());
        tracing::info!(session_id = %id, "Session created");
        id
    }

    /// Messages of a session, oldest first. Unknown sessions are empty.
    pub fn history(&self, id: &SessionId) -> Vec<SessionMessage> {
        self.sessions
            .get(id)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append a message, then drop the oldest until both limits hold.
    ///
    /// Blank content is ignored. Unknown sessions are created.
    pub fn append(&self, id: &SessionId, role: SessionRole, content: &str) {
        if content.trim().is_empty() {
            return;
        }
        let mut messages = self.sessions.entry(id.clone()).or_default();
        messages.push_back(SessionMessage {
            role,
            content: content.to_string(),
        });

        while messages.len() > self.max_messages {
            messages.pop_front();
        }
        let mut total: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        while total > self.max_chars {
            match messages.pop_front() {
                Some(removed) => total -= removed.content.chars().count(),
                None => break,
            }
        }
    }
}

/// Render earlier turns and the new prompt as one transcript.
pub fn format_prompt(history: &[SessionMessage], prompt: &str) -> String {
    history
        .iter()
        .map(|message| format!("{}: {}", message.role.label(), message.content))
        .chain(std::iter::once(format!("User: {prompt}")))
        .collect::<Vec<_>>()
        .join("\n\n")
}
