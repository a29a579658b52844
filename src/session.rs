//! Conversation state: one live conversation plus an archive of snapshots.
//!
//! The active conversation is edited in place. It reaches the archive only
//! through a snapshot (on auto-save after each exchange, or when the user
//! switches away from it), so the archived copy of the active id may lag
//! behind the live messages until the next snapshot.

use std::collections::BTreeMap;

use chrono::Local;
use tracing::info;

use crate::models::{ArchiveMeta, Conversation, Message, TIMESTAMP_FORMAT};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no saved chat with id '{0}'")]
    NotFound(String),
}

/// One archived conversation as listed for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub timestamp: String,
    pub message_count: usize,
}

impl SessionSummary {
    /// `"<title> (<timestamp>)"`, the picker label.
    pub fn label(&self) -> String {
        format!("{} ({})", self.title, self.timestamp)
    }
}

pub struct SessionManager {
    active: Conversation,
    archive: BTreeMap<String, Conversation>,
    /// Archive ids in first-save order; re-saving keeps the original slot.
    order: Vec<String>,
}

impl SessionManager {
    pub fn new() -> Self {
        let mut manager = Self {
            active: Conversation::new(String::new()),
            archive: BTreeMap::new(),
            order: Vec::new(),
        };
        manager.active.session_id = manager.mint_id();
        manager
    }

    /// Starts with a caller-chosen active id.
    pub fn with_active_id(id: impl Into<String>) -> Self {
        Self {
            active: Conversation::new(id),
            archive: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Archives a non-empty active conversation, then activates a fresh,
    /// empty one. Returns the new id.
    pub fn start_new_session(&mut self) -> &str {
        self.archive_active(self.archive.len() + 1);
        let id = self.mint_id();
        info!(session = %id, "started new chat");
        self.active = Conversation::new(id);
        &self.active.session_id
    }

    pub fn clear_active_messages(&mut self) {
        self.active.messages.clear();
        info!(session = %self.active.session_id, "cleared chat messages");
    }

    /// Makes a copy of archived conversation `id` the active one. The current
    /// active conversation is archived first.
    pub fn load_session(&mut self, id: &str) -> Result<(), SessionError> {
        if !self.archive.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        self.archive_active(self.archive.len());
        let messages = self
            .archive
            .get(id)
            .map(|c| c.messages.clone())
            .unwrap_or_default();
        self.active = Conversation {
            session_id: id.to_string(),
            messages,
            archive: None,
        };
        info!(session = id, "loaded chat");
        Ok(())
    }

    /// Appends a completed exchange and auto-saves the active conversation.
    pub fn append_exchange(&mut self, user: Message, assistant: Message) {
        self.active.messages.push(user);
        self.active.messages.push(assistant);
        self.snapshot(format!("Chat {}", self.archive.len()));
    }

    /// Appends an exchange without touching the archive.
    pub fn append_unsaved_exchange(&mut self, user: Message, assistant: Message) {
        self.active.messages.push(user);
        self.active.messages.push(assistant);
    }

    pub fn active_id(&self) -> &str {
        &self.active.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.active.messages
    }

    /// Title of the active conversation, if it has been archived.
    pub fn active_title(&self) -> Option<&str> {
        self.archive
            .get(&self.active.session_id)
            .and_then(|c| c.archive.as_ref())
            .map(|meta| meta.title.as_str())
    }

    pub fn archived(&self, id: &str) -> Option<&Conversation> {
        self.archive.get(id)
    }

    /// Archived conversations in the order they were first saved.
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.order
            .iter()
            .filter_map(|id| self.archive.get(id))
            .filter_map(|c| {
                let meta = c.archive.as_ref()?;
                Some(SessionSummary {
                    id: c.session_id.clone(),
                    title: meta.title.clone(),
                    timestamp: meta.archived_at.format(TIMESTAMP_FORMAT).to_string(),
                    message_count: c.messages.len(),
                })
            })
            .collect()
    }

    /// Titles are counted before the snapshot is inserted.
    fn archive_active(&mut self, title_number: usize) {
        if !self.active.is_empty() {
            self.snapshot(format!("Chat {}", title_number));
        }
    }

    fn snapshot(&mut self, title: String) {
        let mut copy = self.active.clone();
        copy.archive = Some(ArchiveMeta {
            title,
            archived_at: Local::now(),
        });
        if !self.archive.contains_key(&copy.session_id) {
            self.order.push(copy.session_id.clone());
        }
        self.archive.insert(copy.session_id.clone(), copy);
    }

    fn is_taken(&self, id: &str) -> bool {
        self.active.session_id == id || self.archive.contains_key(id)
    }

    fn mint_id(&self) -> String {
        let base = format!("chat_{}", Local::now().format("%Y%m%d_%H%M%S"));
        if !self.is_taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !self.is_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
