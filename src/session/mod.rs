//! Browser-side capability the monitor drives.
//!
//! The monitor only ever talks to a [`ChatSession`]; the concrete
//! Chromium-backed implementation lives in [`chrome`].

pub mod chrome;
#[cfg(test)]
pub mod mock;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ChatConfig;

/// Identity of a rendered chat message, used for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message visible on the page during one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(id),
            text: text.into(),
        }
    }
}

/// Raw message as scraped from the DOM, before an identity is assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedMessage {
    pub dom_id: Option<String>,
    pub text: String,
}

/// Assign identities to scraped messages.
///
/// A DOM id is used when the page provides one. Otherwise the identity is a
/// fingerprint of the text plus how many identical texts precede it in the
/// visible list, so that scrolling does not change it and two messages with
/// the same text stay distinct.
pub fn identify(scraped: Vec<ScrapedMessage>) -> Vec<ChatMessage> {
    let mut occurrences: HashMap<u64, usize> = HashMap::new();

    scraped
        .into_iter()
        .map(|m| {
            let id = match m.dom_id.filter(|id| !id.is_empty()) {
                Some(id) => id,
                None => {
                    let mut hasher = DefaultHasher::new();
                    m.text.hash(&mut hasher);
                    let digest = hasher.finish();
                    let nth = occurrences.entry(digest).or_insert(0);
                    let id = format!("fp:{:016x}:{}", digest, nth);
                    *nth += 1;
                    id
                }
            };
            ChatMessage::new(id, m.text)
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("stale page state: {0}")]
    Stale(String),
    #[error("browser call timed out")]
    Timeout,
    #[error("page navigated away from the chat: {0}")]
    NavigatedAway(String),
    #[error("browser session lost: {0}")]
    SessionLost(String),
    #[error("failed to open browser session: {0}")]
    Launch(String),
    #[error("browser error: {0}")]
    Other(String),
}

impl BrowserError {
    /// Errors that mean the session will not recover without a human.
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            BrowserError::SessionLost(_) | BrowserError::NavigatedAway(_)
        )
    }
}

/// An open browser page showing a chat.
///
/// Implementations are used from a single task and need not be `Sync`.
#[async_trait]
pub trait ChatSession: Send {
    /// Messages currently rendered on the page, oldest first.
    async fn visible_messages(&mut self) -> Result<Vec<ChatMessage>, BrowserError>;

    /// Locate the message input and give it focus.
    async fn focus_input(&mut self) -> Result<(), BrowserError>;

    async fn type_text(&mut self, text: &str) -> Result<(), BrowserError>;

    async fn submit(&mut self) -> Result<(), BrowserError>;

    /// Path of the page as of the last successful `visible_messages`, if
    /// the session can tell. A change means a different view is on screen.
    fn location(&self) -> Option<String> {
        None
    }

    /// Release the session. Called once when monitoring ends.
    async fn close(&mut self) {}
}

/// Opens chat sessions on demand.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, chat: &ChatConfig) -> Result<Box<dyn ChatSession>, BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraped(dom_id: Option<&str>, text: &str) -> ScrapedMessage {
        ScrapedMessage {
            dom_id: dom_id.map(str::to_string),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_dom_id_preferred() {
        let messages = identify(vec![scraped(Some("message-content-42"), "hello")]);
        assert_eq!(messages[0].id.as_str(), "message-content-42");
        assert_eq!(messages[0].text, "hello");
    }

    #[test]
    fn test_identical_texts_get_distinct_fingerprints() {
        let messages = identify(vec![
            scraped(None, "help"),
            scraped(None, "other"),
            scraped(None, "help"),
        ]);
        assert_ne!(messages[0].id, messages[2].id);
        assert!(messages[0].id.as_str().starts_with("fp:"));
    }

    #[test]
    fn test_fingerprint_stable_when_list_shifts() {
        let first = identify(vec![scraped(None, "a"), scraped(None, "help")]);
        let second = identify(vec![
            scraped(None, "help"),
            scraped(None, "b"),
            scraped(None, "c"),
        ]);
        assert_eq!(first[1].id, second[0].id);
    }

    #[test]
    fn test_empty_dom_id_falls_back_to_fingerprint() {
        let messages = identify(vec![scraped(Some(""), "hi")]);
        assert!(messages[0].id.as_str().starts_with("fp:"));
    }

    #[test]
    fn test_session_lost_classification() {
        assert!(BrowserError::SessionLost("closed".into()).is_session_lost());
        assert!(BrowserError::NavigatedAway("https://x".into()).is_session_lost());
        assert!(!BrowserError::Timeout.is_session_lost());
        assert!(!BrowserError::ElementNotFound("x".into()).is_session_lost());
    }
}
