//! Scripted in-memory session for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{BrowserError, ChatMessage, ChatSession, SessionFactory};
use crate::config::ChatConfig;

#[derive(Default)]
pub struct MockState {
    /// Results handed out by successive polls. Once drained, the last
    /// successful list keeps being returned.
    pub script: VecDeque<Result<Vec<ChatMessage>, BrowserError>>,
    pub current: Vec<ChatMessage>,
    /// Page paths reported by successive polls; the last one sticks.
    pub pages: VecDeque<String>,
    pub location: Option<String>,
    /// Delay inside every poll, as a slow page would.
    pub stall: Option<Duration>,
    pub panic_on_poll: bool,
    pub polls: usize,
    pub typed: Vec<String>,
    pub submits: usize,
    pub input_missing: bool,
    pub focused: bool,
    pub closed: bool,
}

pub type MockHandle = Arc<Mutex<MockState>>;

pub struct MockSession {
    state: MockHandle,
}

impl MockSession {
    pub fn new() -> (Self, MockHandle) {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<Vec<ChatMessage>, BrowserError>>) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            script: script.into(),
            ..Default::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl ChatSession for MockSession {
    async fn visible_messages(&mut self) -> Result<Vec<ChatMessage>, BrowserError> {
        let (stall, panic_on_poll) = {
            let mut state = self.state.lock().unwrap();
            state.polls += 1;
            (state.stall, state.panic_on_poll)
        };
        if panic_on_poll {
            panic!("page script crashed");
        }
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(page) = state.pages.pop_front() {
            state.location = Some(page);
        }
        match state.script.pop_front() {
            Some(Ok(messages)) => {
                state.current = messages.clone();
                Ok(messages)
            }
            Some(Err(e)) => Err(e),
            None => Ok(state.current.clone()),
        }
    }

    async fn focus_input(&mut self) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.input_missing {
            return Err(BrowserError::ElementNotFound("div[role='textbox']".into()));
        }
        state.focused = true;
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if !state.focused {
            return Err(BrowserError::ElementNotFound("no focused input".into()));
        }
        state.typed.push(text.to_string());
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.submits += 1;
        state.focused = false;
        Ok(())
    }

    fn location(&self) -> Option<String> {
        self.state.lock().unwrap().location.clone()
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

/// Factory handing out fresh mock sessions and keeping their handles.
#[derive(Default)]
pub struct MockFactory {
    pub fail: bool,
    /// How long `open` takes, like a browser launch.
    pub delay: Duration,
    pub opened: Mutex<Vec<MockHandle>>,
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn open(&self, _chat: &ChatConfig) -> Result<Box<dyn ChatSession>, BrowserError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(BrowserError::Launch("no browser in tests".into()));
        }
        let (session, handle) = MockSession::new();
        self.opened.lock().unwrap().push(handle);
        Ok(Box::new(session))
    }
}
