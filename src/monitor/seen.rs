use std::collections::HashSet;

use crate::session::{ChatMessage, MessageId};

/// Message identities already inspected in the current monitoring session.
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: HashSet<MessageId>,
}

impl SeenSet {
    /// Record `id`; returns false if it was already present.
    pub fn insert(&mut self, id: &MessageId) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.clone())
    }

    /// Record every message and return the ones not seen before, in order.
    pub fn take_unseen(&mut self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        messages
            .into_iter()
            .filter(|m| self.insert(&m.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
