//! Inbox of user messages feeding the planner.

use std::collections::HashMap;

use taskstack_core::{MessageId, ReadStatus, UserMessage};

use crate::error::{Result, SchedulerError};

/// Messages keyed by id, remembering arrival order.
#[derive(Debug, Default)]
pub struct Inbox {
    messages: HashMap<MessageId, UserMessage>,
    order: Vec<MessageId>,
}

impl Inbox {
    /// Create an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message.
    pub fn insert(&mut self, message: UserMessage) {
        if !self.messages.contains_key(&message.id) {
            self.order.push(message.id);
        }
        self.messages.insert(message.id, message);
    }

    /// Get a message by id.
    pub fn get(&self, id: MessageId) -> Option<&UserMessage> {
        self.messages.get(&id)
    }

    /// Messages in arrival order, optionally only those from `user_id`.
    pub fn list(&self, user_id: Option<&str>) -> Vec<UserMessage> {
        self.order
            .iter()
            .filter_map(|id| self.messages.get(id))
            .filter(|m| user_id.map_or(true, |u| m.user_id == u))
            .cloned()
            .collect()
    }

    /// Apply a read-status update, leaving absent fields unchanged.
    pub fn mark(&mut self, id: MessageId, update: ReadUpdate) -> Result<UserMessage> {
        let message = self
            .messages
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::NotFound(format!("message {}", id)))?;
        if let Some(status) = update.planner {
            message.planner_status = status;
        }
        if let Some(status) = update.user {
            message.user_status = status;
        }
        Ok(message.clone())
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the inbox is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Partial read-status update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadUpdate {
    /// New planner status
    pub planner: Option<ReadStatus>,
    /// New user status
    pub user: Option<ReadStatus>,
}

impl ReadUpdate {
    /// Mark read by the planner.
    pub fn planner_read() -> Self {
        Self {
            planner: Some(ReadStatus::Read),
            user: None,
        }
    }

    /// Mark read by the user.
    pub fn user_read() -> Self {
        Self {
            planner: None,
            user: Some(ReadStatus::Read),
        }
    }
}
