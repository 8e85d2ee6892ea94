//! User messages - requests waiting for the planner to pick them up.

use serde::{Deserialize, Serialize};
use crate::id::{MessageId, TaskId};
use crate::Time;

/// A message left by a user, optionally linked to the task it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Unique identifier
    pub id: MessageId,

    /// Message text
    pub content: String,

    /// Sender
    pub user_id: String,

    /// Whether the planner has read it
    pub planner_status: ReadStatus,

    /// Whether the user has read the latest reply to it
    pub user_status: ReadStatus,

    /// Task created for this message, if any
    pub task_id: Option<TaskId>,

    /// When received
    pub created_at: Time,
}

impl UserMessage {
    /// Create an unread message.
    pub fn new(content: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            user_id: user_id.into(),
            planner_status: ReadStatus::Unread,
            user_status: ReadStatus::Unread,
            task_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Link the message to a task.
    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Read marker, tracked separately for the planner and the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadStatus {
    /// Not read yet
    #[default]
    Unread,
    /// Read
    Read,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_unread() {
        let task_id = TaskId::new();
        let message = UserMessage::new("make a video", "alice").for_task(task_id);

        assert_eq!(message.planner_status, ReadStatus::Unread);
        assert_eq!(message.user_status, ReadStatus::Unread);
        assert_eq!(message.task_id, Some(task_id));
    }

    #[test]
    fn test_read_status_wire_format() {
        assert_eq!(serde_json::to_value(ReadStatus::Read).unwrap(), "READ");
        let status: ReadStatus = serde_json::from_str("\"UNREAD\"").unwrap();
        assert_eq!(status, ReadStatus::Unread);
    }
}
