use serde_json::{json, Value};

use crate::ledger::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyReason {
    CommentAdded,
    CommentDeleted,
}

impl NotifyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommentAdded => "New Comment Added",
            Self::CommentDeleted => "Comment Deleted",
        }
    }
}

/// Chat webhook body. The host posts it; delivery failures never affect the
/// comment write that triggered it.
pub fn chat_message(comment: &Comment, reason: NotifyReason) -> Value {
    json!({
        "text": format!(
            "{}\nBy: {}\nDate: {}\nComment: \"{}\"",
            reason.as_str(),
            comment.author,
            comment.date,
            comment.text
        )
    })
}
