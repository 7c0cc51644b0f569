use crate::{Message, Role};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_MESSAGES: usize = 50;

/// Explicit conversation state handed to every LLM call.
///
/// Owned by a caller or an [`crate::AgentContext`]; nothing is kept in
/// process-wide state. History is truncated oldest-first once it exceeds
/// `max_messages`. The system prompt is kept apart and never truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
    system_prompt: Option<String>,
    max_messages: usize,
}

impl Conversation {
    /// Empty conversation keeping at most `max_messages` messages.
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            system_prompt: None,
            max_messages: max_messages.max(1),
        }
    }

    /// Set or replace the system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// The system prompt, if set.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Append a message, dropping the oldest past the limit.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.truncate();
    }

    /// Append a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    /// Append an assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// Messages in order, without the system prompt.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages, without the system prompt.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent assistant reply, if any.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    fn truncate(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    /// Rough token estimation (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        let sys_tokens = self
            .system_prompt
            .as_ref()
            .map(|s| s.len() / 4)
            .unwrap_or(0);
        let msg_tokens: usize = self.messages.iter().map(|m| m.content.len() / 4).sum();
        sys_tokens + msg_tokens
    }

    /// Drop all messages. The system prompt stays.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Full message list for a completion call, system prompt first.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            out.push(Message::system(prompt.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_oldest_first() {
        let mut conv = Conversation::new(2);
        conv.push_user("one");
        conv.push_assistant("two");
        conv.push_user("three");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].content, "two");
    }

    #[test]
    fn test_to_messages_prepends_system_prompt() {
        let mut conv = Conversation::default();
        conv.set_system_prompt("You are a Kubernetes expert.");
        conv.push_user("why is my pod pending?");
        let msgs = conv.to_messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].role, Role::User);
    }

    #[test]
    fn test_estimated_tokens_and_last_assistant() {
        let mut conv = Conversation::default();
        conv.set_system_prompt("abcd");
        conv.push_user("abcdefgh");
        conv.push_assistant("ok!!");
        assert_eq!(conv.estimated_tokens(), 4);
        assert_eq!(conv.last_assistant().unwrap().content, "ok!!");
        conv.clear();
        assert!(conv.is_empty());
        assert_eq!(conv.system_prompt(), Some("abcd"));
    }
}
