//! Chat state fed to the code generator.
//!
//! A conversation starts with a fixed system instruction and the user's
//! request, then grows by alternating assistant replies and error
//! reports until a program compiles or the attempt budget runs out.

use serde::{Deserialize, Serialize};

/// Speaker of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Seed a conversation.
    ///
    /// When `previous_source` is non-empty the request is phrased as a
    /// rewrite of that program.
    pub fn new(system: &str, prompt: &str, previous_source: Option<&str>) -> Self {
        let input = match previous_source.filter(|s| !s.trim().is_empty()) {
            Some(source) => format!(
                "Rewrite the following Rust code according to the request:\n```rust\n{}\n```\n\nQuery: {}",
                source, prompt
            ),
            None => prompt.to_string(),
        };

        Conversation {
            messages: vec![
                ChatMessage::new(Role::System, system),
                ChatMessage::new(Role::User, input),
            ],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Record a generator reply.
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::Assistant, text));
    }

    /// Feed a compiler error back as a new user turn.
    pub fn report_error(&mut self, log: &str) {
        self.messages.push(ChatMessage::new(
            Role::User,
            format!(
                "An error occurred. Produce a new code block in the same format as described in the instructions based on this error: {}",
                log
            ),
        ));
    }
}

/// Extract the body of the first fenced code block tagged `lang`.
///
/// Returns `None` when there is no opening fence or it is never closed.
pub fn extract_code_block<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    let fence = format!("```{}", lang);
    let start = text.find(&fence)? + fence.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_request_has_system_and_user_turns() {
        let convo = Conversation::new("sys", "draw circles", None);
        let roles: Vec<Role> = convo.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(convo.messages()[1].content, "draw circles");
    }

    #[test]
    fn rewrite_embeds_previous_source() {
        let convo = Conversation::new("sys", "make it red", Some("fn old() {}"));
        let user = &convo.messages()[1].content;
        assert!(user.contains("```rust\nfn old() {}\n```"));
        assert!(user.ends_with("Query: make it red"));
    }

    #[test]
    fn blank_previous_source_is_ignored() {
        let convo = Conversation::new("sys", "hello", Some("  \n"));
        assert_eq!(convo.messages()[1].content, "hello");
    }

    #[test]
    fn error_report_is_a_user_turn() {
        let mut convo = Conversation::new("sys", "x", None);
        convo.push_assistant("```rust\nbad\n```");
        convo.report_error("E0425");
        let last = convo.messages().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.ends_with("E0425"));
        assert_eq!(convo.messages().len(), 4);
    }

    #[test]
    fn extracts_first_rust_block() {
        let text = "Here you go:\n```rust\nfn main() {}\n```\nand ```rust\nother\n```";
        assert_eq!(extract_code_block(text, "rust"), Some("\nfn main() {}\n"));
    }

    #[test]
    fn missing_or_unclosed_fence() {
        assert_eq!(extract_code_block("no code here", "rust"), None);
        assert_eq!(extract_code_block("```python\nx\n```", "rust"), None);
        assert_eq!(extract_code_block("```rust\nunterminated", "rust"), None);
    }
}
