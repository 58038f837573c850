use serde::{Deserialize, Serialize};

use super::ids::{ChatId, MessageId};

/// Title shown until the first user message names the chat.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
/// Number of characters kept from the first user message.
pub const TITLE_MAX_CHARS: usize = 30;
const TITLE_ELLIPSIS: &str = "...";

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One immutable turn in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
        }
    }

    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }
}

/// Conversation aggregate: a titled, append-only list of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    pub messages: Vec<Message>,
    /// Creation time in unix milliseconds.
    pub created_at: u64,
}

impl Chat {
    pub fn new(id: ChatId, created_at: u64) -> Self {
        Self {
            id,
            title: DEFAULT_CHAT_TITLE.to_string(),
            messages: Vec::new(),
            created_at,
        }
    }

    pub fn has_user_message(&self) -> bool {
        self.messages
            .iter()
            .any(|message| message.role == Role::User)
    }

    /// Appends `message`; the first user message also names the chat.
    pub(crate) fn push_message(&mut self, message: Message) {
        if message.role == Role::User && !self.has_user_message() {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
    }
}

/// First [`TITLE_MAX_CHARS`] characters of `text`, with an ellipsis when cut.
pub fn derive_title(text: &str) -> String {
    let mut characters = text.chars();
    let mut title = characters.by_ref().take(TITLE_MAX_CHARS).collect::<String>();
    if characters.next().is_some() {
        title.push_str(TITLE_ELLIPSIS);
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_becomes_the_whole_title() {
        assert_eq!(derive_title("Hello"), "Hello");
    }

    #[test]
    fn exactly_thirty_characters_has_no_ellipsis() {
        let text = "a".repeat(30);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn long_text_is_cut_with_ellipsis() {
        let text = "How do I configure a reverse proxy for my app?";
        assert_eq!(text.chars().count(), 46);
        assert_eq!(derive_title(text), "How do I configure a reverse p...");
    }

    #[test]
    fn multibyte_text_is_cut_on_character_boundaries() {
        let text = "é".repeat(31);
        let title = derive_title(&text);
        assert_eq!(title, format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn title_is_derived_once_from_first_user_message() {
        let mut chat = Chat::new(ChatId::new(1), 0);
        assert_eq!(chat.title, DEFAULT_CHAT_TITLE);

        chat.push_message(Message::user(MessageId::new(2), "Hello"));
        chat.push_message(Message::assistant(MessageId::new(3), "Hi there"));
        chat.push_message(Message::user(MessageId::new(4), "Another question entirely"));

        assert_eq!(chat.title, "Hello");
        assert_eq!(chat.messages.len(), 3);
    }

    #[test]
    fn assistant_message_does_not_name_the_chat() {
        let mut chat = Chat::new(ChatId::new(1), 0);
        chat.push_message(Message::assistant(MessageId::new(2), "Welcome"));
        assert_eq!(chat.title, DEFAULT_CHAT_TITLE);
    }

    #[test]
    fn chat_uses_camel_case_wire_names() {
        let mut chat = Chat::new(ChatId::new(7), 1_700_000_000_000);
        chat.push_message(Message::user(MessageId::new(8), "Hi"));

        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(value["createdAt"], 1_700_000_000_000_u64);
        assert_eq!(value["id"], "7");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["id"], "8");
    }
}
