use mentii_llm::{GatewayRole, HistoryTurn};

use super::message::{Chat, Role};

/// Maps a chat's recorded messages to gateway history, oldest first.
///
/// Call this before the turn being submitted is appended; that text travels to the
/// gateway separately as the current turn.
pub fn build_history(chat: &Chat) -> Vec<HistoryTurn> {
    chat.messages
        .iter()
        .map(|message| HistoryTurn::new(gateway_role(message.role), message.content.clone()))
        .collect()
}

fn gateway_role(role: Role) -> GatewayRole {
    match role {
        Role::User => GatewayRole::User,
        Role::Assistant => GatewayRole::Model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ids::{ChatId, MessageId};
    use crate::chat::message::Message;

    #[test]
    fn empty_chat_has_empty_history() {
        let chat = Chat::new(ChatId::new(1), 0);
        assert!(build_history(&chat).is_empty());
    }

    #[test]
    fn assistant_turns_are_relabelled_as_model() {
        let mut chat = Chat::new(ChatId::new(1), 0);
        chat.push_message(Message::user(MessageId::new(2), "Hi"));
        chat.push_message(Message::assistant(MessageId::new(3), "Hello there!"));
        chat.push_message(Message::user(MessageId::new(4), "How are you?"));

        let history = build_history(&chat);
        assert_eq!(
            history,
            vec![
                HistoryTurn::new(GatewayRole::User, "Hi"),
                HistoryTurn::new(GatewayRole::Model, "Hello there!"),
                HistoryTurn::new(GatewayRole::User, "How are you?"),
            ]
        );
        assert_eq!(history[1].role.label(), "model");
    }
}
