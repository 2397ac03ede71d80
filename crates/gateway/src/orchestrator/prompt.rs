//! Assembles the message list handed to the LLM module for one turn:
//! system prompt, compacted-history summary, the recent raw window, and
//! the new user turn.

use aitoys_domain::model::{AgentConfig, ChatMessage, ChatRole};
use aitoys_domain::tool::Message;
use aitoys_store::ConversationWindow;

/// Raw messages pulled into the prompt before compaction kicks in.
pub const RECENT_WINDOW_SIZE: u32 = 20;

pub fn system_prompt(config: &AgentConfig) -> String {
    config
        .character
        .persona_prompt
        .clone()
        .unwrap_or_else(|| "You are a friendly voice companion for a child.".to_string())
}

pub fn build_messages(
    config: &AgentConfig,
    window: &ConversationWindow,
    new_user_turn: &str,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt(config))];

    if let Some(summary) = &window.compressed_summary {
        messages.push(Message::system(format!(
            "Summary of earlier conversation: {summary}"
        )));
    }

    for m in &window.messages {
        messages.push(chat_message_to_prompt(m));
    }

    messages.push(Message::user(new_user_turn));
    messages
}

fn chat_message_to_prompt(m: &ChatMessage) -> Message {
    match m.role {
        ChatRole::User => Message::user(m.content.clone()),
        ChatRole::Assistant => Message::assistant(m.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_persona_when_unset() {
        let config = AgentConfig::default();
        assert!(system_prompt(&config).contains("companion"));
    }

    #[test]
    fn build_messages_includes_summary_history_and_new_turn() {
        let config = AgentConfig::default();
        let window = ConversationWindow {
            compressed_summary: Some("they talked about dinosaurs".into()),
            messages: vec![],
        };
        let messages = build_messages(&config, &window, "hello again");
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[1].content, aitoys_domain::tool::MessageContent::Text(ref t) if t.contains("dinosaurs")));
    }
}
