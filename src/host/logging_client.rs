// A `ChatApi` that never talks to a network: every call is logged via
// `tracing` and returns a synthetic success. Lets `main.rs` wire up a
// complete, runnable dispatcher loop without a real bot token, since the
// real chat platform is modeled as an abstract capability set the
// dispatcher is written against rather than coupled to.

use crate::core::chat_api::{ChatApi, ChatApiError, ChatInfo, ChatMember};
use crate::core::types::{ChatId, MessageId, UserId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct LoggingChatApi {
    next_msg_id: AtomicU64,
}

impl Default for LoggingChatApi {
    fn default() -> Self {
        Self { next_msg_id: AtomicU64::new(1) }
    }
}

impl LoggingChatApi {
    fn next_id(&self) -> MessageId {
        self.next_msg_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl ChatApi for LoggingChatApi {
    async fn send(&self, chat_id: &ChatId, text: &str) -> Result<MessageId, ChatApiError> {
        tracing::info!(%chat_id, text, "send");
        Ok(self.next_id())
    }

    async fn send_markdown(&self, chat_id: &ChatId, text: &str) -> Result<MessageId, ChatApiError> {
        tracing::info!(%chat_id, text, "send_markdown");
        Ok(self.next_id())
    }

    async fn delete_message(&self, chat_id: &ChatId, msg_id: &MessageId) -> Result<(), ChatApiError> {
        tracing::info!(%chat_id, %msg_id, "delete_message");
        Ok(())
    }

    async fn get_chat(&self, chat_id: &ChatId) -> Result<ChatInfo, ChatApiError> {
        Ok(ChatInfo { id: chat_id.clone(), title: format!("chat {chat_id}") })
    }

    async fn get_chat_administrators(&self, chat_id: &ChatId) -> Result<Vec<ChatMember>, ChatApiError> {
        tracing::debug!(%chat_id, "get_chat_administrators");
        Ok(Vec::new())
    }

    async fn restrict_chat_member(&self, chat_id: &ChatId, user_id: &UserId, duration: Duration) -> Result<(), ChatApiError> {
        tracing::info!(%chat_id, %user_id, ?duration, "restrict_chat_member");
        Ok(())
    }

    async fn ban_chat_member(&self, chat_id: &ChatId, user_id: &UserId, duration: Duration) -> Result<(), ChatApiError> {
        tracing::info!(%chat_id, %user_id, ?duration, "ban_chat_member");
        Ok(())
    }

    async fn unban_chat_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<(), ChatApiError> {
        tracing::info!(%chat_id, %user_id, "unban_chat_member");
        Ok(())
    }

    async fn ban_chat_sender_chat(&self, chat_id: &ChatId, sender_chat_id: &ChatId) -> Result<(), ChatApiError> {
        tracing::info!(%chat_id, %sender_chat_id, "ban_chat_sender_chat");
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: &str) -> Result<(), ChatApiError> {
        tracing::info!(callback_id, text, "answer_callback_query");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_returns_increasing_message_ids() {
        let api = LoggingChatApi::default();
        let first = api.send(&"c1".to_string(), "hi").await.unwrap();
        let second = api.send(&"c1".to_string(), "again").await.unwrap();
        assert_ne!(first, second);
    }
}
