// Abstract chat-platform capability set. The concrete bot client (Telegram,
// Discord, whatever) is out of scope; this is the boundary the dispatcher is
// written against, with a non-networked adapter (`host::logging_client`) for
// running and testing the crate without any real platform credentials.

use super::types::{ChatId, MessageId, UserId};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("chat api transport error: {0}")]
    Transport(String),
    #[error("chat {0} not found")]
    ChatNotFound(ChatId),
    #[error("operation not permitted: {0}")]
    Forbidden(String),
}

#[derive(Debug, Clone)]
pub struct ChatMember {
    pub user_id: UserId,
    pub user_name: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub id: ChatId,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub from_user: UserId,
    /// Raw `<action>:<userID>:<channelID>:<msgID>` payload (see
    /// `core::admin`).
    pub data: String,
}

/// One incoming event. Tagged enum rather than one struct per event, mirroring
/// the shape of a typical `poise`/`serenity` event callback, collapsed to the
/// handful of event kinds this crate actually acts on.
#[derive(Debug, Clone)]
pub enum Update {
    Message {
        chat_id: ChatId,
        msg_id: MessageId,
        user_id: UserId,
        user_name: String,
        text: String,
        has_image: bool,
        forward_origin: Option<String>,
        /// Id of the message this one replies to, if any. Needed to resolve
        /// a super-user's bare `spam`/`ban`/`warn` reply, and an admin-chat
        /// `/spam` reply, back to the message and author they target.
        reply_to_msg_id: Option<MessageId>,
    },
    EditedMessage {
        chat_id: ChatId,
        msg_id: MessageId,
        user_id: UserId,
        user_name: String,
        text: String,
    },
    ChannelPost {
        chat_id: ChatId,
        msg_id: MessageId,
        text: String,
    },
    CallbackQuery(CallbackQuery),
    ServiceNewMembers {
        chat_id: ChatId,
        members: Vec<ChatMember>,
    },
    ServiceLeftMember {
        chat_id: ChatId,
        user_id: UserId,
    },
}

/// Capability set the dispatcher needs from the chat platform. Every write
/// method is fallible since the platform is a remote service; the dispatcher
/// never treats a `ChatApiError` as fatal to the whole process.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send(&self, chat_id: &ChatId, text: &str) -> Result<MessageId, ChatApiError>;

    /// Send as Markdown, falling back to plain text if the platform rejects
    /// the formatted payload (Design Note "Send hardening").
    async fn send_markdown(&self, chat_id: &ChatId, text: &str) -> Result<MessageId, ChatApiError>;

    async fn delete_message(&self, chat_id: &ChatId, msg_id: &MessageId) -> Result<(), ChatApiError>;

    async fn get_chat(&self, chat_id: &ChatId) -> Result<ChatInfo, ChatApiError>;

    async fn get_chat_administrators(&self, chat_id: &ChatId) -> Result<Vec<ChatMember>, ChatApiError>;

    async fn restrict_chat_member(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
        duration: Duration,
    ) -> Result<(), ChatApiError>;

    async fn ban_chat_member(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
        duration: Duration,
    ) -> Result<(), ChatApiError>;

    async fn unban_chat_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<(), ChatApiError>;

    async fn ban_chat_sender_chat(&self, chat_id: &ChatId, sender_chat_id: &ChatId) -> Result<(), ChatApiError>;

    async fn answer_callback_query(&self, callback_id: &str, text: &str) -> Result<(), ChatApiError>;
}
