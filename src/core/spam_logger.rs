// External spam-record sink. Out of scope in the same sense `ChatApi` is:
// the dispatcher hands a finished record over and moves on, never blocking
// the classification path on wherever the record ends up (a file, a metrics
// backend, whatever `host` wires in).

use super::types::{ChatId, MessageId, UserId, Verdict};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct SpamRecord {
    pub timestamp: DateTime<Utc>,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub user_name: String,
    pub msg_id: Option<MessageId>,
    pub verdict: Verdict,
}

#[async_trait]
pub trait SpamLogger: Send + Sync {
    async fn log(&self, record: SpamRecord);
}
