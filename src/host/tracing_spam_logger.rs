// `SpamLogger` implementation that emits a structured `tracing` event per
// record. The default sink wired up by `main.rs`; anything wanting spam
// records in a different place (a metrics backend, a file) replaces this
// adapter, not the dispatcher.

use crate::core::spam_logger::{SpamLogger, SpamRecord};
use async_trait::async_trait;

pub struct TracingSpamLogger;

#[async_trait]
impl SpamLogger for TracingSpamLogger {
    async fn log(&self, record: SpamRecord) {
        tracing::warn!(
            chat_id = %record.chat_id,
            user_id = %record.user_id,
            user_name = %record.user_name,
            msg_id = ?record.msg_id,
            checks = record.verdict.checks.len(),
            "spam verdict"
        );
    }
}
